//! Client-side metadata cache.
//!
//! Holds one snapshot per media source, keyed by the source's moniker, and
//! answers `get` with serial-number change detection so callers transfer a
//! full catalog only when it actually changed. A single background task
//! re-checks each source's serial on a bounded interval and pulls the full
//! snapshot only on change; per-source failures are logged and retried on
//! the next cycle while readers keep their last-known-good snapshot.
//!
//! Unlike the store and the engine, this cache is internally synchronized:
//! it is legitimately hit by many unrelated client threads plus the
//! poller, and every operation under the lock is a short map access.

use crate::catalog::MediaMask;
use crate::catalog_store::CatalogStore;
use crate::config::ClientCacheConfig;
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Full snapshot transfer from a source: the wire contract between a
/// serving host and this cache.
#[derive(Clone, Debug)]
pub struct SnapshotTransfer {
    pub serial: String,
    pub media_mask: MediaMask,
    /// Serialized catalog snapshot bytes.
    pub data: Vec<u8>,
}

/// Wire client for one media source. Implementations wrap whatever
/// transport reaches the source's serving engine.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Current serial number of the source's catalog. Cheap; called every
    /// poll cycle.
    async fn fetch_serial(&self) -> Result<String>;

    /// Full serialized snapshot. Only called when the serial moved.
    async fn fetch_snapshot(&self) -> Result<SnapshotTransfer>;
}

/// Outcome of a cache lookup.
pub enum CacheLookup {
    /// The caller's serial is still current; no data transferred.
    Unchanged,
    /// A newer snapshot, shared by reference: readers of a superseded
    /// snapshot keep theirs until they drop it.
    Updated {
        snapshot: Arc<CatalogStore>,
        serial: String,
        media_mask: MediaMask,
    },
    /// Nothing cached for this source (never fetched, or never reachable).
    Unavailable,
}

struct CacheEntry {
    client: Arc<dyn SourceClient>,
    snapshot: Option<Arc<CatalogStore>>,
    serial: String,
    media_mask: MediaMask,
    next_check: Instant,
}

/// Process-wide snapshot cache with one background poller.
///
/// Construct once at startup, `start` the poller, and `shutdown` on exit;
/// there are no hidden globals.
pub struct SnapshotCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    poll_interval: Duration,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotCache {
    pub fn new(config: ClientCacheConfig) -> Self {
        SnapshotCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
            poll_interval: config.poll_interval,
            cancel: CancellationToken::new(),
            poller: Mutex::new(None),
        }
    }

    /// Register a source. Its first snapshot arrives on the next poll
    /// cycle; until then `get` answers `Unavailable`.
    pub fn register_source(&self, source_id: impl Into<String>, client: Arc<dyn SourceClient>) {
        let source_id = source_id.into();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            source_id.clone(),
            CacheEntry {
                client,
                snapshot: None,
                serial: String::new(),
                media_mask: MediaMask::EMPTY,
                next_check: Instant::now(),
            },
        );
        info!(source = source_id.as_str(), "registered media source");
    }

    pub fn remove_source(&self, source_id: &str) {
        self.entries.lock().unwrap().remove(source_id);
    }

    /// Look up a source's snapshot against the serial the caller already
    /// holds. Never blocks on the network; the poller does the fetching.
    pub fn get(&self, source_id: &str, known_serial: Option<&str>) -> CacheLookup {
        let entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(source_id) else {
            return CacheLookup::Unavailable;
        };
        let Some(snapshot) = &entry.snapshot else {
            return CacheLookup::Unavailable;
        };
        if known_serial == Some(entry.serial.as_str()) {
            return CacheLookup::Unchanged;
        }
        CacheLookup::Updated {
            snapshot: Arc::clone(snapshot),
            serial: entry.serial.clone(),
            media_mask: entry.media_mask,
        }
    }

    /// Spawn the background poller. Idempotent per cache instance.
    pub fn start(self: &Arc<Self>) {
        let mut poller = self.poller.lock().unwrap();
        if poller.is_some() {
            return;
        }
        let cache = Arc::clone(self);
        *poller = Some(tokio::spawn(async move {
            cache.poll_loop().await;
        }));
    }

    /// Stop the poller cooperatively and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.poller.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("snapshot cache poller stopped");
    }

    async fn poll_loop(&self) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "snapshot cache poller started"
        );
        loop {
            self.poll_due_sources().await;

            // Bounded wait, re-checking the shutdown flag: a source never
            // gets re-checked more often than the configured floor.
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.cancel.cancelled() => {
                    break;
                }
            }
        }
    }

    /// One pass over every registered source. Failures are per-source:
    /// logged, the entry left as-is, retried next cycle.
    async fn poll_due_sources(&self) {
        let due: Vec<(String, Arc<dyn SourceClient>, String)> = {
            let now = Instant::now();
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .filter(|(_, entry)| entry.next_check <= now)
                .map(|(id, entry)| (id.clone(), Arc::clone(&entry.client), entry.serial.clone()))
                .collect()
        };

        for (source_id, client, known_serial) in due {
            if self.cancel.is_cancelled() {
                return;
            }
            if let Err(err) = self.poll_one(&source_id, &client, &known_serial).await {
                warn!(
                    source = source_id.as_str(),
                    error = %err,
                    "source poll failed; keeping last-known-good snapshot"
                );
            }
            // Failed or not, push the next check out by the full interval.
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&source_id) {
                entry.next_check = Instant::now() + self.poll_interval;
            }
        }
    }

    async fn poll_one(
        &self,
        source_id: &str,
        client: &Arc<dyn SourceClient>,
        known_serial: &str,
    ) -> Result<()> {
        let serial = client.fetch_serial().await?;
        if serial == known_serial && !known_serial.is_empty() {
            debug!(source = source_id, serial = serial.as_str(), "serial unchanged");
            return Ok(());
        }

        let transfer = client.fetch_snapshot().await?;
        let snapshot = CatalogStore::deserialize(transfer.data.as_slice()).map_err(|err| {
            // A snapshot that fails to decode counts as a failed poll; the
            // previous snapshot, if any, stays in place.
            CatalogError::SourceUnavailable(format!(
                "snapshot from {} failed to decode: {}",
                source_id, err
            ))
        })?;

        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(source_id) {
            entry.snapshot = Some(Arc::new(snapshot));
            entry.serial = transfer.serial.clone();
            entry.media_mask = transfer.media_mask;
            info!(
                source = source_id,
                serial = transfer.serial.as_str(),
                "cached new snapshot"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Item, MediaType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that serves a serialized one-item catalog and counts calls.
    struct FakeSource {
        serial: Mutex<String>,
        serial_calls: AtomicUsize,
        snapshot_calls: AtomicUsize,
        unreachable: Mutex<bool>,
    }

    impl FakeSource {
        fn new(serial: &str) -> Self {
            FakeSource {
                serial: Mutex::new(serial.to_string()),
                serial_calls: AtomicUsize::new(0),
                snapshot_calls: AtomicUsize::new(0),
                unreachable: Mutex::new(false),
            }
        }

        fn set_serial(&self, serial: &str) {
            *self.serial.lock().unwrap() = serial.to_string();
        }

        fn set_unreachable(&self, value: bool) {
            *self.unreachable.lock().unwrap() = value;
        }
    }

    #[async_trait]
    impl SourceClient for FakeSource {
        async fn fetch_serial(&self) -> Result<String> {
            if *self.unreachable.lock().unwrap() {
                return Err(CatalogError::SourceUnavailable("fake down".to_string()));
            }
            self.serial_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.serial.lock().unwrap().clone())
        }

        async fn fetch_snapshot(&self) -> Result<SnapshotTransfer> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            let mut store = CatalogStore::new();
            store
                .insert_item(Item::new("track", MediaType::Music))
                .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;
            let mut data = Vec::new();
            store
                .serialize(&mut data)
                .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;
            Ok(SnapshotTransfer {
                serial: self.serial.lock().unwrap().clone(),
                media_mask: MediaMask::of(&[MediaType::Music]),
                data,
            })
        }
    }

    fn cache_with(interval: Duration) -> Arc<SnapshotCache> {
        Arc::new(SnapshotCache::new(ClientCacheConfig {
            poll_interval: interval,
        }))
    }

    #[tokio::test]
    async fn get_before_first_poll_is_unavailable() {
        let cache = cache_with(Duration::from_secs(60));
        let source = Arc::new(FakeSource::new("s1"));
        cache.register_source("living-room", source);
        assert!(matches!(
            cache.get("living-room", None),
            CacheLookup::Unavailable
        ));
        assert!(matches!(cache.get("unknown", None), CacheLookup::Unavailable));
    }

    #[tokio::test]
    async fn unchanged_serial_skips_the_full_fetch() {
        let cache = cache_with(Duration::from_secs(60));
        let source = Arc::new(FakeSource::new("s1"));
        cache.register_source("den", Arc::clone(&source) as Arc<dyn SourceClient>);

        cache.poll_due_sources().await;
        assert_eq!(source.snapshot_calls.load(Ordering::SeqCst), 1);

        let serial = match cache.get("den", None) {
            CacheLookup::Updated { serial, snapshot, media_mask } => {
                assert_eq!(snapshot.item_count(), 1);
                assert!(media_mask.contains(MediaType::Music));
                serial
            }
            _ => panic!("expected Updated"),
        };

        // Caller already holds the current serial: no data both times.
        assert!(matches!(
            cache.get("den", Some(&serial)),
            CacheLookup::Unchanged
        ));
        assert!(matches!(
            cache.get("den", Some(&serial)),
            CacheLookup::Unchanged
        ));

        // A second poll pass sees the same source serial and does not pull
        // the snapshot again.
        {
            let mut entries = cache.entries.lock().unwrap();
            entries.get_mut("den").unwrap().next_check = Instant::now();
        }
        cache.poll_due_sources().await;
        assert_eq!(source.snapshot_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn serial_change_produces_a_fresh_shared_snapshot() {
        let cache = cache_with(Duration::from_secs(60));
        let source = Arc::new(FakeSource::new("s1"));
        cache.register_source("den", Arc::clone(&source) as Arc<dyn SourceClient>);

        cache.poll_due_sources().await;
        let first = match cache.get("den", None) {
            CacheLookup::Updated { snapshot, serial, .. } => (snapshot, serial),
            _ => panic!("expected Updated"),
        };

        source.set_serial("s2");
        {
            let mut entries = cache.entries.lock().unwrap();
            entries.get_mut("den").unwrap().next_check = Instant::now();
        }
        cache.poll_due_sources().await;
        assert_eq!(source.snapshot_calls.load(Ordering::SeqCst), 2);

        match cache.get("den", Some(&first.1)) {
            CacheLookup::Updated { snapshot, serial, .. } => {
                assert_eq!(serial, "s2");
                // New snapshot is a different shared allocation; the old
                // reference the caller still holds stays valid.
                assert!(!Arc::ptr_eq(&snapshot, &first.0));
                assert_eq!(first.0.item_count(), 1);
            }
            _ => panic!("expected Updated after serial change"),
        }
    }

    #[tokio::test]
    async fn source_failure_keeps_last_known_good() {
        let cache = cache_with(Duration::from_secs(60));
        let source = Arc::new(FakeSource::new("s1"));
        cache.register_source("den", Arc::clone(&source) as Arc<dyn SourceClient>);

        cache.poll_due_sources().await;
        source.set_unreachable(true);
        {
            let mut entries = cache.entries.lock().unwrap();
            entries.get_mut("den").unwrap().next_check = Instant::now();
        }
        cache.poll_due_sources().await;

        // Readers keep observing the cached snapshot.
        assert!(matches!(
            cache.get("den", None),
            CacheLookup::Updated { .. }
        ));
    }

    #[tokio::test]
    async fn poller_lifecycle_start_and_shutdown() {
        let cache = cache_with(Duration::from_millis(20));
        let source = Arc::new(FakeSource::new("s1"));
        cache.register_source("den", Arc::clone(&source) as Arc<dyn SourceClient>);

        cache.start();
        cache.start(); // second start is a no-op

        // Give the poller time for at least one pass.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(source.serial_calls.load(Ordering::SeqCst) >= 1);

        cache.shutdown().await;
        let calls_after_shutdown = source.serial_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.serial_calls.load(Ordering::SeqCst), calls_after_shutdown);
    }
}
