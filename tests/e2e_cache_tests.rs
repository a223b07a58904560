//! End-to-end client cache tests: a fake source serving real serialized
//! snapshots, polled in the background.

mod common;

use async_trait::async_trait;
use common::build_catalog;
use mediateca::client_cache::{SnapshotTransfer, SourceClient};
use mediateca::config::ClientCacheConfig;
use mediateca::{CacheLookup, CatalogError, MediaMask, MediaType, SnapshotCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serving host stand-in: owns a catalog, bumps its serial on change.
struct FakeHost {
    serial: Mutex<String>,
    snapshot: Mutex<Vec<u8>>,
    down: Mutex<bool>,
    snapshot_fetches: AtomicUsize,
}

impl FakeHost {
    fn new() -> Self {
        let (store, _) = build_catalog();
        let mut snapshot = Vec::new();
        store.serialize(&mut snapshot).unwrap();
        FakeHost {
            serial: Mutex::new("serial-1".to_string()),
            snapshot: Mutex::new(snapshot),
            down: Mutex::new(false),
            snapshot_fetches: AtomicUsize::new(0),
        }
    }

    fn publish_change(&self) {
        let (mut store, ids) = build_catalog();
        store.remove_title_set(ids.title_nevermind).unwrap();
        let mut snapshot = Vec::new();
        store.serialize(&mut snapshot).unwrap();
        *self.snapshot.lock().unwrap() = snapshot;
        *self.serial.lock().unwrap() = "serial-2".to_string();
    }
}

#[async_trait]
impl SourceClient for FakeHost {
    async fn fetch_serial(&self) -> mediateca::Result<String> {
        if *self.down.lock().unwrap() {
            return Err(CatalogError::SourceUnavailable("host offline".to_string()));
        }
        Ok(self.serial.lock().unwrap().clone())
    }

    async fn fetch_snapshot(&self) -> mediateca::Result<SnapshotTransfer> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(SnapshotTransfer {
            serial: self.serial.lock().unwrap().clone(),
            media_mask: MediaMask::of(&[MediaType::Music]),
            data: self.snapshot.lock().unwrap().clone(),
        })
    }
}

fn fast_cache() -> Arc<SnapshotCache> {
    Arc::new(SnapshotCache::new(ClientCacheConfig {
        poll_interval: Duration::from_millis(20),
    }))
}

async fn wait_for_snapshot(cache: &SnapshotCache, source: &str) -> (Arc<mediateca::CatalogStore>, String) {
    for _ in 0..100 {
        if let CacheLookup::Updated { snapshot, serial, .. } = cache.get(source, None) {
            return (snapshot, serial);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("poller never produced a snapshot for {}", source);
}

#[tokio::test]
async fn poller_fetches_once_and_get_detects_freshness() {
    let cache = fast_cache();
    let host = Arc::new(FakeHost::new());
    cache.register_source("den", Arc::clone(&host) as Arc<dyn SourceClient>);
    cache.start();

    let (snapshot, serial) = wait_for_snapshot(&cache, "den").await;
    assert_eq!(snapshot.title_set_count(), 2);
    assert_eq!(serial, "serial-1");

    // Stable serial: repeated gets say Unchanged and the poller never
    // re-pulls the payload.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        cache.get("den", Some(&serial)),
        CacheLookup::Unchanged
    ));
    assert!(matches!(
        cache.get("den", Some(&serial)),
        CacheLookup::Unchanged
    ));
    assert_eq!(host.snapshot_fetches.load(Ordering::SeqCst), 1);

    cache.shutdown().await;
}

#[tokio::test]
async fn serial_change_supersedes_without_invalidating_old_readers() {
    let cache = fast_cache();
    let host = Arc::new(FakeHost::new());
    cache.register_source("den", Arc::clone(&host) as Arc<dyn SourceClient>);
    cache.start();

    let (old_snapshot, old_serial) = wait_for_snapshot(&cache, "den").await;
    host.publish_change();

    let mut updated = None;
    for _ in 0..100 {
        if let CacheLookup::Updated { snapshot, serial, .. } = cache.get("den", Some(&old_serial)) {
            updated = Some((snapshot, serial));
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (new_snapshot, new_serial) = updated.expect("poller never picked up the new serial");

    assert_eq!(new_serial, "serial-2");
    assert_eq!(new_snapshot.title_set_count(), 1);
    // The superseded snapshot this reader still holds is intact.
    assert_eq!(old_snapshot.title_set_count(), 2);

    cache.shutdown().await;
}

#[tokio::test]
async fn source_outage_is_logged_and_survived() {
    let cache = fast_cache();
    let host = Arc::new(FakeHost::new());
    cache.register_source("den", Arc::clone(&host) as Arc<dyn SourceClient>);
    cache.start();

    let (_, serial) = wait_for_snapshot(&cache, "den").await;
    *host.down.lock().unwrap() = true;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Still serving the last-known-good snapshot.
    assert!(matches!(
        cache.get("den", Some(&serial)),
        CacheLookup::Unchanged
    ));
    assert!(matches!(cache.get("den", None), CacheLookup::Updated { .. }));

    // And recovery resumes polling.
    *host.down.lock().unwrap() = false;
    host.publish_change();
    let mut recovered = false;
    for _ in 0..100 {
        if let CacheLookup::Updated { serial, .. } = cache.get("den", Some("serial-1")) {
            if serial == "serial-2" {
                recovered = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(recovered, "cache never recovered after the outage");

    cache.shutdown().await;
}
