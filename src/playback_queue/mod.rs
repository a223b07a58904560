//! Playback queue manager.
//!
//! An ordered list of flattened playback records with a selection state
//! machine on top. Entries are frozen copies of catalog data, not live
//! references, so the queue survives catalog reloads; only the item cookie
//! ties an entry back to a catalog position.
//!
//! Like the catalog store, the queue is owned and locked by a single
//! driver instance; it does no locking of its own. Every mutation bumps a
//! serial number so remote UIs can detect staleness with one integer
//! compare instead of re-fetching the list.

use crate::catalog::{CategoryId, MediaType};
use crate::config::RefillConfig;
use crate::cookie::format_category_cookie;
use crate::engine::{FlatItem, QueryEngine};
use crate::error::Result;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the caller must do after a queue operation. These are directives,
/// not just success flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueAction {
    /// Nothing for the caller to do.
    NoAction,
    /// No entry is selected; the caller should select and start playback.
    SelectionRequired,
    /// The queue is empty; the caller should stop playback.
    StopRequired,
}

/// Playback sequencing mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayMode {
    /// Wrap-around list order.
    Sequential,
    /// Random order, no repeats until every entry has played once.
    Shuffle,
    /// Manual selection only; the queue never auto-advances.
    Jukebox,
    /// Sequential, with automatic batch refills from a category.
    RandomCategory {
        category: CategoryId,
        media_type: MediaType,
    },
}

/// One queued entry: a frozen copy of the catalog fields a UI shows.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// Queue-unique ID. Starts at 1, never reused, never 0.
    pub entry_id: u64,
    /// Source the item was queued from; also the refill throttle key.
    pub source_id: String,
    pub item_cookie: String,
    pub title_name: String,
    pub collection_name: String,
    pub item_name: String,
    pub artist: String,
    pub duration_secs: u32,
    pub media_type: MediaType,
    played: bool,
}

pub struct PlaybackQueue {
    entries: Vec<QueueEntry>,
    /// Index of the selected entry; `None` is the "nothing selected"
    /// sentinel.
    current: Option<usize>,
    /// Bumped on every mutation.
    serial: u64,
    next_entry_id: u64,
    mode: PlayMode,
    refill: RefillConfig,
    /// Last refill attempt per source, successful or not.
    last_refill: HashMap<String, Instant>,
}

impl PlaybackQueue {
    pub fn new(mode: PlayMode, refill: RefillConfig) -> Self {
        PlaybackQueue {
            entries: Vec::new(),
            current: None,
            serial: 0,
            next_entry_id: 1,
            mode,
            refill,
            last_refill: HashMap::new(),
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mode(&self) -> &PlayMode {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        if self.mode != mode {
            self.mode = mode;
            self.serial += 1;
        }
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.map(|index| &self.entries[index])
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn entry_by_id(&self, entry_id: u64) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.entry_id == entry_id)
    }

    fn push_flat(&mut self, source_id: &str, flat: FlatItem, at: Option<usize>) -> u64 {
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        let entry = QueueEntry {
            entry_id,
            source_id: source_id.to_string(),
            item_cookie: flat.item_cookie,
            title_name: flat.title_name,
            collection_name: flat.collection_name,
            item_name: flat.item_name,
            artist: flat.artist,
            duration_secs: flat.duration_secs,
            media_type: flat.media_type,
            played: false,
        };
        match at {
            Some(index) if index <= self.entries.len() => self.entries.insert(index, entry),
            _ => self.entries.push(entry),
        }
        entry_id
    }

    /// Add flattened records, either at the tail or right after the
    /// current entry (`play_now`).
    pub fn add_media(
        &mut self,
        source_id: &str,
        items: Vec<FlatItem>,
        play_now: bool,
    ) -> QueueAction {
        if items.is_empty() {
            return QueueAction::NoAction;
        }
        let was_empty = self.entries.is_empty();
        let had_selection = self.current.is_some();

        let mut insert_at = if play_now {
            self.current.map(|index| index + 1)
        } else {
            None
        };
        for flat in items {
            let id = self.push_flat(source_id, flat, insert_at);
            debug!(entry = id, source = source_id, "queued item");
            if let Some(index) = insert_at.as_mut() {
                *index += 1;
            }
        }
        self.serial += 1;

        if was_empty {
            return QueueAction::SelectionRequired;
        }
        if self.mode == PlayMode::Jukebox && had_selection {
            // Something is already playing and jukebox never auto-advances,
            // so the new entries just wait their turn.
            return QueueAction::NoAction;
        }
        if play_now {
            QueueAction::SelectionRequired
        } else {
            QueueAction::NoAction
        }
    }

    fn remove_at(&mut self, index: usize) -> QueueAction {
        let removed_current = self.current == Some(index);
        let entry = self.entries.remove(index);
        debug!(entry = entry.entry_id, "removed queue entry");

        match self.current {
            Some(current) if current > index => self.current = Some(current - 1),
            Some(current) if current == index => self.current = None,
            _ => {}
        }
        self.serial += 1;

        if self.entries.is_empty() {
            return QueueAction::StopRequired;
        }
        if removed_current {
            QueueAction::SelectionRequired
        } else {
            QueueAction::NoAction
        }
    }

    /// Remove by list position.
    pub fn remove_by_index(&mut self, index: usize) -> Result<QueueAction> {
        if index >= self.entries.len() {
            return Err(crate::error::CatalogError::NotFound {
                kind: "queue entry",
                id: index as u64,
            });
        }
        Ok(self.remove_at(index))
    }

    /// Remove by queue-unique entry ID.
    pub fn remove_by_id(&mut self, entry_id: u64) -> Result<QueueAction> {
        let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.entry_id == entry_id)
        else {
            return Err(crate::error::CatalogError::NotFound {
                kind: "queue entry",
                id: entry_id,
            });
        };
        Ok(self.remove_at(index))
    }

    /// Drop everything and deselect.
    pub fn clear(&mut self) -> QueueAction {
        if self.entries.is_empty() {
            return QueueAction::NoAction;
        }
        self.entries.clear();
        self.current = None;
        self.serial += 1;
        QueueAction::StopRequired
    }

    fn select_index(&mut self, index: usize) -> &QueueEntry {
        self.current = Some(index);
        self.entries[index].played = true;
        self.serial += 1;
        &self.entries[index]
    }

    /// Advance the selection. Sequential modes wrap cyclically; shuffle
    /// draws an unplayed entry, starting a new cycle once every entry has
    /// played; jukebox never auto-advances and always returns `None`.
    pub fn select_next(&mut self) -> Option<&QueueEntry> {
        if self.entries.is_empty() {
            return None;
        }
        match self.mode {
            PlayMode::Jukebox => None,
            PlayMode::Sequential | PlayMode::RandomCategory { .. } => {
                let index = match self.current {
                    Some(current) => (current + 1) % self.entries.len(),
                    None => 0,
                };
                Some(self.select_index(index))
            }
            PlayMode::Shuffle => {
                let index = self.draw_unplayed()?;
                Some(self.select_index(index))
            }
        }
    }

    /// Step the selection backwards. Shuffle draws like `select_next`.
    pub fn select_previous(&mut self) -> Option<&QueueEntry> {
        if self.entries.is_empty() {
            return None;
        }
        match self.mode {
            PlayMode::Jukebox => None,
            PlayMode::Sequential | PlayMode::RandomCategory { .. } => {
                let len = self.entries.len();
                let index = match self.current {
                    Some(current) => (current + len - 1) % len,
                    None => len - 1,
                };
                Some(self.select_index(index))
            }
            PlayMode::Shuffle => {
                let index = self.draw_unplayed()?;
                Some(self.select_index(index))
            }
        }
    }

    /// Explicit selection, the only way jukebox mode moves.
    pub fn select_by_id(&mut self, entry_id: u64) -> Result<&QueueEntry> {
        let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.entry_id == entry_id)
        else {
            return Err(crate::error::CatalogError::NotFound {
                kind: "queue entry",
                id: entry_id,
            });
        };
        Ok(self.select_index(index))
    }

    /// Pick a random unplayed index; when the cycle is exhausted, reset
    /// the played flags and start a new one, avoiding an immediate repeat
    /// of the current entry.
    fn draw_unplayed(&mut self) -> Option<usize> {
        let mut candidates: Vec<usize> = (0..self.entries.len())
            .filter(|index| !self.entries[*index].played)
            .collect();

        if candidates.is_empty() {
            for entry in &mut self.entries {
                entry.played = false;
            }
            debug!("shuffle cycle complete; resetting played flags");
            candidates = (0..self.entries.len())
                .filter(|index| Some(*index) != self.current)
                .collect();
            if candidates.is_empty() {
                // Single-entry queue: the repeat is unavoidable.
                candidates.push(0);
            }
        }

        let mut rng = rand::rng();
        candidates.choose(&mut rng).copied()
    }

    /// Unplayed entries remaining, the refill trigger for random-category
    /// mode.
    pub fn unplayed_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.played).count()
    }

    /// In random-category mode, top the queue up from the configured
    /// category when the unplayed remainder falls below the floor. At most
    /// one attempt per source per throttle window, counted whether or not
    /// the attempt succeeds.
    pub fn refill_if_needed(
        &mut self,
        source_id: &str,
        engine: &QueryEngine,
    ) -> Result<usize> {
        let PlayMode::RandomCategory { category, media_type } = self.mode.clone() else {
            return Ok(0);
        };
        if self.unplayed_count() >= self.refill.floor {
            return Ok(0);
        }
        let now = Instant::now();
        if let Some(last) = self.last_refill.get(source_id) {
            if now.duration_since(*last) < self.refill.throttle {
                debug!(source = source_id, "refill throttled");
                return Ok(0);
            }
        }
        self.last_refill.insert(source_id.to_string(), now);

        let category_cookie = format_category_cookie(media_type, category);
        let batch = match engine.random_category_batch(&category_cookie, self.refill.batch as usize)
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!(
                    source = source_id,
                    error = %err,
                    "random-category refill failed; retrying after throttle window"
                );
                return Err(err);
            }
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let appended = batch.len();
        for flat in batch {
            self.push_flat(source_id, flat, None);
        }
        self.serial += 1;
        info!(
            source = source_id,
            appended,
            "refilled queue from category"
        );
        Ok(appended)
    }
}
