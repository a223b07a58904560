//! Mediateca: the media-catalog layer of the home automation platform.
//!
//! Heterogeneous media sources (disc changers, file trees, streaming
//! catalogs) are normalized into one in-memory catalog, addressed by
//! compact text cookies, served to concurrent clients, mirrored into
//! client-side snapshot caches with serial-number change detection, and
//! sequenced into playback order.
//!
//! Locking contract, in short: [`catalog_store::CatalogStore`],
//! [`engine::QueryEngine`] and [`playback_queue::PlaybackQueue`] are
//! driver-locked (one mutex around all access, no internal locking);
//! [`client_cache::SnapshotCache`] synchronizes itself because unrelated
//! client threads and its poller share it.

pub mod catalog;
pub mod catalog_store;
pub mod client_cache;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod playback_queue;

// Re-export commonly used types for convenience
pub use catalog::{ArtKind, MediaMask, MediaType};
pub use catalog_store::CatalogStore;
pub use client_cache::{CacheLookup, SnapshotCache, SourceClient};
pub use engine::{ArtLevel, QueryEngine};
pub use error::{CatalogError, Result};
pub use playback_queue::{PlayMode, PlaybackQueue, QueueAction};
