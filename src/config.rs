//! Optional TOML configuration for the catalog layer.
//!
//! Everything has a default; a config file only overrides what it names.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub engine: Option<EngineFileConfig>,
    pub client_cache: Option<ClientCacheFileConfig>,
    pub playback_queue: Option<PlaybackQueueFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EngineFileConfig {
    /// Art payloads above this many bytes are downscaled before caching.
    pub art_byte_threshold: Option<usize>,
    /// Longest edge, in pixels, of downscaled art.
    pub art_scaled_edge: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ClientCacheFileConfig {
    /// Floor between serial re-checks of one source, in seconds.
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PlaybackQueueFileConfig {
    /// Random-category mode refills when unplayed entries drop below this.
    pub refill_floor: Option<usize>,
    /// Entries fetched per refill.
    pub refill_batch: Option<u16>,
    /// Minimum seconds between refill attempts against one source.
    pub refill_throttle_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn engine_config(&self) -> EngineConfig {
        let file = self.engine.clone().unwrap_or_default();
        let defaults = EngineConfig::default();
        EngineConfig {
            art_byte_threshold: file.art_byte_threshold.unwrap_or(defaults.art_byte_threshold),
            art_scaled_edge: file.art_scaled_edge.unwrap_or(defaults.art_scaled_edge),
        }
    }

    pub fn client_cache_config(&self) -> ClientCacheConfig {
        let file = self.client_cache.clone().unwrap_or_default();
        let defaults = ClientCacheConfig::default();
        ClientCacheConfig {
            poll_interval: file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        }
    }

    pub fn refill_config(&self) -> RefillConfig {
        let file = self.playback_queue.clone().unwrap_or_default();
        let defaults = RefillConfig::default();
        RefillConfig {
            floor: file.refill_floor.unwrap_or(defaults.floor),
            batch: file.refill_batch.unwrap_or(defaults.batch),
            throttle: file
                .refill_throttle_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.throttle),
        }
    }
}

/// Resolved engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub art_byte_threshold: usize,
    pub art_scaled_edge: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            art_byte_threshold: 512 * 1024,
            art_scaled_edge: 1024,
        }
    }
}

/// Resolved client-cache settings.
#[derive(Debug, Clone)]
pub struct ClientCacheConfig {
    pub poll_interval: Duration,
}

impl Default for ClientCacheConfig {
    fn default() -> Self {
        ClientCacheConfig {
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Resolved random-category refill settings.
#[derive(Debug, Clone)]
pub struct RefillConfig {
    pub floor: usize,
    pub batch: u16,
    pub throttle: Duration,
}

impl Default for RefillConfig {
    fn default() -> Self {
        RefillConfig {
            floor: 5,
            batch: 20,
            throttle: Duration::from_secs(600),
        }
    }
}
