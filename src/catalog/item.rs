use super::{CategoryId, EntityCore, ItemId, MediaType};
use serde::{Deserialize, Serialize};

/// Leaf of the hierarchy: a single track or a single picture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub core: EntityCore,

    pub channels: u8,
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub bit_rate: u32,
    pub duration_secs: u32,

    /// Aggregated upward by finalize; not persisted.
    #[serde(skip)]
    pub rating: u8,
    /// Aggregated upward by finalize; not persisted.
    #[serde(skip)]
    pub year: u16,

    pub artist: String,
    pub location: String,

    /// Category local-IDs recorded by the loader, consumed by
    /// `finalize_collection` to aggregate categories onto the owning
    /// collection. Not persisted.
    #[serde(skip)]
    pub load_categories: Vec<CategoryId>,
}

impl Item {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        Item {
            id: ItemId::UNASSIGNED,
            core: EntityCore::named(name, media_type),
            channels: 0,
            sample_rate: 0,
            bit_depth: 0,
            bit_rate: 0,
            duration_secs: 0,
            rating: 0,
            year: 0,
            artist: String::new(),
            location: String::new(),
            load_categories: Vec::new(),
        }
    }
}
