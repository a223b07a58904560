use super::{CollectionId, EntityCore, MediaType, TitleId};
use serde::{Deserialize, Serialize};

/// Fields that exist only as aggregates over the contained collections and
/// items. Recomputed by `finalize_title_set`, never persisted.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TitleAggregates {
    pub bit_depth: u8,
    pub bit_rate: u32,
    pub channels: u8,
    pub sample_rate: u32,
    pub year: u16,
    pub rating: u8,
    pub artist: String,
}

/// A title: the unit a user browses to (an album, a film, a photo shoot),
/// holding an ordered list of collections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TitleSet {
    pub id: TitleId,
    pub core: EntityCore,

    /// Ordered collection references. All referenced collections share one
    /// media type; the store enforces this on insertion.
    pub collections: Vec<CollectionId>,

    /// Explicit sort title; empty means "sort by display name".
    pub sort_title: String,

    /// Monotonically increasing insertion sequence. Assigned by the store,
    /// never reused or renumbered on deletion.
    pub sequence: u32,

    /// Unix seconds when this title entered the catalog.
    pub added_at: i64,

    #[serde(skip)]
    pub aggregates: TitleAggregates,
}

impl TitleSet {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        TitleSet {
            id: TitleId::UNASSIGNED,
            core: EntityCore::named(name, media_type),
            collections: Vec::new(),
            sort_title: String::new(),
            sequence: 0,
            added_at: 0,
            aggregates: TitleAggregates::default(),
        }
    }

    /// Sort title, falling back to the display name when none was set.
    pub fn sort_title(&self) -> &str {
        if self.sort_title.is_empty() {
            &self.core.name
        } else {
            &self.sort_title
        }
    }
}
