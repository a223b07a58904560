use super::{CategoryId, CollectionId, EntityCore, ItemId, MediaType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether a collection's location string applies to the whole collection
/// or each item carries its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationKind {
    PerCollection,
    PerItem,
}

impl LocationKind {
    pub fn as_u8(&self) -> u8 {
        match self {
            LocationKind::PerCollection => 1,
            LocationKind::PerItem => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(LocationKind::PerCollection),
            2 => Some(LocationKind::PerItem),
            _ => None,
        }
    }
}

/// An ordered group of items: a disc, an album side, a picture roll, or a
/// user playlist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub core: EntityCore,

    /// Ordered item references.
    pub items: Vec<ItemId>,
    /// Categories this collection belongs to. Populated directly by the
    /// loader and unioned with the contained items' category lists during
    /// finalize.
    pub categories: BTreeSet<CategoryId>,

    pub artist: String,
    pub cast: String,
    pub label: String,
    pub rating: u8,
    pub aspect_ratio: String,
    pub format_tag: String,
    pub location: String,
    pub location_kind: LocationKind,
    pub is_playlist: bool,
    pub year: u16,
    pub duration_secs: u32,

    /// Audio aggregates recomputed from items by finalize; not persisted.
    #[serde(skip)]
    pub channels: u8,
    #[serde(skip)]
    pub sample_rate: u32,
    #[serde(skip)]
    pub bit_depth: u8,
    #[serde(skip)]
    pub bit_rate: u32,
}

impl Collection {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        Collection {
            id: CollectionId::UNASSIGNED,
            core: EntityCore::named(name, media_type),
            items: Vec::new(),
            categories: BTreeSet::new(),
            artist: String::new(),
            cast: String::new(),
            label: String::new(),
            rating: 0,
            aspect_ratio: String::new(),
            format_tag: String::new(),
            location: String::new(),
            location_kind: LocationKind::PerItem,
            is_playlist: false,
            year: 0,
            duration_secs: 0,
            channels: 0,
            sample_rate: 0,
            bit_depth: 0,
            bit_rate: 0,
        }
    }
}
