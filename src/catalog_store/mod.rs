//! The in-memory catalog store.
//!
//! Owns one table per entity kind, assigns local IDs, keeps cross-table
//! references consistent on removal, and runs the bottom-up finalize
//! aggregation. Loaders populate it through the insert API; the query
//! engine wraps it read-mostly.
//!
//! The store performs no internal locking. The owning driver serializes
//! all access, including the load phase, behind a single lock.

mod artist_map;
mod persist;
mod xml_dump;

pub use artist_map::ArtistMap;
pub use persist::SNAPSHOT_MAGIC;

use crate::catalog::{
    Category, CategoryId, Collection, CollectionId, Image, ImageId, Item, ItemId, TitleId,
    TitleSet, VARIOUS_ARTISTS,
};
use crate::error::{CatalogError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// In-memory catalog: one snapshot of one or more media sources.
#[derive(Debug, Default)]
pub struct CatalogStore {
    categories: BTreeMap<u16, Category>,
    images: BTreeMap<u16, Image>,
    items: BTreeMap<u16, Item>,
    collections: BTreeMap<u16, Collection>,
    title_sets: BTreeMap<u16, TitleSet>,

    // Local IDs start at 1 and are never reused within a snapshot, even
    // after removal, so outstanding references stay detectably stale.
    next_category_id: u16,
    next_image_id: u16,
    next_item_id: u16,
    next_collection_id: u16,
    next_title_id: u16,

    // Title insertion sequence; never renumbered on deletion.
    next_sequence: u32,
}

fn bump_id(counter: &mut u16, table: &'static str) -> Result<u16> {
    if *counter == 0 {
        *counter = 1;
    }
    let id = *counter;
    *counter = counter
        .checked_add(1)
        .ok_or(CatalogError::IdSpaceExhausted(table))?;
    Ok(id)
}

impl CatalogStore {
    pub fn new() -> Self {
        CatalogStore {
            next_category_id: 1,
            next_image_id: 1,
            next_item_id: 1,
            next_collection_id: 1,
            next_title_id: 1,
            next_sequence: 1,
            ..Default::default()
        }
    }

    /// Discard everything and start a fresh snapshot. Counters restart:
    /// ID stability is promised within one snapshot, not across them.
    pub fn reset(&mut self) {
        *self = CatalogStore::new();
    }

    // =========================================================================
    // Insertion (builder-style surface for loaders)
    // =========================================================================

    pub fn insert_category(&mut self, mut category: Category) -> Result<CategoryId> {
        if self
            .categories
            .values()
            .any(|existing| existing.core.name == category.core.name)
        {
            return Err(CatalogError::DuplicateName(category.core.name));
        }
        let id = CategoryId(bump_id(&mut self.next_category_id, "category")?);
        category.id = id;
        if category.core.unique_id.is_empty() {
            category.core.unique_id = format!("gen-category-{}", id);
        }
        category.core.touch();
        self.categories.insert(id.raw(), category);
        Ok(id)
    }

    pub fn insert_image(&mut self, mut image: Image) -> Result<ImageId> {
        let id = ImageId(bump_id(&mut self.next_image_id, "image")?);
        image.id = id;
        if image.core.unique_id.is_empty() {
            image.core.unique_id = format!("gen-image-{}", id);
        }
        image.core.touch();
        self.images.insert(id.raw(), image);
        Ok(id)
    }

    pub fn insert_item(&mut self, mut item: Item) -> Result<ItemId> {
        let id = ItemId(bump_id(&mut self.next_item_id, "item")?);
        item.id = id;
        if item.core.unique_id.is_empty() {
            item.core.unique_id = format!("gen-item-{}", id);
        }
        item.core.touch();
        self.items.insert(id.raw(), item);
        Ok(id)
    }

    /// Insert a collection. Every referenced item and category must already
    /// be in the store.
    pub fn insert_collection(&mut self, mut collection: Collection) -> Result<CollectionId> {
        for item_id in &collection.items {
            if !self.items.contains_key(&item_id.raw()) {
                return Err(CatalogError::NotFound {
                    kind: "item",
                    id: item_id.raw().into(),
                });
            }
        }
        for category_id in &collection.categories {
            if !self.categories.contains_key(&category_id.raw()) {
                return Err(CatalogError::NotFound {
                    kind: "category",
                    id: category_id.raw().into(),
                });
            }
        }
        let id = CollectionId(bump_id(&mut self.next_collection_id, "collection")?);
        collection.id = id;
        if collection.core.unique_id.is_empty() {
            collection.core.unique_id = format!("gen-collection-{}", id);
        }
        collection.core.touch();
        self.collections.insert(id.raw(), collection);
        Ok(id)
    }

    /// Insert a title set. Referenced collections must exist and share the
    /// title's media type; the sequence number is assigned here and never
    /// reused.
    pub fn insert_title_set(&mut self, mut title: TitleSet) -> Result<TitleId> {
        for collection_id in &title.collections {
            let collection = self.collections.get(&collection_id.raw()).ok_or(
                CatalogError::NotFound {
                    kind: "collection",
                    id: collection_id.raw().into(),
                },
            )?;
            if collection.core.media_type != title.core.media_type {
                return Err(CatalogError::MediaTypeMismatch {
                    title: title.id.raw(),
                    expected: title.core.media_type,
                    got: collection.core.media_type,
                });
            }
        }
        let id = TitleId(bump_id(&mut self.next_title_id, "title set")?);
        title.id = id;
        title.sequence = self.next_sequence;
        self.next_sequence += 1;
        if title.core.unique_id.is_empty() {
            title.core.unique_id = format!("gen-title-{}", id);
        }
        let now = chrono::Utc::now().timestamp();
        if title.added_at == 0 {
            title.added_at = now;
        }
        title.core.touch();
        self.title_sets.insert(id.raw(), title);
        Ok(id)
    }

    /// Append an existing collection to an existing title set, enforcing
    /// the single-media-type invariant.
    pub fn attach_collection(&mut self, title_id: TitleId, collection_id: CollectionId) -> Result<()> {
        let collection_media = self
            .collections
            .get(&collection_id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "collection",
                id: collection_id.raw().into(),
            })?
            .core
            .media_type;
        let title = self
            .title_sets
            .get_mut(&title_id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "title set",
                id: title_id.raw().into(),
            })?;
        if collection_media != title.core.media_type {
            return Err(CatalogError::MediaTypeMismatch {
                title: title_id.raw(),
                expected: title.core.media_type,
                got: collection_media,
            });
        }
        if !title.collections.contains(&collection_id) {
            title.collections.push(collection_id);
            title.core.touch();
        }
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id.raw())
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.get(&id.raw())
    }

    pub fn image_mut(&mut self, id: ImageId) -> Option<&mut Image> {
        self.images.get_mut(&id.raw())
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id.raw())
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id.raw())
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(&id.raw())
    }

    pub fn collection_mut(&mut self, id: CollectionId) -> Option<&mut Collection> {
        self.collections.get_mut(&id.raw())
    }

    pub fn title_set(&self, id: TitleId) -> Option<&TitleSet> {
        self.title_sets.get(&id.raw())
    }

    pub fn title_set_mut(&mut self, id: TitleId) -> Option<&mut TitleSet> {
        self.title_sets.get_mut(&id.raw())
    }

    // Strict variants for callers that treat absence as an error.

    pub fn require_category(&self, id: CategoryId) -> Result<&Category> {
        self.category(id).ok_or(CatalogError::NotFound {
            kind: "category",
            id: id.raw().into(),
        })
    }

    pub fn require_item(&self, id: ItemId) -> Result<&Item> {
        self.item(id).ok_or(CatalogError::NotFound {
            kind: "item",
            id: id.raw().into(),
        })
    }

    pub fn require_collection(&self, id: CollectionId) -> Result<&Collection> {
        self.collection(id).ok_or(CatalogError::NotFound {
            kind: "collection",
            id: id.raw().into(),
        })
    }

    pub fn require_title_set(&self, id: TitleId) -> Result<&TitleSet> {
        self.title_set(id).ok_or(CatalogError::NotFound {
            kind: "title set",
            id: id.raw().into(),
        })
    }

    pub fn require_image(&self, id: ImageId) -> Result<&Image> {
        self.image(id).ok_or(CatalogError::NotFound {
            kind: "image",
            id: id.raw().into(),
        })
    }

    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.values().find(|c| c.core.name == name)
    }

    pub fn find_category_by_unique_id(&self, unique_id: &str) -> Option<&Category> {
        self.categories
            .values()
            .find(|c| c.core.unique_id == unique_id)
    }

    pub fn find_image_by_unique_id(&self, unique_id: &str) -> Option<&Image> {
        self.images.values().find(|i| i.core.unique_id == unique_id)
    }

    pub fn find_item_by_unique_id(&self, unique_id: &str) -> Option<&Item> {
        self.items.values().find(|i| i.core.unique_id == unique_id)
    }

    pub fn find_collection_by_unique_id(&self, unique_id: &str) -> Option<&Collection> {
        self.collections
            .values()
            .find(|c| c.core.unique_id == unique_id)
    }

    pub fn find_title_set_by_unique_id(&self, unique_id: &str) -> Option<&TitleSet> {
        self.title_sets
            .values()
            .find(|t| t.core.unique_id == unique_id)
    }

    // =========================================================================
    // Iteration / counts
    // =========================================================================

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.images.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn title_sets(&self) -> impl Iterator<Item = &TitleSet> {
        self.title_sets.values()
    }

    /// Title sets ordered by their insertion sequence.
    pub fn title_sets_by_sequence(&self) -> Vec<&TitleSet> {
        let mut titles: Vec<&TitleSet> = self.title_sets.values().collect();
        titles.sort_by_key(|t| t.sequence);
        titles
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn title_set_count(&self) -> usize {
        self.title_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.title_sets.is_empty()
            && self.collections.is_empty()
            && self.items.is_empty()
            && self.categories.is_empty()
            && self.images.is_empty()
    }

    // =========================================================================
    // Removal (cascades reference cleanup; local IDs are not reclaimed)
    // =========================================================================

    pub fn remove_category(&mut self, id: CategoryId) -> Result<()> {
        self.categories
            .remove(&id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "category",
                id: id.raw().into(),
            })?;
        for collection in self.collections.values_mut() {
            collection.categories.remove(&id);
        }
        debug!(category = id.raw(), "removed category");
        Ok(())
    }

    pub fn remove_image(&mut self, id: ImageId) -> Result<()> {
        self.images.remove(&id.raw()).ok_or(CatalogError::NotFound {
            kind: "image",
            id: id.raw().into(),
        })?;
        for category in self.categories.values_mut() {
            if category.core.image == Some(id) {
                category.core.image = None;
            }
        }
        for item in self.items.values_mut() {
            if item.core.image == Some(id) {
                item.core.image = None;
            }
        }
        for collection in self.collections.values_mut() {
            if collection.core.image == Some(id) {
                collection.core.image = None;
            }
        }
        for title in self.title_sets.values_mut() {
            if title.core.image == Some(id) {
                title.core.image = None;
            }
        }
        Ok(())
    }

    pub fn remove_item(&mut self, id: ItemId) -> Result<()> {
        self.items.remove(&id.raw()).ok_or(CatalogError::NotFound {
            kind: "item",
            id: id.raw().into(),
        })?;
        for collection in self.collections.values_mut() {
            collection.items.retain(|item_id| *item_id != id);
        }
        Ok(())
    }

    pub fn remove_collection(&mut self, id: CollectionId) -> Result<()> {
        self.collections
            .remove(&id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "collection",
                id: id.raw().into(),
            })?;
        for title in self.title_sets.values_mut() {
            title.collections.retain(|col_id| *col_id != id);
        }
        Ok(())
    }

    pub fn remove_title_set(&mut self, id: TitleId) -> Result<()> {
        self.title_sets
            .remove(&id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "title set",
                id: id.raw().into(),
            })?;
        Ok(())
    }

    // =========================================================================
    // Finalize: explicit bottom-up aggregation, invoked by the owning
    // driver after load or after any edit. Not automatic on mutation.
    // =========================================================================

    /// Recompute a collection's derived fields from its items and union the
    /// items' loader-recorded categories onto it.
    pub fn finalize_collection(
        &mut self,
        title_id: TitleId,
        collection_id: CollectionId,
    ) -> Result<()> {
        let title = self.require_title_set(title_id)?;
        if !title.collections.contains(&collection_id) {
            return Err(CatalogError::NotFound {
                kind: "collection",
                id: collection_id.raw().into(),
            });
        }

        let item_ids = self.require_collection(collection_id)?.items.clone();

        let mut channels = 0u8;
        let mut sample_rate = 0u32;
        let mut bit_depth = 0u8;
        let mut bit_rate = 0u32;
        let mut duration = 0u32;
        let mut year = 0u16;
        let mut rating = 0u8;
        let mut artist: Option<String> = None;
        let mut mixed_artists = false;
        let mut categories: Vec<CategoryId> = Vec::new();

        for item_id in &item_ids {
            // Items removed since load are simply skipped; finalize is a
            // best-effort recomputation, not an integrity check.
            let Some(item) = self.items.get(&item_id.raw()) else {
                continue;
            };
            channels = channels.max(item.channels);
            sample_rate = sample_rate.max(item.sample_rate);
            bit_depth = bit_depth.max(item.bit_depth);
            bit_rate = bit_rate.max(item.bit_rate);
            duration += item.duration_secs;
            rating = rating.max(item.rating);
            if item.year != 0 {
                year = if year == 0 { item.year } else { year.min(item.year) };
            }
            if !item.artist.is_empty() && !mixed_artists {
                match &artist {
                    None => artist = Some(item.artist.clone()),
                    Some(current) if *current != item.artist => {
                        mixed_artists = true;
                        artist = Some(VARIOUS_ARTISTS.to_string());
                    }
                    Some(_) => {}
                }
            }
            categories.extend(item.load_categories.iter().copied());
        }

        let collection = self
            .collections
            .get_mut(&collection_id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "collection",
                id: collection_id.raw().into(),
            })?;
        collection.channels = channels;
        collection.sample_rate = sample_rate;
        collection.bit_depth = bit_depth;
        collection.bit_rate = bit_rate;
        collection.duration_secs = duration;
        if year != 0 {
            collection.year = year;
        }
        collection.rating = collection.rating.max(rating);
        if let Some(artist) = artist {
            collection.artist = artist;
        }
        for category in categories {
            collection.categories.insert(category);
        }
        Ok(())
    }

    /// Recompute a title set's aggregate-only fields from its collections.
    /// Collections are expected to have been finalized first.
    pub fn finalize_title_set(&mut self, title_id: TitleId) -> Result<()> {
        let collection_ids = self.require_title_set(title_id)?.collections.clone();

        let mut agg = crate::catalog::TitleAggregates::default();
        let mut artist: Option<String> = None;
        let mut mixed_artists = false;

        for collection_id in &collection_ids {
            let Some(collection) = self.collections.get(&collection_id.raw()) else {
                continue;
            };
            agg.channels = agg.channels.max(collection.channels);
            agg.sample_rate = agg.sample_rate.max(collection.sample_rate);
            agg.bit_depth = agg.bit_depth.max(collection.bit_depth);
            agg.bit_rate = agg.bit_rate.max(collection.bit_rate);
            agg.rating = agg.rating.max(collection.rating);
            if collection.year != 0 {
                agg.year = if agg.year == 0 {
                    collection.year
                } else {
                    agg.year.min(collection.year)
                };
            }
            if !collection.artist.is_empty() && !mixed_artists {
                match &artist {
                    None => artist = Some(collection.artist.clone()),
                    Some(current) if *current != collection.artist => {
                        mixed_artists = true;
                        artist = Some(VARIOUS_ARTISTS.to_string());
                    }
                    Some(_) => {}
                }
            }
        }

        agg.artist = artist.unwrap_or_default();

        let title = self
            .title_sets
            .get_mut(&title_id.raw())
            .ok_or(CatalogError::NotFound {
                kind: "title set",
                id: title_id.raw().into(),
            })?;
        title.aggregates = agg;
        Ok(())
    }

    /// Verify cross-reference integrity of a freshly deserialized store.
    #[cfg(not(feature = "no_checks"))]
    pub(crate) fn validate_integrity(&self) -> Result<()> {
        let image_ok = |image: &Option<ImageId>| match image {
            Some(id) => self.images.contains_key(&id.raw()),
            None => true,
        };
        for collection in self.collections.values() {
            for item_id in &collection.items {
                if !self.items.contains_key(&item_id.raw()) {
                    return Err(CatalogError::Corrupt(format!(
                        "collection {} references missing item {}",
                        collection.id, item_id
                    )));
                }
            }
            for category_id in &collection.categories {
                if !self.categories.contains_key(&category_id.raw()) {
                    return Err(CatalogError::Corrupt(format!(
                        "collection {} references missing category {}",
                        collection.id, category_id
                    )));
                }
            }
            if !image_ok(&collection.core.image) {
                return Err(CatalogError::Corrupt(format!(
                    "collection {} references a missing image",
                    collection.id
                )));
            }
        }
        for title in self.title_sets.values() {
            for collection_id in &title.collections {
                let Some(collection) = self.collections.get(&collection_id.raw()) else {
                    return Err(CatalogError::Corrupt(format!(
                        "title set {} references missing collection {}",
                        title.id, collection_id
                    )));
                };
                if collection.core.media_type != title.core.media_type {
                    return Err(CatalogError::Corrupt(format!(
                        "title set {} mixes media types",
                        title.id
                    )));
                }
            }
            if !image_ok(&title.core.image) {
                return Err(CatalogError::Corrupt(format!(
                    "title set {} references a missing image",
                    title.id
                )));
            }
        }
        for item in self.items.values() {
            if !image_ok(&item.core.image) {
                return Err(CatalogError::Corrupt(format!(
                    "item {} references a missing image",
                    item.id
                )));
            }
        }
        Ok(())
    }

    #[cfg(feature = "no_checks")]
    pub(crate) fn validate_integrity(&self) -> Result<()> {
        Ok(())
    }
}
