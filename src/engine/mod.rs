//! Read-mostly query/serving engine.
//!
//! Wraps one [`CatalogStore`] plus the mask of media types this host
//! serves, resolves cookies against it, and answers the listing/detail
//! requests a transport dispatcher forwards from clients.
//!
//! The engine performs no internal locking. The owning driver must hold a
//! single mutual-exclusion lock around every public call, including during
//! the load/import phase; the transport layer usually serializes requests
//! already, and a second layer of locking here would only double the cost.

mod art;

pub use art::{compute_persistent_id, ArtLevel, ArtPayload};

use crate::catalog::{CategoryId, CollectionId, ItemId, MediaMask, MediaType, TitleId};
use crate::catalog_store::CatalogStore;
use crate::config::EngineConfig;
use crate::cookie::{
    self, check_cookie, format_collection_cookie, format_item_cookie, format_title_cookie,
    CookieKind,
};
use crate::error::{CatalogError, Result};
use rand::seq::IndexedRandom;
use serde::Serialize;
use tracing::debug;

/// Placeholder text substituted for a collection that was removed out from
/// under a stale cookie.
pub const MISSING_COLLECTION: &str = "<missing collection>";
/// Placeholder text substituted for a removed item.
pub const MISSING_ITEM: &str = "<missing item>";

#[derive(Clone, Debug, Serialize)]
pub struct CategorySummary {
    pub cookie: String,
    pub name: String,
    pub media_type: MediaType,
}

#[derive(Clone, Debug, Serialize)]
pub struct TitleSummary {
    pub cookie: String,
    pub name: String,
    pub artist: String,
    pub year: u16,
    pub collection_count: usize,
    pub sequence: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectionSummary {
    pub cookie: String,
    pub name: String,
    pub artist: String,
    pub year: u16,
    pub item_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemSummary {
    pub cookie: String,
    pub name: String,
    pub artist: String,
    pub duration_secs: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct TitleDetail {
    pub cookie: String,
    pub name: String,
    pub sort_title: String,
    pub artist: String,
    pub year: u16,
    pub rating: u8,
    pub channels: u8,
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub bit_rate: u32,
    pub added_at: i64,
    pub collections: Vec<CollectionSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectionDetail {
    pub cookie: String,
    pub name: String,
    pub artist: String,
    pub cast: String,
    pub label: String,
    pub rating: u8,
    pub aspect_ratio: String,
    pub format_tag: String,
    pub location: String,
    pub is_playlist: bool,
    pub year: u16,
    pub duration_secs: u32,
    pub items: Vec<ItemSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemDetail {
    pub cookie: String,
    pub name: String,
    pub artist: String,
    pub location: String,
    pub channels: u8,
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub bit_rate: u32,
    pub duration_secs: u32,
}

/// Flattened playback candidate handed to the queue manager.
#[derive(Clone, Debug, Serialize)]
pub struct FlatItem {
    pub item_cookie: String,
    pub title_name: String,
    pub collection_name: String,
    pub item_name: String,
    pub artist: String,
    pub duration_secs: u32,
    pub media_type: MediaType,
}

/// Single-field fetch selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Name,
    Artist,
    Year,
    Duration,
    Rating,
}

pub struct QueryEngine {
    store: CatalogStore,
    media_mask: MediaMask,
    config: EngineConfig,
    ready: bool,
}

impl QueryEngine {
    pub fn new(store: CatalogStore, media_mask: MediaMask, config: EngineConfig) -> Self {
        QueryEngine {
            store,
            media_mask,
            config,
            ready: false,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Mutable access for the load/import phase. The driver holds its lock
    /// across the whole phase and calls [`QueryEngine::set_ready`] after
    /// the finalize pass.
    pub fn store_mut(&mut self) -> &mut CatalogStore {
        &mut self.store
    }

    pub fn media_mask(&self) -> MediaMask {
        self.media_mask
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Well-formed requests against a store that has not finished loading
    /// get a distinguished "try again shortly" error, not `NotFound`.
    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(CatalogError::LoadingNotComplete)
        }
    }

    fn ensure_supported(&self, media_type: MediaType) -> Result<()> {
        if self.media_mask.contains(media_type) {
            Ok(())
        } else {
            Err(CatalogError::BadCookie(format!(
                "media type {} not served by this source",
                media_type
            )))
        }
    }

    // =========================================================================
    // Listings
    // =========================================================================

    pub fn list_categories(&self) -> Result<Vec<CategorySummary>> {
        self.ensure_ready()?;
        Ok(self
            .store
            .categories()
            .filter(|category| self.media_mask.contains(category.core.media_type))
            .map(|category| CategorySummary {
                cookie: cookie::format_category_cookie(category.core.media_type, category.id),
                name: category.core.name.clone(),
                media_type: category.core.media_type,
            })
            .collect())
    }

    /// Titles under a category cookie, in insertion-sequence order.
    /// Category 0 lists every title of the cookie's media type.
    pub fn list_titles(&self, category_cookie: &str) -> Result<Vec<TitleSummary>> {
        self.ensure_ready()?;
        let parsed = cookie::parse_category_cookie(category_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        if parsed.category.raw() != 0 {
            self.store.require_category(parsed.category)?;
        }

        let mut titles = Vec::new();
        for title in self.store.title_sets_by_sequence() {
            if title.core.media_type != parsed.media_type {
                continue;
            }
            if parsed.category.raw() != 0 && !self.title_in_category(title.id, parsed.category) {
                continue;
            }
            titles.push(TitleSummary {
                cookie: format_title_cookie(parsed.media_type, parsed.category, title.id),
                name: title.core.name.clone(),
                artist: title.aggregates.artist.clone(),
                year: title.aggregates.year,
                collection_count: title.collections.len(),
                sequence: title.sequence,
            });
        }
        debug!(
            cookie = category_cookie,
            count = titles.len(),
            "listed titles"
        );
        Ok(titles)
    }

    fn title_in_category(&self, title_id: TitleId, category: CategoryId) -> bool {
        let Some(title) = self.store.title_set(title_id) else {
            return false;
        };
        title.collections.iter().any(|collection_id| {
            self.store
                .collection(*collection_id)
                .map(|collection| collection.categories.contains(&category))
                .unwrap_or(false)
        })
    }

    pub fn list_collections(&self, title_cookie: &str) -> Result<Vec<CollectionSummary>> {
        self.ensure_ready()?;
        let parsed = cookie::parse_title_cookie(title_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        let title = self.store.require_title_set(parsed.title)?;
        Ok(title
            .collections
            .iter()
            .map(|collection_id| {
                self.collection_summary(parsed.media_type, parsed.category, parsed.title, *collection_id)
            })
            .collect())
    }

    fn collection_summary(
        &self,
        media_type: MediaType,
        category: CategoryId,
        title: TitleId,
        collection_id: CollectionId,
    ) -> CollectionSummary {
        let cookie_text = format_collection_cookie(media_type, category, title, collection_id);
        match self.store.collection(collection_id) {
            Some(collection) => CollectionSummary {
                cookie: cookie_text,
                name: collection.core.name.clone(),
                artist: collection.artist.clone(),
                year: collection.year,
                item_count: collection.items.len(),
            },
            // Removed out from under a stale cookie: degrade, don't fail.
            None => CollectionSummary {
                cookie: cookie_text,
                name: MISSING_COLLECTION.to_string(),
                artist: String::new(),
                year: 0,
                item_count: 0,
            },
        }
    }

    pub fn list_items(&self, collection_cookie: &str) -> Result<Vec<ItemSummary>> {
        self.ensure_ready()?;
        let parsed = cookie::parse_collection_cookie(collection_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        let collection = self.store.require_collection(parsed.collection)?;
        Ok(collection
            .items
            .iter()
            .map(|item_id| {
                self.item_summary(
                    parsed.media_type,
                    parsed.category,
                    parsed.title,
                    parsed.collection,
                    *item_id,
                )
            })
            .collect())
    }

    fn item_summary(
        &self,
        media_type: MediaType,
        category: CategoryId,
        title: TitleId,
        collection: CollectionId,
        item_id: ItemId,
    ) -> ItemSummary {
        let cookie_text = format_item_cookie(media_type, category, title, collection, item_id);
        match self.store.item(item_id) {
            Some(item) => ItemSummary {
                cookie: cookie_text,
                name: item.core.name.clone(),
                artist: item.artist.clone(),
                duration_secs: item.duration_secs,
            },
            None => ItemSummary {
                cookie: cookie_text,
                name: MISSING_ITEM.to_string(),
                artist: String::new(),
                duration_secs: 0,
            },
        }
    }

    // =========================================================================
    // Details
    // =========================================================================

    pub fn title_details(&self, title_cookie: &str) -> Result<TitleDetail> {
        self.ensure_ready()?;
        let parsed = cookie::parse_title_cookie(title_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        let title = self.store.require_title_set(parsed.title)?;
        Ok(TitleDetail {
            cookie: title_cookie.to_string(),
            name: title.core.name.clone(),
            sort_title: title.sort_title().to_string(),
            artist: title.aggregates.artist.clone(),
            year: title.aggregates.year,
            rating: title.aggregates.rating,
            channels: title.aggregates.channels,
            sample_rate: title.aggregates.sample_rate,
            bit_depth: title.aggregates.bit_depth,
            bit_rate: title.aggregates.bit_rate,
            added_at: title.added_at,
            collections: title
                .collections
                .iter()
                .map(|collection_id| {
                    self.collection_summary(
                        parsed.media_type,
                        parsed.category,
                        parsed.title,
                        *collection_id,
                    )
                })
                .collect(),
        })
    }

    pub fn collection_details(&self, collection_cookie: &str) -> Result<CollectionDetail> {
        self.ensure_ready()?;
        let parsed = cookie::parse_collection_cookie(collection_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        let collection = self.store.require_collection(parsed.collection)?;
        Ok(CollectionDetail {
            cookie: collection_cookie.to_string(),
            name: collection.core.name.clone(),
            artist: collection.artist.clone(),
            cast: collection.cast.clone(),
            label: collection.label.clone(),
            rating: collection.rating,
            aspect_ratio: collection.aspect_ratio.clone(),
            format_tag: collection.format_tag.clone(),
            location: collection.location.clone(),
            is_playlist: collection.is_playlist,
            year: collection.year,
            duration_secs: collection.duration_secs,
            items: collection
                .items
                .iter()
                .map(|item_id| {
                    self.item_summary(
                        parsed.media_type,
                        parsed.category,
                        parsed.title,
                        parsed.collection,
                        *item_id,
                    )
                })
                .collect(),
        })
    }

    pub fn item_details(&self, item_cookie: &str) -> Result<ItemDetail> {
        self.ensure_ready()?;
        let parsed = cookie::parse_item_cookie(item_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        let item = self.store.require_item(parsed.item)?;
        Ok(ItemDetail {
            cookie: item_cookie.to_string(),
            name: item.core.name.clone(),
            artist: item.artist.clone(),
            location: item.location.clone(),
            channels: item.channels,
            sample_rate: item.sample_rate,
            bit_depth: item.bit_depth,
            bit_rate: item.bit_rate,
            duration_secs: item.duration_secs,
        })
    }

    // =========================================================================
    // Single-field fetch
    // =========================================================================

    pub fn fetch_field(&self, cookie_text: &str, field: Field) -> Result<String> {
        self.ensure_ready()?;
        let kind = check_cookie(cookie_text)?;
        match kind {
            CookieKind::Category => {
                let parsed = cookie::parse_category_cookie(cookie_text)?;
                self.ensure_supported(parsed.media_type)?;
                let category = self.store.require_category(parsed.category)?;
                match field {
                    Field::Name => Ok(category.core.name.clone()),
                    _ => Err(CatalogError::BadCookie(format!(
                        "field {:?} not available on a category cookie",
                        field
                    ))),
                }
            }
            CookieKind::Title => {
                let parsed = cookie::parse_title_cookie(cookie_text)?;
                self.ensure_supported(parsed.media_type)?;
                let title = self.store.require_title_set(parsed.title)?;
                Ok(match field {
                    Field::Name => title.core.name.clone(),
                    Field::Artist => title.aggregates.artist.clone(),
                    Field::Year => title.aggregates.year.to_string(),
                    Field::Rating => title.aggregates.rating.to_string(),
                    Field::Duration => title
                        .collections
                        .iter()
                        .filter_map(|id| self.store.collection(*id))
                        .map(|collection| collection.duration_secs)
                        .sum::<u32>()
                        .to_string(),
                })
            }
            CookieKind::Collection => {
                let parsed = cookie::parse_collection_cookie(cookie_text)?;
                self.ensure_supported(parsed.media_type)?;
                let collection = self.store.require_collection(parsed.collection)?;
                Ok(match field {
                    Field::Name => collection.core.name.clone(),
                    Field::Artist => collection.artist.clone(),
                    Field::Year => collection.year.to_string(),
                    Field::Rating => collection.rating.to_string(),
                    Field::Duration => collection.duration_secs.to_string(),
                })
            }
            CookieKind::Item => {
                let parsed = cookie::parse_item_cookie(cookie_text)?;
                self.ensure_supported(parsed.media_type)?;
                let item = self.store.require_item(parsed.item)?;
                Ok(match field {
                    Field::Name => item.core.name.clone(),
                    Field::Artist => item.artist.clone(),
                    Field::Year => item.year.to_string(),
                    Field::Rating => item.rating.to_string(),
                    Field::Duration => item.duration_secs.to_string(),
                })
            }
        }
    }

    // =========================================================================
    // Random-category batch (playback queue refill)
    // =========================================================================

    /// A random batch of playable items under a category cookie, without
    /// replacement, as flattened records.
    pub fn random_category_batch(
        &self,
        category_cookie: &str,
        count: usize,
    ) -> Result<Vec<FlatItem>> {
        self.ensure_ready()?;
        let parsed = cookie::parse_category_cookie(category_cookie)?;
        self.ensure_supported(parsed.media_type)?;
        if parsed.category.raw() != 0 {
            self.store.require_category(parsed.category)?;
        }

        let mut pool = Vec::new();
        for title in self.store.title_sets_by_sequence() {
            if title.core.media_type != parsed.media_type {
                continue;
            }
            for collection_id in &title.collections {
                let Some(collection) = self.store.collection(*collection_id) else {
                    continue;
                };
                if parsed.category.raw() != 0 && !collection.categories.contains(&parsed.category)
                {
                    continue;
                }
                for item_id in &collection.items {
                    let Some(item) = self.store.item(*item_id) else {
                        continue;
                    };
                    pool.push(FlatItem {
                        item_cookie: format_item_cookie(
                            parsed.media_type,
                            parsed.category,
                            title.id,
                            *collection_id,
                            *item_id,
                        ),
                        title_name: title.core.name.clone(),
                        collection_name: collection.core.name.clone(),
                        item_name: item.core.name.clone(),
                        artist: item.artist.clone(),
                        duration_secs: item.duration_secs,
                        media_type: parsed.media_type,
                    });
                }
            }
        }

        let mut rng = rand::rng();
        let batch: Vec<FlatItem> = pool
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect();
        debug!(
            cookie = category_cookie,
            pool = pool.len(),
            picked = batch.len(),
            "random category batch"
        );
        Ok(batch)
    }

    /// Read-only XML export of the wrapped store.
    pub fn dump_xml<W: std::io::Write>(&self, out: W) -> anyhow::Result<()> {
        self.store.dump_xml(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Collection, Item, MediaMask, TitleSet};

    fn engine_with_fixture() -> (QueryEngine, String, String, String) {
        let mut store = CatalogStore::new();
        let jazz = store
            .insert_category(Category::new("Jazz", MediaType::Music))
            .unwrap();

        let mut item = Item::new("So What", MediaType::Music);
        item.artist = "Miles Davis".to_string();
        item.duration_secs = 562;
        let item_id = store.insert_item(item).unwrap();

        let mut collection = Collection::new("Disc 1", MediaType::Music);
        collection.items.push(item_id);
        collection.categories.insert(jazz);
        collection.artist = "Miles Davis".to_string();
        let col_id = store.insert_collection(collection).unwrap();

        let title_id = store
            .insert_title_set(TitleSet::new("Kind of Blue", MediaType::Music))
            .unwrap();
        store.attach_collection(title_id, col_id).unwrap();
        store.finalize_collection(title_id, col_id).unwrap();
        store.finalize_title_set(title_id).unwrap();

        let title_cookie = format_title_cookie(MediaType::Music, jazz, title_id);
        let collection_cookie =
            format_collection_cookie(MediaType::Music, jazz, title_id, col_id);
        let item_cookie = format_item_cookie(MediaType::Music, jazz, title_id, col_id, item_id);

        let mut engine = QueryEngine::new(
            store,
            MediaMask::of(&[MediaType::Music]),
            EngineConfig::default(),
        );
        engine.set_ready(true);
        (engine, title_cookie, collection_cookie, item_cookie)
    }

    #[test]
    fn not_ready_engine_says_loading_not_complete() {
        let (mut engine, title_cookie, _, _) = engine_with_fixture();
        engine.set_ready(false);
        assert!(matches!(
            engine.list_collections(&title_cookie),
            Err(CatalogError::LoadingNotComplete)
        ));
        assert!(matches!(
            engine.list_categories(),
            Err(CatalogError::LoadingNotComplete)
        ));
    }

    #[test]
    fn listings_walk_the_hierarchy() {
        let (engine, title_cookie, collection_cookie, _) = engine_with_fixture();

        let categories = engine.list_categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Jazz");

        let titles = engine.list_titles(&categories[0].cookie).unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].name, "Kind of Blue");
        assert_eq!(titles[0].cookie, title_cookie);

        let collections = engine.list_collections(&title_cookie).unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].cookie, collection_cookie);

        let items = engine.list_items(&collection_cookie).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "So What");
    }

    #[test]
    fn stale_item_reference_degrades_to_placeholder() {
        let (mut engine, _, collection_cookie, item_cookie) = engine_with_fixture();
        let parsed = cookie::parse_item_cookie(&item_cookie).unwrap();
        engine.store_mut().remove_item(parsed.item).unwrap();

        // Force the stale reference back so the cookie dangles.
        let parsed_col = cookie::parse_collection_cookie(&collection_cookie).unwrap();
        engine
            .store_mut()
            .collection_mut(parsed_col.collection)
            .unwrap()
            .items
            .push(parsed.item);

        let items = engine.list_items(&collection_cookie).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, MISSING_ITEM);

        let detail = engine.collection_details(&collection_cookie).unwrap();
        assert_eq!(detail.items[0].name, MISSING_ITEM);
    }

    #[test]
    fn absent_cookie_target_is_not_found() {
        let (engine, _, _, _) = engine_with_fixture();
        assert!(matches!(
            engine.title_details("mus:0:999"),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn unsupported_media_type_is_a_caller_error() {
        let (engine, _, _, _) = engine_with_fixture();
        assert!(matches!(
            engine.list_titles("vid:0"),
            Err(CatalogError::BadCookie(_))
        ));
    }

    #[test]
    fn fetch_field_resolves_by_cookie_kind() {
        let (engine, title_cookie, collection_cookie, item_cookie) = engine_with_fixture();
        assert_eq!(
            engine.fetch_field(&title_cookie, Field::Artist).unwrap(),
            "Miles Davis"
        );
        assert_eq!(
            engine.fetch_field(&collection_cookie, Field::Name).unwrap(),
            "Disc 1"
        );
        assert_eq!(
            engine.fetch_field(&item_cookie, Field::Duration).unwrap(),
            "562"
        );
    }

    #[test]
    fn random_batch_is_bounded_by_pool() {
        let (engine, _, _, _) = engine_with_fixture();
        let batch = engine.random_category_batch("mus:0", 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].item_name, "So What");
        assert_eq!(batch[0].title_name, "Kind of Blue");
    }

    #[test]
    fn summaries_serialize_for_the_transport_layer() {
        let (engine, _, _, _) = engine_with_fixture();
        let categories = engine.list_categories().unwrap();
        let encoded = serde_json::to_string(&categories).unwrap();
        assert!(encoded.contains("Jazz"));
    }
}
