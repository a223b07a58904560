//! Shared fixture building for integration tests.
//!
//! Each e2e binary uses a subset of these helpers.
#![allow(dead_code)]

use mediateca::catalog::{
    Category, CategoryId, Collection, CollectionId, Item, ItemId, TitleId, TitleSet,
};
use mediateca::config::EngineConfig;
use mediateca::{CatalogStore, MediaMask, MediaType, QueryEngine};

static TRACING: std::sync::Once = std::sync::Once::new();

/// Install the fmt subscriber once per test binary; `RUST_LOG` filters it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub struct FixtureIds {
    pub jazz: CategoryId,
    pub rock: CategoryId,
    pub title_kob: TitleId,
    pub title_nevermind: TitleId,
    pub kob_disc: CollectionId,
    pub kob_items: Vec<ItemId>,
}

/// Two music titles: "Kind of Blue" (Jazz, 2 tracks) and "Nevermind"
/// (Rock, 2 tracks), finalized and ready to serve.
pub fn build_catalog() -> (CatalogStore, FixtureIds) {
    init_tracing();
    let mut store = CatalogStore::new();

    let jazz = store
        .insert_category(Category::new("Jazz", MediaType::Music))
        .unwrap();
    let rock = store
        .insert_category(Category::new("Rock", MediaType::Music))
        .unwrap();

    let (title_kob, kob_disc, kob_items) = insert_title(
        &mut store,
        "Kind of Blue",
        "Miles Davis",
        1959,
        jazz,
        &["So What", "Freddie Freeloader"],
    );
    let (title_nevermind, _, _) = insert_title(
        &mut store,
        "Nevermind",
        "Nirvana",
        1991,
        rock,
        &["Smells Like Teen Spirit", "Come as You Are"],
    );

    (
        store,
        FixtureIds {
            jazz,
            rock,
            title_kob,
            title_nevermind,
            kob_disc,
            kob_items,
        },
    )
}

fn insert_title(
    store: &mut CatalogStore,
    title_name: &str,
    artist: &str,
    year: u16,
    category: CategoryId,
    tracks: &[&str],
) -> (TitleId, CollectionId, Vec<ItemId>) {
    let mut item_ids = Vec::new();
    for track in tracks {
        let mut item = Item::new(*track, MediaType::Music);
        item.artist = artist.to_string();
        item.year = year;
        item.channels = 2;
        item.sample_rate = 44100;
        item.bit_depth = 16;
        item.bit_rate = 1411;
        item.duration_secs = 300;
        item.load_categories = vec![category];
        item_ids.push(store.insert_item(item).unwrap());
    }

    let mut collection = Collection::new("Disc 1", MediaType::Music);
    collection.items = item_ids.clone();
    collection.artist = artist.to_string();
    collection.year = year;
    let collection_id = store.insert_collection(collection).unwrap();

    let title_id = store
        .insert_title_set(TitleSet::new(title_name, MediaType::Music))
        .unwrap();
    store.attach_collection(title_id, collection_id).unwrap();
    store.finalize_collection(title_id, collection_id).unwrap();
    store.finalize_title_set(title_id).unwrap();

    (title_id, collection_id, item_ids)
}

/// Run the finalize pass over every title the way a driver does after a
/// load.
pub fn finalize_all(store: &mut CatalogStore, ids: &FixtureIds) {
    for title_id in [ids.title_kob, ids.title_nevermind] {
        let collections = store.title_set(title_id).unwrap().collections.clone();
        for collection_id in collections {
            store.finalize_collection(title_id, collection_id).unwrap();
        }
        store.finalize_title_set(title_id).unwrap();
    }
}

/// Engine over the standard fixture, marked ready.
pub fn build_engine() -> (QueryEngine, FixtureIds) {
    let (store, ids) = build_catalog();
    let mut engine = QueryEngine::new(
        store,
        MediaMask::of(&[MediaType::Music]),
        EngineConfig::default(),
    );
    engine.set_ready(true);
    (engine, ids)
}
