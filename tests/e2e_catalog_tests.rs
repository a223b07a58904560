//! End-to-end catalog store tests: snapshot round trip, aggregation,
//! reset, artist index, XML export.

mod common;

use common::{build_catalog, finalize_all};
use mediateca::catalog::{Collection, Item, TitleSet, VARIOUS_ARTISTS};
use mediateca::catalog_store::ArtistMap;
use mediateca::{CatalogError, CatalogStore, MediaType};

#[test]
fn snapshot_round_trip_preserves_counts_fields_and_topology() {
    let (store, ids) = build_catalog();

    let mut snapshot = Vec::new();
    store.serialize(&mut snapshot).unwrap();
    let mut restored = CatalogStore::deserialize(snapshot.as_slice()).unwrap();

    assert_eq!(restored.category_count(), store.category_count());
    assert_eq!(restored.item_count(), store.item_count());
    assert_eq!(restored.collection_count(), store.collection_count());
    assert_eq!(restored.title_set_count(), store.title_set_count());

    // Persisted field values survive...
    let kob = restored.title_set(ids.title_kob).unwrap();
    assert_eq!(kob.core.name, "Kind of Blue");
    assert_eq!(kob.sequence, store.title_set(ids.title_kob).unwrap().sequence);

    // ...and so does the reference topology.
    let disc = restored.collection(ids.kob_disc).unwrap();
    assert_eq!(disc.items, ids.kob_items);
    assert!(disc.categories.contains(&ids.jazz));
    for item_id in &ids.kob_items {
        assert!(restored.item(*item_id).is_some());
    }

    // Aggregates are recomputed, not persisted: absent until the driver
    // reruns the finalize pass.
    assert_eq!(kob.aggregates.artist, "");
    finalize_all(&mut restored, &ids);
    assert_eq!(
        restored.title_set(ids.title_kob).unwrap().aggregates.artist,
        "Miles Davis"
    );
}

#[test]
fn aggregation_follows_min_year_max_depth_and_artist_rules() {
    let mut store = CatalogStore::new();
    let title = store
        .insert_title_set(TitleSet::new("box", MediaType::Music))
        .unwrap();

    for (year, depth, artist) in [
        (1990u16, 16u8, "Same Artist"),
        (2001, 24, "Same Artist"),
        (1985, 20, "Same Artist"),
    ] {
        let mut item = Item::new("t", MediaType::Music);
        item.year = year;
        item.bit_depth = depth;
        item.artist = artist.to_string();
        let item_id = store.insert_item(item).unwrap();
        let mut collection = Collection::new("d", MediaType::Music);
        collection.items.push(item_id);
        let collection_id = store.insert_collection(collection).unwrap();
        store.attach_collection(title, collection_id).unwrap();
        store.finalize_collection(title, collection_id).unwrap();
    }
    store.finalize_title_set(title).unwrap();

    let aggregates = &store.title_set(title).unwrap().aggregates;
    assert_eq!(aggregates.year, 1985);
    assert_eq!(aggregates.bit_depth, 24);
    assert_eq!(aggregates.artist, "Same Artist");

    // Disagreeing artists collapse to the sentinel.
    let mut item = Item::new("t", MediaType::Music);
    item.artist = "Someone Else".to_string();
    let item_id = store.insert_item(item).unwrap();
    let mut collection = Collection::new("d4", MediaType::Music);
    collection.items.push(item_id);
    let collection_id = store.insert_collection(collection).unwrap();
    store.attach_collection(title, collection_id).unwrap();
    store.finalize_collection(title, collection_id).unwrap();
    store.finalize_title_set(title).unwrap();

    assert_eq!(
        store.title_set(title).unwrap().aggregates.artist,
        VARIOUS_ARTISTS
    );
}

#[test]
fn mixed_media_title_set_is_rejected() {
    let (mut store, ids) = build_catalog();
    let reel = store
        .insert_collection(Collection::new("Reel", MediaType::Video))
        .unwrap();
    let err = store.attach_collection(ids.title_kob, reel).unwrap_err();
    assert!(matches!(err, CatalogError::MediaTypeMismatch { .. }));
}

#[test]
fn reset_discards_the_snapshot() {
    let (mut store, ids) = build_catalog();
    assert!(!store.is_empty());
    store.reset();
    assert!(store.is_empty());
    assert!(store.title_set(ids.title_kob).is_none());
}

#[test]
fn unique_ids_resolve_after_reload() {
    let (mut store, ids) = build_catalog();
    store
        .title_set_mut(ids.title_kob)
        .unwrap()
        .core
        .unique_id = "src-kob".to_string();

    let mut snapshot = Vec::new();
    store.serialize(&mut snapshot).unwrap();
    let restored = CatalogStore::deserialize(snapshot.as_slice()).unwrap();

    let found = restored.find_title_set_by_unique_id("src-kob").unwrap();
    assert_eq!(found.core.name, "Kind of Blue");
}

#[test]
fn corrupted_snapshot_fails_without_poisoning_the_caller() {
    let (store, _) = build_catalog();
    let mut snapshot = Vec::new();
    store.serialize(&mut snapshot).unwrap();

    // Flip a bit in the category list's count complement: magic (4),
    // record marker (1), version (2), five u16 counters (10), sequence
    // counter (4), count (4) put the complement at offset 25.
    snapshot[25] ^= 0x01;

    let result = CatalogStore::deserialize(snapshot.as_slice());
    assert!(matches!(result, Err(CatalogError::Corrupt(_))));
    // The original store is untouched by the failed attempt.
    assert_eq!(store.title_set_count(), 2);
}

#[test]
fn artist_map_indexes_finalized_titles() {
    let (store, _) = build_catalog();
    let map = ArtistMap::build(&store);
    assert_eq!(map.titles_by("Miles Davis").len(), 1);
    assert_eq!(map.titles_by("Nirvana").len(), 1);
    assert_eq!(map.len(), 2);
}

#[test]
fn xml_dump_is_a_readable_mirror() {
    let (store, _) = build_catalog();
    let mut out = Vec::new();
    store.dump_xml(&mut out).unwrap();
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains("Kind of Blue"));
    assert!(xml.contains("Nevermind"));
    assert!(xml.contains("<category"));
    assert!(xml.contains("artist=\"Miles Davis\""));
}
