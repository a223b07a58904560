//! Secondary artist index, built on demand from a loaded store.

use super::CatalogStore;
use crate::catalog::TitleId;
use std::collections::BTreeMap;

/// Artist display name → title sets by that artist, in sequence order.
///
/// Never persisted; rebuild whenever the underlying store changes. Title
/// artists are aggregates, so run the finalize pass before building.
#[derive(Debug, Default)]
pub struct ArtistMap {
    entries: BTreeMap<String, Vec<TitleId>>,
}

impl ArtistMap {
    pub fn build(store: &CatalogStore) -> Self {
        let mut entries: BTreeMap<String, Vec<TitleId>> = BTreeMap::new();
        for title in store.title_sets_by_sequence() {
            let artist = &title.aggregates.artist;
            if artist.is_empty() {
                continue;
            }
            entries.entry(artist.clone()).or_default().push(title.id);
        }
        ArtistMap { entries }
    }

    pub fn titles_by(&self, artist: &str) -> &[TitleId] {
        self.entries
            .get(artist)
            .map(|titles| titles.as_slice())
            .unwrap_or(&[])
    }

    pub fn artists(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
