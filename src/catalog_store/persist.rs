//! Versioned binary snapshot encoding for [`CatalogStore`].
//!
//! Field groups added over the life of the format are gated on the record
//! version at read time so that every previously written snapshot stays
//! loadable. When adding a field: bump the record's version constant,
//! append the field after all existing ones, and read it behind
//! `if version >= N`, defaulting otherwise. Never reorder or remove
//! existing fields.

use super::CatalogStore;
use crate::catalog::{
    ArtKind, ArtVariant, Category, CategoryId, Collection, CollectionId, EntityCore, Image,
    ImageId, Item, ItemId, LocationKind, MediaType, TitleId, TitleSet,
};
use crate::error::{CatalogError, Result};
use crate::persistence::{FrameReader, FrameWriter};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::info;

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"MTEC";

// Format history:
//   store v1       initial layout
//   store v2       added explicit title sequence counter
//   item v1        initial layout
//   item v2        added location
//   collection v1  initial layout
//   collection v2  added aspect_ratio, format_tag
//   collection v3  added is_playlist
//   title v1       initial layout
//   title v2       added sort_title
const STORE_VERSION: u16 = 2;
const CATEGORY_VERSION: u16 = 1;
const IMAGE_VERSION: u16 = 1;
const VARIANT_VERSION: u16 = 1;
const ITEM_VERSION: u16 = 2;
const COLLECTION_VERSION: u16 = 3;
const TITLE_VERSION: u16 = 2;

fn write_core<W: Write>(w: &mut FrameWriter<W>, core: &EntityCore) -> Result<()> {
    w.write_str(&core.unique_id)?;
    w.write_str(&core.name)?;
    w.write_u8(core.media_type.as_u8())?;
    w.write_u16(core.image.map(|id| id.raw()).unwrap_or(0))?;
    w.write_i64(core.changed_at)?;
    Ok(())
}

fn read_core<R: Read>(r: &mut FrameReader<R>) -> Result<EntityCore> {
    let unique_id = r.read_str()?;
    let name = r.read_str()?;
    let media_raw = r.read_u8()?;
    let media_type = MediaType::from_u8(media_raw)
        .ok_or_else(|| CatalogError::Corrupt(format!("unknown media type {}", media_raw)))?;
    let image_raw = r.read_u16()?;
    let changed_at = r.read_i64()?;
    Ok(EntityCore {
        unique_id,
        name,
        media_type,
        image: if image_raw == 0 {
            None
        } else {
            Some(ImageId(image_raw))
        },
        changed_at,
        alt_id: 0,
        load_order: 0,
    })
}

fn write_category<W: Write>(w: &mut FrameWriter<W>, category: &Category) -> Result<()> {
    w.begin_record(CATEGORY_VERSION)?;
    w.write_u16(category.id.raw())?;
    write_core(w, &category.core)?;
    w.end_record()
}

fn read_category<R: Read>(r: &mut FrameReader<R>) -> Result<Category> {
    let _version = r.begin_record(CATEGORY_VERSION)?;
    let id = CategoryId(r.read_u16()?);
    let core = read_core(r)?;
    r.end_record()?;
    Ok(Category { id, core })
}

fn write_variant<W: Write>(w: &mut FrameWriter<W>, variant: &ArtVariant) -> Result<()> {
    w.begin_record(VARIANT_VERSION)?;
    w.write_str(
        variant
            .path
            .as_ref()
            .map(|p| p.to_string_lossy())
            .as_deref()
            .unwrap_or(""),
    )?;
    w.write_str(variant.persistent_id.as_deref().unwrap_or(""))?;
    w.end_record()
}

fn read_variant<R: Read>(r: &mut FrameReader<R>) -> Result<ArtVariant> {
    let _version = r.begin_record(VARIANT_VERSION)?;
    let path = r.read_str()?;
    let persistent_id = r.read_str()?;
    r.end_record()?;
    Ok(ArtVariant {
        path: if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        },
        persistent_id: if persistent_id.is_empty() {
            None
        } else {
            Some(persistent_id)
        },
        cached: None,
    })
}

fn write_image<W: Write>(w: &mut FrameWriter<W>, image: &Image) -> Result<()> {
    w.begin_record(IMAGE_VERSION)?;
    w.write_u16(image.id.raw())?;
    write_core(w, &image.core)?;

    // Variant list is kind-tagged: only populated variants are written.
    let kinds = [ArtKind::Large, ArtKind::Thumb, ArtKind::Poster];
    let present: Vec<ArtKind> = kinds
        .into_iter()
        .filter(|kind| {
            let v = image.variant(*kind);
            v.path.is_some() || v.persistent_id.is_some()
        })
        .collect();
    w.begin_list(present.len() as u32)?;
    for kind in present {
        w.element()?;
        w.write_u8(kind.as_u8())?;
        write_variant(w, image.variant(kind))?;
    }
    w.end_record()
}

fn read_image<R: Read>(r: &mut FrameReader<R>) -> Result<Image> {
    let _version = r.begin_record(IMAGE_VERSION)?;
    let id = ImageId(r.read_u16()?);
    let core = read_core(r)?;
    let mut image = Image {
        id,
        core,
        large: ArtVariant::default(),
        thumb: ArtVariant::default(),
        poster: ArtVariant::default(),
    };
    let count = r.begin_list()?;
    for _ in 0..count {
        r.element()?;
        let kind_raw = r.read_u8()?;
        let kind = ArtKind::from_u8(kind_raw)
            .ok_or_else(|| CatalogError::Corrupt(format!("unknown art kind {}", kind_raw)))?;
        *image.variant_mut(kind) = read_variant(r)?;
    }
    r.end_record()?;
    Ok(image)
}

fn write_item<W: Write>(w: &mut FrameWriter<W>, item: &Item) -> Result<()> {
    w.begin_record(ITEM_VERSION)?;
    w.write_u16(item.id.raw())?;
    write_core(w, &item.core)?;
    w.write_u8(item.channels)?;
    w.write_u32(item.sample_rate)?;
    w.write_u8(item.bit_depth)?;
    w.write_u32(item.bit_rate)?;
    w.write_u32(item.duration_secs)?;
    w.write_str(&item.artist)?;
    // v2
    w.write_str(&item.location)?;
    w.end_record()
}

fn read_item<R: Read>(r: &mut FrameReader<R>) -> Result<Item> {
    let version = r.begin_record(ITEM_VERSION)?;
    let id = ItemId(r.read_u16()?);
    let core = read_core(r)?;
    let channels = r.read_u8()?;
    let sample_rate = r.read_u32()?;
    let bit_depth = r.read_u8()?;
    let bit_rate = r.read_u32()?;
    let duration_secs = r.read_u32()?;
    let artist = r.read_str()?;
    let location = if version >= 2 {
        r.read_str()?
    } else {
        String::new()
    };
    r.end_record()?;
    Ok(Item {
        id,
        core,
        channels,
        sample_rate,
        bit_depth,
        bit_rate,
        duration_secs,
        rating: 0,
        year: 0,
        artist,
        location,
        load_categories: Vec::new(),
    })
}

fn write_id_list<W: Write>(w: &mut FrameWriter<W>, ids: &[u16]) -> Result<()> {
    w.begin_list(ids.len() as u32)?;
    for id in ids {
        w.element()?;
        w.write_u16(*id)?;
    }
    Ok(())
}

fn read_id_list<R: Read>(r: &mut FrameReader<R>) -> Result<Vec<u16>> {
    let count = r.begin_list()?;
    let mut ids = Vec::with_capacity(count.min(u16::MAX as u32) as usize);
    for _ in 0..count {
        r.element()?;
        ids.push(r.read_u16()?);
    }
    Ok(ids)
}

fn write_collection<W: Write>(w: &mut FrameWriter<W>, collection: &Collection) -> Result<()> {
    w.begin_record(COLLECTION_VERSION)?;
    w.write_u16(collection.id.raw())?;
    write_core(w, &collection.core)?;
    write_id_list(w, &collection.items.iter().map(|i| i.raw()).collect::<Vec<_>>())?;
    write_id_list(
        w,
        &collection
            .categories
            .iter()
            .map(|c| c.raw())
            .collect::<Vec<_>>(),
    )?;
    w.write_str(&collection.artist)?;
    w.write_str(&collection.cast)?;
    w.write_str(&collection.label)?;
    w.write_u8(collection.rating)?;
    w.write_str(&collection.location)?;
    w.write_u8(collection.location_kind.as_u8())?;
    w.write_u16(collection.year)?;
    w.write_u32(collection.duration_secs)?;
    // v2
    w.write_str(&collection.aspect_ratio)?;
    w.write_str(&collection.format_tag)?;
    // v3
    w.write_bool(collection.is_playlist)?;
    w.end_record()
}

fn read_collection<R: Read>(r: &mut FrameReader<R>) -> Result<Collection> {
    let version = r.begin_record(COLLECTION_VERSION)?;
    let id = CollectionId(r.read_u16()?);
    let core = read_core(r)?;
    let items = read_id_list(r)?.into_iter().map(ItemId).collect();
    let categories = read_id_list(r)?.into_iter().map(CategoryId).collect();
    let artist = r.read_str()?;
    let cast = r.read_str()?;
    let label = r.read_str()?;
    let rating = r.read_u8()?;
    let location = r.read_str()?;
    let location_raw = r.read_u8()?;
    let location_kind = LocationKind::from_u8(location_raw)
        .ok_or_else(|| CatalogError::Corrupt(format!("unknown location kind {}", location_raw)))?;
    let year = r.read_u16()?;
    let duration_secs = r.read_u32()?;
    let (aspect_ratio, format_tag) = if version >= 2 {
        (r.read_str()?, r.read_str()?)
    } else {
        (String::new(), String::new())
    };
    let is_playlist = if version >= 3 { r.read_bool()? } else { false };
    r.end_record()?;
    Ok(Collection {
        id,
        core,
        items,
        categories,
        artist,
        cast,
        label,
        rating,
        aspect_ratio,
        format_tag,
        location,
        location_kind,
        is_playlist,
        year,
        duration_secs,
        channels: 0,
        sample_rate: 0,
        bit_depth: 0,
        bit_rate: 0,
    })
}

fn write_title_set<W: Write>(w: &mut FrameWriter<W>, title: &TitleSet) -> Result<()> {
    w.begin_record(TITLE_VERSION)?;
    w.write_u16(title.id.raw())?;
    write_core(w, &title.core)?;
    write_id_list(
        w,
        &title.collections.iter().map(|c| c.raw()).collect::<Vec<_>>(),
    )?;
    w.write_u32(title.sequence)?;
    w.write_i64(title.added_at)?;
    // v2
    w.write_str(&title.sort_title)?;
    w.end_record()
}

fn read_title_set<R: Read>(r: &mut FrameReader<R>) -> Result<TitleSet> {
    let version = r.begin_record(TITLE_VERSION)?;
    let id = TitleId(r.read_u16()?);
    let core = read_core(r)?;
    let collections = read_id_list(r)?.into_iter().map(CollectionId).collect();
    let sequence = r.read_u32()?;
    let added_at = r.read_i64()?;
    let sort_title = if version >= 2 {
        r.read_str()?
    } else {
        String::new()
    };
    r.end_record()?;
    Ok(TitleSet {
        id,
        core,
        collections,
        sort_title,
        sequence,
        added_at,
        aggregates: Default::default(),
    })
}

impl CatalogStore {
    /// Write the whole store as a versioned binary snapshot.
    pub fn serialize<W: Write>(&self, out: W) -> Result<()> {
        let mut w = FrameWriter::new(out);
        w.write_bytes(SNAPSHOT_MAGIC)?;
        w.begin_record(STORE_VERSION)?;

        w.write_u16(self.next_category_id)?;
        w.write_u16(self.next_image_id)?;
        w.write_u16(self.next_item_id)?;
        w.write_u16(self.next_collection_id)?;
        w.write_u16(self.next_title_id)?;
        // v2
        w.write_u32(self.next_sequence)?;

        w.begin_list(self.categories.len() as u32)?;
        for category in self.categories.values() {
            w.element()?;
            write_category(&mut w, category)?;
        }

        w.begin_list(self.images.len() as u32)?;
        for image in self.images.values() {
            w.element()?;
            write_image(&mut w, image)?;
        }

        w.begin_list(self.items.len() as u32)?;
        for item in self.items.values() {
            w.element()?;
            write_item(&mut w, item)?;
        }

        w.begin_list(self.collections.len() as u32)?;
        for collection in self.collections.values() {
            w.element()?;
            write_collection(&mut w, collection)?;
        }

        w.begin_list(self.title_sets.len() as u32)?;
        for title in self.title_sets.values() {
            w.element()?;
            write_title_set(&mut w, title)?;
        }

        w.end_record()
    }

    /// Decode a snapshot into a fresh store.
    ///
    /// A failed decode leaves nothing half-built: the caller keeps its
    /// previous store and the attempt simply errors. Aggregate fields are
    /// not part of the snapshot; run the finalize pass after loading.
    pub fn deserialize<R: Read>(input: R) -> Result<CatalogStore> {
        let mut r = FrameReader::new(input);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(CatalogError::Corrupt(
                "snapshot magic bytes do not match".to_string(),
            ));
        }

        let version = r.begin_record(STORE_VERSION)?;
        let mut store = CatalogStore::new();
        store.next_category_id = r.read_u16()?;
        store.next_image_id = r.read_u16()?;
        store.next_item_id = r.read_u16()?;
        store.next_collection_id = r.read_u16()?;
        store.next_title_id = r.read_u16()?;
        if version >= 2 {
            store.next_sequence = r.read_u32()?;
        }

        let count = r.begin_list()?;
        for _ in 0..count {
            r.element()?;
            let category = read_category(&mut r)?;
            if store
                .categories
                .values()
                .any(|existing| existing.core.name == category.core.name)
            {
                return Err(CatalogError::Corrupt(format!(
                    "duplicate category name {:?} in snapshot",
                    category.core.name
                )));
            }
            store.categories.insert(category.id.raw(), category);
        }

        let count = r.begin_list()?;
        for _ in 0..count {
            r.element()?;
            let image = read_image(&mut r)?;
            store.images.insert(image.id.raw(), image);
        }

        let count = r.begin_list()?;
        for _ in 0..count {
            r.element()?;
            let item = read_item(&mut r)?;
            store.items.insert(item.id.raw(), item);
        }

        let count = r.begin_list()?;
        for _ in 0..count {
            r.element()?;
            let collection = read_collection(&mut r)?;
            store.collections.insert(collection.id.raw(), collection);
        }

        let count = r.begin_list()?;
        for _ in 0..count {
            r.element()?;
            let title = read_title_set(&mut r)?;
            store.title_sets.insert(title.id.raw(), title);
        }

        r.end_record()?;

        if version < 2 {
            // Pre-v2 snapshots carried no sequence counter; resume after
            // the highest sequence seen so numbers keep increasing.
            store.next_sequence = store
                .title_sets
                .values()
                .map(|t| t.sequence)
                .max()
                .unwrap_or(0)
                + 1;
        }

        store.validate_integrity()?;

        info!(
            categories = store.categories.len(),
            images = store.images.len(),
            items = store.items.len(),
            collections = store.collections.len(),
            title_sets = store.title_sets.len(),
            "loaded catalog snapshot"
        );
        Ok(store)
    }
}
