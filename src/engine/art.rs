//! Cover-art serving: fault-in caching, downscaling, persistent IDs.

use super::QueryEngine;
use crate::catalog::{ArtKind, ImageId};
use crate::cookie::{self, CookieKind};
use crate::error::{CatalogError, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which entity's owning image a cover-art request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtLevel {
    Item,
    Collection,
    TitleSet,
}

/// Art bytes plus the content identifier clients key their caches on.
#[derive(Clone, Debug)]
pub struct ArtPayload {
    pub bytes: Arc<Vec<u8>>,
    pub persistent_id: Option<String>,
}

/// Deterministic content identifier for art data.
///
/// Two loads of unchanged source art produce the same identifier, letting
/// clients skip re-downloading art they already hold. The optional local ID
/// and change timestamp let a loader disambiguate identical bytes served
/// under different entities when it needs to.
pub fn compute_persistent_id(
    bytes: &[u8],
    local_id: Option<u16>,
    changed_at: Option<i64>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    if let Some(id) = local_id {
        hasher.update(id.to_le_bytes());
    }
    if let Some(ts) = changed_at {
        hasher.update(ts.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

impl QueryEngine {
    /// Fetch cover art for the entity a cookie names at `level`.
    ///
    /// Large and thumbnail art is cached in memory on first load, and
    /// payloads above the configured byte threshold are downscaled first;
    /// the scaled result is written back over the source file when possible
    /// so later faults skip the work. Poster art takes neither path: it is
    /// read fresh on every request and never cached.
    pub fn cover_art(&mut self, cookie_text: &str, level: ArtLevel, kind: ArtKind) -> Result<ArtPayload> {
        self.ensure_ready()?;
        let image_id = self.resolve_art_image(cookie_text, level)?;

        let (path, cached, persistent_id) = {
            let image = self.store.require_image(image_id)?;
            let variant = image.variant(kind);
            (
                variant.path.clone(),
                variant.cached.clone(),
                variant.persistent_id.clone(),
            )
        };

        if kind.is_cacheable() {
            if let Some(bytes) = cached {
                return Ok(ArtPayload {
                    bytes,
                    persistent_id,
                });
            }
        }

        let path = path.ok_or(CatalogError::NotFound {
            kind: "art variant",
            id: image_id.raw().into(),
        })?;
        let raw = std::fs::read(&path)?;

        let bytes = if kind.is_cacheable() && raw.len() > self.config().art_byte_threshold {
            match self.downscale(&raw) {
                Ok(scaled) => {
                    debug!(
                        path = %path.display(),
                        from = raw.len(),
                        to = scaled.len(),
                        "downscaled art payload"
                    );
                    if let Err(err) = std::fs::write(&path, &scaled) {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "could not write scaled art back; keeping in-memory copy only"
                        );
                    }
                    scaled
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "art payload could not be decoded for scaling; serving as-is"
                    );
                    raw
                }
            }
        } else {
            raw
        };

        let persistent_id = match persistent_id {
            Some(existing) => Some(existing),
            None => Some(compute_persistent_id(&bytes, None, None)),
        };

        let bytes = Arc::new(bytes);
        {
            let image = self
                .store
                .image_mut(image_id)
                .ok_or(CatalogError::NotFound {
                    kind: "image",
                    id: image_id.raw().into(),
                })?;
            let variant = image.variant_mut(kind);
            variant.persistent_id = persistent_id.clone();
            if kind.is_cacheable() {
                variant.cached = Some(Arc::clone(&bytes));
            }
        }

        Ok(ArtPayload {
            bytes,
            persistent_id,
        })
    }

    /// Bytes currently held in memory for an image variant. Poster always
    /// reports zero.
    pub fn cached_art_size(&self, image_id: ImageId, kind: ArtKind) -> Result<usize> {
        Ok(self.store.require_image(image_id)?.cached_size(kind))
    }

    fn downscale(&self, raw: &[u8]) -> std::result::Result<Vec<u8>, image::ImageError> {
        let edge = self.config().art_scaled_edge;
        let decoded = image::load_from_memory(raw)?;
        let resized = decoded.thumbnail(edge, edge);
        // JPEG output keeps scaled payloads compact; flatten any alpha
        // channel first since JPEG has none.
        let rgb = image::DynamicImage::ImageRgb8(resized.to_rgb8());
        let mut out = std::io::Cursor::new(Vec::new());
        rgb.write_to(&mut out, image::ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    }

    /// Resolve the owning image for a cookie at the requested level,
    /// walking leaf-to-root until an entity carries one.
    fn resolve_art_image(&self, cookie_text: &str, level: ArtLevel) -> Result<ImageId> {
        let kind = cookie::check_cookie(cookie_text)?;

        let mut chain: Vec<Option<ImageId>> = Vec::with_capacity(3);
        match level {
            ArtLevel::Item => {
                if kind != CookieKind::Item {
                    return Err(CatalogError::BadCookie(
                        "item-level art needs an item cookie".to_string(),
                    ));
                }
                let parsed = cookie::parse_item_cookie(cookie_text)?;
                self.ensure_supported(parsed.media_type)?;
                chain.push(self.store.require_item(parsed.item)?.core.image);
                if let Some(collection) = self.store.collection(parsed.collection) {
                    chain.push(collection.core.image);
                }
                if let Some(title) = self.store.title_set(parsed.title) {
                    chain.push(title.core.image);
                }
            }
            ArtLevel::Collection => {
                let (media_type, title, collection) = match kind {
                    CookieKind::Collection => {
                        let parsed = cookie::parse_collection_cookie(cookie_text)?;
                        (parsed.media_type, parsed.title, parsed.collection)
                    }
                    CookieKind::Item => {
                        let parsed = cookie::parse_item_cookie(cookie_text)?;
                        (parsed.media_type, parsed.title, parsed.collection)
                    }
                    _ => {
                        return Err(CatalogError::BadCookie(
                            "collection-level art needs a collection or item cookie".to_string(),
                        ))
                    }
                };
                self.ensure_supported(media_type)?;
                chain.push(self.store.require_collection(collection)?.core.image);
                if let Some(title_set) = self.store.title_set(title) {
                    chain.push(title_set.core.image);
                }
            }
            ArtLevel::TitleSet => {
                let (media_type, title) = match kind {
                    CookieKind::Title => {
                        let parsed = cookie::parse_title_cookie(cookie_text)?;
                        (parsed.media_type, parsed.title)
                    }
                    CookieKind::Collection => {
                        let parsed = cookie::parse_collection_cookie(cookie_text)?;
                        (parsed.media_type, parsed.title)
                    }
                    CookieKind::Item => {
                        let parsed = cookie::parse_item_cookie(cookie_text)?;
                        (parsed.media_type, parsed.title)
                    }
                    CookieKind::Category => {
                        return Err(CatalogError::BadCookie(
                            "title-level art needs a title, collection or item cookie".to_string(),
                        ))
                    }
                };
                self.ensure_supported(media_type)?;
                chain.push(self.store.require_title_set(title)?.core.image);
            }
        }

        chain
            .into_iter()
            .flatten()
            .next()
            .ok_or(CatalogError::NotFound {
                kind: "image",
                id: 0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Collection, Image, Item, MediaMask, MediaType, TitleSet};
    use crate::catalog_store::CatalogStore;
    use crate::config::EngineConfig;
    use crate::cookie::{format_item_cookie, format_title_cookie};
    use crate::engine::QueryEngine;
    use std::io::Write;

    /// Tiny valid 1x1 PNG.
    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
        0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8,
        0xCF, 0xC0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x67, 0xF0, 0xF7, 0xE7, 0x00, 0x00, 0x00,
        0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn engine_with_art(threshold: usize) -> (QueryEngine, String, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let art_path = dir.path().join("cover.png");
        let mut file = std::fs::File::create(&art_path).unwrap();
        file.write_all(PNG_1X1).unwrap();

        let mut store = CatalogStore::new();
        let mut image = Image::new("cover", MediaType::Music);
        image.set_large_path(&art_path);
        image.set_poster_path(&art_path);
        let image_id = store.insert_image(image).unwrap();

        let mut item = Item::new("track", MediaType::Music);
        item.core.image = Some(image_id);
        let item_id = store.insert_item(item).unwrap();

        let mut collection = Collection::new("disc", MediaType::Music);
        collection.items.push(item_id);
        let col_id = store.insert_collection(collection).unwrap();

        let title_id = store
            .insert_title_set(TitleSet::new("album", MediaType::Music))
            .unwrap();
        store.attach_collection(title_id, col_id).unwrap();

        let item_cookie = format_item_cookie(
            MediaType::Music,
            crate::catalog::CategoryId(0),
            title_id,
            col_id,
            item_id,
        );

        let mut engine = QueryEngine::new(
            store,
            MediaMask::all(),
            EngineConfig {
                art_byte_threshold: threshold,
                art_scaled_edge: 64,
            },
        );
        engine.set_ready(true);
        (engine, item_cookie, dir)
    }

    #[test]
    fn large_art_is_cached_on_first_access() {
        let (mut engine, item_cookie, _dir) = engine_with_art(usize::MAX);

        let first = engine
            .cover_art(&item_cookie, ArtLevel::Item, ArtKind::Large)
            .unwrap();
        assert_eq!(first.bytes.as_slice(), PNG_1X1);
        assert!(first.persistent_id.is_some());

        let image_id = engine.store().images().next().unwrap().id;
        assert_eq!(
            engine.cached_art_size(image_id, ArtKind::Large).unwrap(),
            PNG_1X1.len()
        );

        // Second fetch is served from the cache and shares the allocation.
        let second = engine
            .cover_art(&item_cookie, ArtLevel::Item, ArtKind::Large)
            .unwrap();
        assert!(Arc::ptr_eq(&first.bytes, &second.bytes));
    }

    #[test]
    fn poster_art_is_never_cached() {
        let (mut engine, item_cookie, _dir) = engine_with_art(usize::MAX);

        let first = engine
            .cover_art(&item_cookie, ArtLevel::Item, ArtKind::Poster)
            .unwrap();
        assert_eq!(first.bytes.as_slice(), PNG_1X1);

        let image_id = engine.store().images().next().unwrap().id;
        assert_eq!(
            engine.cached_art_size(image_id, ArtKind::Poster).unwrap(),
            0
        );

        let second = engine
            .cover_art(&item_cookie, ArtLevel::Item, ArtKind::Poster)
            .unwrap();
        assert!(!Arc::ptr_eq(&first.bytes, &second.bytes));
    }

    #[test]
    fn oversized_art_is_downscaled_and_written_back() {
        // Threshold of zero forces the scale path even for the tiny PNG.
        let (mut engine, item_cookie, dir) = engine_with_art(0);

        let payload = engine
            .cover_art(&item_cookie, ArtLevel::Item, ArtKind::Large)
            .unwrap();
        // Output is JPEG now.
        assert_eq!(&payload.bytes[..2], &[0xFF, 0xD8]);

        // And the source file was replaced with the scaled bytes.
        let on_disk = std::fs::read(dir.path().join("cover.png")).unwrap();
        assert_eq!(on_disk.as_slice(), payload.bytes.as_slice());
    }

    #[test]
    fn art_resolution_walks_up_to_the_title() {
        let (mut engine, item_cookie, _dir) = engine_with_art(usize::MAX);

        // Move the image from the item up to the title set.
        let image_id = engine.store().images().next().unwrap().id;
        let item_id = engine.store().items().next().unwrap().id;
        let title_id = engine.store().title_sets().next().unwrap().id;
        engine.store_mut().item_mut(item_id).unwrap().core.image = None;
        engine
            .store_mut()
            .title_set_mut(title_id)
            .unwrap()
            .core
            .image = Some(image_id);

        let payload = engine
            .cover_art(&item_cookie, ArtLevel::Item, ArtKind::Large)
            .unwrap();
        assert_eq!(payload.bytes.as_slice(), PNG_1X1);

        // A title-level request with a title cookie works too.
        let title_cookie =
            format_title_cookie(MediaType::Music, crate::catalog::CategoryId(0), title_id);
        engine
            .cover_art(&title_cookie, ArtLevel::TitleSet, ArtKind::Large)
            .unwrap();
    }

    #[test]
    fn persistent_id_is_deterministic() {
        let a = compute_persistent_id(b"same bytes", Some(3), Some(99));
        let b = compute_persistent_id(b"same bytes", Some(3), Some(99));
        assert_eq!(a, b);
        assert_ne!(a, compute_persistent_id(b"same bytes", Some(4), Some(99)));
        assert_ne!(a, compute_persistent_id(b"other bytes", Some(3), Some(99)));
    }
}
