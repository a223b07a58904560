use super::{EntityCore, ImageId, MediaType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Art variant kind. Large and thumbnail art is faulted in and cached in
/// memory on first access; poster art is reloaded on every request and
/// never cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtKind {
    Large,
    Thumb,
    Poster,
}

impl ArtKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtKind::Large => "large",
            ArtKind::Thumb => "thumb",
            ArtKind::Poster => "poster",
        }
    }

    /// Serialization discriminant for the variant list framing.
    pub fn as_u8(&self) -> u8 {
        match self {
            ArtKind::Large => 1,
            ArtKind::Thumb => 2,
            ArtKind::Poster => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ArtKind::Large),
            2 => Some(ArtKind::Thumb),
            3 => Some(ArtKind::Poster),
            _ => None,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        !matches!(self, ArtKind::Poster)
    }
}

/// One art variant: where its bytes live and the persistent content
/// identifier clients use to validate their own caches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArtVariant {
    pub path: Option<PathBuf>,
    /// Content identifier, stable across reloads of unchanged source art.
    /// Independent of the catalog's own unique ID.
    pub persistent_id: Option<String>,
    /// In-memory bytes, faulted in on first access. Never persisted, and
    /// never populated for the poster variant.
    #[serde(skip)]
    pub cached: Option<Arc<Vec<u8>>>,
}

/// Cover-art record with up to three variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub core: EntityCore,
    pub large: ArtVariant,
    pub thumb: ArtVariant,
    pub poster: ArtVariant,
}

impl Image {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        Image {
            id: ImageId::UNASSIGNED,
            core: EntityCore::named(name, media_type),
            large: ArtVariant::default(),
            thumb: ArtVariant::default(),
            poster: ArtVariant::default(),
        }
    }

    pub fn variant(&self, kind: ArtKind) -> &ArtVariant {
        match kind {
            ArtKind::Large => &self.large,
            ArtKind::Thumb => &self.thumb,
            ArtKind::Poster => &self.poster,
        }
    }

    pub fn variant_mut(&mut self, kind: ArtKind) -> &mut ArtVariant {
        match kind {
            ArtKind::Large => &mut self.large,
            ArtKind::Thumb => &mut self.thumb,
            ArtKind::Poster => &mut self.poster,
        }
    }

    pub fn set_large_path(&mut self, path: impl Into<PathBuf>) {
        self.large.path = Some(path.into());
    }

    pub fn set_large_persistent_id(&mut self, id: impl Into<String>) {
        self.large.persistent_id = Some(id.into());
    }

    pub fn set_thumb_path(&mut self, path: impl Into<PathBuf>) {
        self.thumb.path = Some(path.into());
    }

    pub fn set_thumb_persistent_id(&mut self, id: impl Into<String>) {
        self.thumb.persistent_id = Some(id.into());
    }

    pub fn set_poster_path(&mut self, path: impl Into<PathBuf>) {
        self.poster.path = Some(path.into());
    }

    pub fn set_poster_persistent_id(&mut self, id: impl Into<String>) {
        self.poster.persistent_id = Some(id.into());
    }

    pub fn path(&self, kind: ArtKind) -> Option<&Path> {
        self.variant(kind).path.as_deref()
    }

    /// Bytes held in memory for this variant. The poster variant always
    /// reports zero: it is loaded on demand and dropped.
    pub fn cached_size(&self, kind: ArtKind) -> usize {
        if !kind.is_cacheable() {
            return 0;
        }
        self.variant(kind)
            .cached
            .as_ref()
            .map(|bytes| bytes.len())
            .unwrap_or(0)
    }

    /// Drop all faulted-in art bytes.
    pub fn evict_cached(&mut self) {
        self.large.cached = None;
        self.thumb.cached = None;
    }
}
