use serde::{Deserialize, Serialize};

/// Media type of an entity. All collections inside one title set share one
/// media type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Music,
    Video,
    Picture,
}

impl MediaType {
    /// Wire tag used as the leading cookie token.
    pub fn tag(&self) -> &'static str {
        match self {
            MediaType::Music => "mus",
            MediaType::Video => "vid",
            MediaType::Picture => "pic",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "mus" => Some(MediaType::Music),
            "vid" => Some(MediaType::Video),
            "pic" => Some(MediaType::Picture),
            _ => None,
        }
    }

    /// Serialization discriminant.
    pub fn as_u8(&self) -> u8 {
        match self {
            MediaType::Music => 1,
            MediaType::Video => 2,
            MediaType::Picture => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MediaType::Music),
            2 => Some(MediaType::Video),
            3 => Some(MediaType::Picture),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaType::Music => "music",
            MediaType::Video => "video",
            MediaType::Picture => "picture",
        };
        write!(f, "{}", name)
    }
}

/// Bit-set of media types a serving engine supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMask(u8);

impl MediaMask {
    pub const EMPTY: MediaMask = MediaMask(0);

    pub fn all() -> Self {
        let mut mask = MediaMask::EMPTY;
        mask.insert(MediaType::Music);
        mask.insert(MediaType::Video);
        mask.insert(MediaType::Picture);
        mask
    }

    pub fn of(types: &[MediaType]) -> Self {
        let mut mask = MediaMask::EMPTY;
        for t in types {
            mask.insert(*t);
        }
        mask
    }

    pub fn insert(&mut self, media_type: MediaType) {
        self.0 |= 1 << media_type.as_u8();
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.0 & (1 << media_type.as_u8()) != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        MediaMask(bits)
    }
}
