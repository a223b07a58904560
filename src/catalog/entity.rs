use super::MediaType;
use serde::{Deserialize, Serialize};

macro_rules! local_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u16);

        impl $name {
            /// Placeholder for entities not yet inserted into a store.
            pub const UNASSIGNED: $name = $name(0);

            pub fn raw(&self) -> u16 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

local_id!(
    /// Local ID of a category, unique within one snapshot's category table.
    CategoryId
);
local_id!(
    /// Local ID of an image record.
    ImageId
);
local_id!(
    /// Local ID of an item (track or picture).
    ItemId
);
local_id!(
    /// Local ID of a collection.
    CollectionId
);
local_id!(
    /// Local ID of a title set.
    TitleId
);

/// Fields shared by every catalog entity.
///
/// Local IDs live on the entity structs themselves (they are typed per
/// table); everything else common sits here. `alt_id` and `load_order` are
/// loader scratch space and are never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityCore {
    /// Durable identifier, expected to survive reloads of the same source.
    /// Store-generated when the source cannot supply one.
    pub unique_id: String,
    pub name: String,
    pub media_type: MediaType,
    /// Cover-art image reference, if any.
    pub image: Option<super::ImageId>,
    /// Unix seconds of the last change to this entity.
    pub changed_at: i64,
    /// Loader bookkeeping, not persisted.
    #[serde(skip)]
    pub alt_id: u32,
    /// Loader bookkeeping, not persisted.
    #[serde(skip)]
    pub load_order: u32,
}

impl EntityCore {
    pub fn named(name: impl Into<String>, media_type: MediaType) -> Self {
        EntityCore {
            unique_id: String::new(),
            name: name.into(),
            media_type,
            image: None,
            changed_at: 0,
            alt_id: 0,
            load_order: 0,
        }
    }

    pub fn touch(&mut self) {
        self.changed_at = chrono::Utc::now().timestamp();
    }
}
