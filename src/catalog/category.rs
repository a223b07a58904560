use super::{CategoryId, EntityCore, MediaType};
use serde::{Deserialize, Serialize};

/// A browsing category (genre, folder, changer slot group).
///
/// The category name doubles as its uniqueness key: the store rejects a
/// second category with the same name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub core: EntityCore,
}

impl Category {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        Category {
            id: CategoryId::UNASSIGNED,
            core: EntityCore::named(name, media_type),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }
}
