//! Entity identity and the capability every tile occupant exposes.
//!
//! Entities form a closed set of kinds. Tiles never hold the full entity
//! state, only an [`Occupant`] record carrying what collision needs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque entity id, generated fresh for every placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new_unique() -> Self {
        EntityId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kinds of entity that can occupy a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Player,
}

/// Anything placeable on a tile.
pub trait Entity {
    fn kind(&self) -> EntityKind;

    /// Collision profile added on top of the tile's own height.
    fn height(&self) -> i32;
}

/// What a tile records about the entity standing on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: EntityId,
    pub kind: EntityKind,
    pub height: i32,
}

impl Occupant {
    pub fn of<E: Entity + ?Sized>(id: EntityId, entity: &E) -> Self {
        Self {
            id,
            kind: entity.kind(),
            height: entity.height(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = EntityId::new_unique();
        let b = EntityId::new_unique();
        assert_ne!(a, b);
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = EntityId::new_unique();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
