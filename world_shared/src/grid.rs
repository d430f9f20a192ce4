//! World grid: tiles plus the entity position index.
//!
//! Tiles and the registry live behind one `RwLock` so the two views of
//! "where is X" and "what is on this cell" are only ever changed together.
//! Callers never get mutable access to either; every mutation goes through a
//! write-locked method here.
//!
//! Movement is simulated one cell at a time towards the target, X axis first,
//! stopping on the last cell that did not collide. A blocked move therefore
//! slides up to the obstacle instead of failing outright.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    coords::{Coordinates, Direction},
    entity::{Entity, EntityId, Occupant},
    tile::{Tile, TileMarkers},
};

/// Grid operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    OutOfBounds { pos: Coordinates, size: i32 },
    Occupied { pos: Coordinates },
    UnknownEntity(EntityId),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::OutOfBounds { pos, size } => {
                write!(f, "position {pos} is out of bounds for grid of size {size}")
            }
            GridError::Occupied { pos } => write!(f, "tile at {pos} is already occupied"),
            GridError::UnknownEntity(id) => write!(f, "unknown entity {id}"),
        }
    }
}

impl std::error::Error for GridError {}

/// Window of the grid around one entity, copied out under the read lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Absolute coordinates of the window's top-left cell.
    pub origin: Coordinates,
    pub width: i32,
    pub height: i32,
    /// Row-major, `width * height` tiles.
    pub tiles: Vec<Tile>,
    /// Entities in the window, relative to `origin`.
    pub entities: BTreeMap<EntityId, Coordinates>,
}

impl WorldSnapshot {
    /// Tile at window-relative coordinates.
    pub fn tile(&self, rel: Coordinates) -> Option<&Tile> {
        if rel.x < 0 || rel.y < 0 || rel.x >= self.width || rel.y >= self.height {
            return None;
        }
        self.tiles.get((rel.y * self.width + rel.x) as usize)
    }

    /// Absolute position of an entity in the window.
    pub fn absolute_position(&self, id: EntityId) -> Option<Coordinates> {
        self.entities
            .get(&id)
            .map(|rel| Coordinates::new(rel.x + self.origin.x, rel.y + self.origin.y))
    }
}

struct GridState {
    size: i32,
    tiles: Vec<Tile>,
    entities: HashMap<EntityId, Coordinates>,
}

impl GridState {
    fn index(&self, pos: Coordinates) -> Result<usize, GridError> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.size || pos.y >= self.size {
            return Err(GridError::OutOfBounds {
                pos,
                size: self.size,
            });
        }
        Ok((pos.y * self.size + pos.x) as usize)
    }

    fn tile(&self, pos: Coordinates) -> Result<&Tile, GridError> {
        let idx = self.index(pos)?;
        Ok(&self.tiles[idx])
    }

    fn tile_mut(&mut self, pos: Coordinates) -> Result<&mut Tile, GridError> {
        let idx = self.index(pos)?;
        Ok(&mut self.tiles[idx])
    }

    /// Walks from `source` towards `target` and returns the furthest cell the
    /// mover can rest on.
    ///
    /// Cells the mover clears but that hold an occupant can be passed over,
    /// never landed on.
    fn collide_path(&self, source: Coordinates, target: Coordinates, altitude: i32) -> Coordinates {
        let mut result = source;
        let mut check = source;

        for _ in 0..self.size * 2 {
            let (dx, dy) = if target.x > check.x {
                (1, 0)
            } else if target.x < check.x {
                (-1, 0)
            } else if target.y > check.y {
                (0, 1)
            } else if target.y < check.y {
                (0, -1)
            } else {
                return result;
            };
            check = Coordinates::new(check.x + dx, check.y + dy);

            let Ok(tile) = self.tile(check) else {
                return result;
            };
            if tile.will_collide(altitude) {
                return result;
            }
            if !tile.is_occupied() {
                result = check;
            }
        }

        panic!(
            "movement from {source} to {target} exceeded {} steps on a grid of size {}",
            self.size * 2,
            self.size
        );
    }
}

/// The shared world grid.
pub struct WorldGrid {
    inner: RwLock<GridState>,
}

impl WorldGrid {
    /// Creates an empty `size x size` grid.
    pub fn new(size: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(size >= 1, "grid must be at least 1x1");
        let side = i32::try_from(size).map_err(|_| anyhow::anyhow!("grid size {size} too large"))?;
        let cells = size
            .checked_mul(size)
            .ok_or_else(|| anyhow::anyhow!("grid size {size} too large"))?;

        Ok(Self {
            inner: RwLock::new(GridState {
                size: side,
                tiles: vec![Tile::default(); cells],
                entities: HashMap::new(),
            }),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, GridState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GridState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> i32 {
        self.read().size
    }

    pub fn in_bounds(&self, pos: Coordinates) -> bool {
        self.read().index(pos).is_ok()
    }

    /// Copy of the tile at `pos`.
    pub fn get_tile(&self, pos: Coordinates) -> Result<Tile, GridError> {
        self.read().tile(pos).copied()
    }

    /// Sets the static obstruction height and markers of a tile.
    pub fn set_terrain(
        &self,
        pos: Coordinates,
        height: i32,
        markers: TileMarkers,
    ) -> Result<(), GridError> {
        let mut state = self.write();
        let tile = state.tile_mut(pos)?;
        tile.set_base_height(height);
        tile.set_markers(markers);
        Ok(())
    }

    /// Puts a new entity on `pos` and returns its fresh id.
    ///
    /// Nothing is mutated on failure.
    pub fn place_entity<E: Entity + ?Sized>(
        &self,
        entity: &E,
        pos: Coordinates,
    ) -> Result<EntityId, GridError> {
        let mut state = self.write();
        let id = EntityId::new_unique();
        state
            .tile_mut(pos)?
            .set_occupant(Occupant::of(id, entity))
            .map_err(|_| GridError::Occupied { pos })?;
        state.entities.insert(id, pos);
        Ok(id)
    }

    pub fn entity_position(&self, id: EntityId) -> Option<Coordinates> {
        self.read().entities.get(&id).copied()
    }

    pub fn entity_count(&self) -> usize {
        self.read().entities.len()
    }

    /// Moves an entity as far towards `target` as collisions allow and
    /// returns where it ended up.
    ///
    /// # Panics
    /// If the step loop exceeds `2 * size` iterations or the tile under the
    /// entity does not hold it. Both mean the grid is corrupt.
    pub fn resolve_move(
        &self,
        id: EntityId,
        target: Coordinates,
        altitude: i32,
    ) -> Result<Coordinates, GridError> {
        let mut state = self.write();
        let source = *state
            .entities
            .get(&id)
            .ok_or(GridError::UnknownEntity(id))?;

        let result = state.collide_path(source, target, altitude);
        if result != target {
            trace!(entity = %id, %source, %target, %result, "Move cut short");
        }
        if result == source {
            return Ok(source);
        }

        let occupant = match state.tile_mut(source).map(Tile::take_occupant) {
            Ok(Some(o)) if o.id == id => o,
            other => panic!("registry places {id} at {source} but tile holds {other:?}"),
        };
        if let Err(e) = state.tile_mut(result).and_then(|t| {
            t.set_occupant(occupant)
                .map_err(|_| GridError::Occupied { pos: result })
        }) {
            panic!("resolved move of {id} onto {result} failed: {e}");
        }
        state.entities.insert(id, result);
        Ok(result)
    }

    /// Moves an entity `distance` cells in `direction`.
    pub fn move_entity(
        &self,
        id: EntityId,
        direction: Direction,
        distance: i32,
        altitude: i32,
    ) -> Result<Coordinates, GridError> {
        let source = self
            .entity_position(id)
            .ok_or(GridError::UnknownEntity(id))?;
        self.resolve_move(id, source.step(direction, distance), altitude)
    }

    /// Copies the window of at most `window x window` cells around `id`,
    /// clamped to the grid edges.
    pub fn windowed_snapshot(&self, id: EntityId, window: i32) -> Result<WorldSnapshot, GridError> {
        let state = self.read();
        let pos = *state
            .entities
            .get(&id)
            .ok_or(GridError::UnknownEntity(id))?;

        let half = window.max(0) / 2;
        let min_x = (pos.x - half).clamp(0, state.size);
        let min_y = (pos.y - half).clamp(0, state.size);
        let max_x = (pos.x + half).clamp(0, state.size);
        let max_y = (pos.y + half).clamp(0, state.size);
        let origin = Coordinates::new(min_x, min_y);

        let width = max_x - min_x;
        let height = max_y - min_y;
        let mut tiles = Vec::with_capacity((width * height) as usize);
        let mut entities = BTreeMap::new();

        for y in min_y..max_y {
            let row_start = (y * state.size + min_x) as usize;
            let row = &state.tiles[row_start..row_start + width as usize];
            for (dx, tile) in row.iter().enumerate() {
                if let Some(o) = tile.occupant() {
                    entities.insert(o.id, Coordinates::new(dx as i32, y - min_y));
                }
            }
            tiles.extend_from_slice(row);
        }

        entities.insert(id, pos.relative_to(origin));

        Ok(WorldSnapshot {
            origin,
            width,
            height,
            tiles,
            entities,
        })
    }
}
