//! A single grid cell.

use serde::{Deserialize, Serialize};

use crate::entity::Occupant;

bitflags::bitflags! {
    /// Non-entity occupancy markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TileMarkers: u8 {
        const NONE = 0;
        const HAZARD = 1 << 0;
    }
}

impl Default for TileMarkers {
    fn default() -> Self {
        Self::NONE
    }
}

/// One cell: static obstruction data plus at most one occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    height: i32,
    occupant: Option<Occupant>,
    markers: TileMarkers,
}

/// Returned when placing onto a tile that already has an occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOccupied(pub Occupant);

impl Tile {
    pub fn with_height(height: i32) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    /// Static obstruction height, ignoring any occupant.
    pub fn base_height(&self) -> i32 {
        self.height
    }

    pub fn set_base_height(&mut self, height: i32) {
        self.height = height;
    }

    /// Height used for collision: static height plus the occupant's.
    pub fn effective_height(&self) -> i32 {
        match self.occupant {
            Some(o) => self.height + o.height,
            None => self.height,
        }
    }

    /// True when a mover at `altitude` does not clear this tile.
    pub fn will_collide(&self, altitude: i32) -> bool {
        altitude <= self.effective_height()
    }

    pub fn occupant(&self) -> Option<&Occupant> {
        self.occupant.as_ref()
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn set_occupant(&mut self, occupant: Occupant) -> Result<(), TileOccupied> {
        match self.occupant {
            Some(current) => Err(TileOccupied(current)),
            None => {
                self.occupant = Some(occupant);
                Ok(())
            }
        }
    }

    pub fn take_occupant(&mut self) -> Option<Occupant> {
        self.occupant.take()
    }

    pub fn markers(&self) -> TileMarkers {
        self.markers
    }

    pub fn set_markers(&mut self, markers: TileMarkers) {
        self.markers = markers;
    }
}
