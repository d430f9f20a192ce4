//! Player attributes and vertical movement.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};

/// Altitude of an entity standing on the ground.
pub const GROUND_ALTITUDE: i32 = 1;

/// Mutable per-player state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub health: u32,
    pub alignment: i32,
    #[serde(rename = "speed")]
    base_speed: i32,
    height: i32,
    jump_height: i32,
    altitude: i32,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            health: 100,
            alignment: 0,
            base_speed: 5,
            height: 5,
            jump_height: 5,
            altitude: GROUND_ALTITUDE,
        }
    }
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells per tick.
    pub fn speed(&self) -> i32 {
        self.base_speed
    }

    pub fn jump_height(&self) -> i32 {
        self.jump_height
    }

    pub fn altitude(&self) -> i32 {
        self.altitude
    }

    pub fn is_grounded(&self) -> bool {
        self.altitude == GROUND_ALTITUDE
    }

    /// Leaves the ground. No-op while airborne.
    pub fn jump(&mut self) {
        if self.is_grounded() {
            self.altitude = GROUND_ALTITUDE + self.jump_height;
        }
    }

    /// Descends by `speed`, stopping at ground level.
    pub fn fall(&mut self, speed: i32) {
        self.altitude = (self.altitude - speed).max(GROUND_ALTITUDE);
    }
}

impl Entity for Player {
    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }

    fn height(&self) -> i32 {
        self.height
    }
}
