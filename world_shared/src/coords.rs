//! Grid coordinates and movement directions.
//!
//! The grid uses screen orientation: row 0 is the top edge, so `Up`
//! decreases `y` and `Down` increases it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 2D cell coordinate.
///
/// Signed so that requested targets past the grid edge stay representable;
/// the grid decides what is in bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the cell `distance` cells away in `direction`, saturating at
    /// the `i32` range.
    pub fn step(self, direction: Direction, distance: i32) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(
            self.x.saturating_add(dx.saturating_mul(distance)),
            self.y.saturating_add(dy.saturating_mul(distance)),
        )
    }

    /// Coordinates relative to `origin`.
    pub fn relative_to(self, origin: Self) -> Self {
        Self::new(self.x - origin.x, self.y - origin.y)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Manhattan distance between two cells, saturating at `i32::MAX`.
pub fn distance(a: Coordinates, b: Coordinates) -> i32 {
    let dx = (i64::from(a.x) - i64::from(b.x)).abs();
    let dy = (i64::from(a.y) - i64::from(b.y)).abs();
    i32::try_from(dx + dy).unwrap_or(i32::MAX)
}

/// Movement intent direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    Left,
    Down,
    #[default]
    None,
}

impl Direction {
    /// Unit displacement for one cell of movement.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Left => (-1, 0),
            Direction::Down => (0, 1),
            Direction::None => (0, 0),
        }
    }
}
