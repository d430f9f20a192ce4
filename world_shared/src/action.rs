//! Per-tick player intents.

use serde::{Deserialize, Serialize};

use crate::coords::{Coordinates, Direction};

/// One tick's worth of intent for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub movement: Direction,
    /// Requested cells to move; `None` means the entity's own speed.
    #[serde(default)]
    pub distance: Option<i32>,
    #[serde(default)]
    pub jump: bool,
}

impl Action {
    pub fn moving(movement: Direction) -> Self {
        Self {
            movement,
            ..Self::default()
        }
    }

    pub fn with_distance(mut self, distance: i32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_jump(mut self) -> Self {
        self.jump = true;
        self
    }

    /// Cells requested for an entity moving at `speed`.
    pub fn requested_distance(&self, speed: i32) -> i32 {
        self.distance.unwrap_or(speed)
    }

    /// Target cell for an entity at `from` moving at `speed`.
    pub fn target(&self, from: Coordinates, speed: i32) -> Coordinates {
        from.step(self.movement, self.requested_distance(speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        let a = Action::default();
        assert_eq!(a.movement, Direction::None);
        assert!(!a.jump);
        assert_eq!(a.target(Coordinates::new(3, 3), 5), Coordinates::new(3, 3));
    }

    #[test]
    fn target_uses_speed_unless_distance_given() {
        let from = Coordinates::new(50, 50);
        assert_eq!(
            Action::moving(Direction::Up).target(from, 5),
            Coordinates::new(50, 45)
        );
        assert_eq!(
            Action::moving(Direction::Right).with_distance(2).target(from, 5),
            Coordinates::new(52, 50)
        );
    }

    #[test]
    fn missing_fields_default() {
        let a: Action = serde_json::from_str(r#"{"jump":true}"#).unwrap();
        assert_eq!(a, Action::default().with_jump());
    }
}
