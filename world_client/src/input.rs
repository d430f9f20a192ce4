//! Input handling.
//!
//! Turns console words into per-tick `Action`s, and produces random-walk
//! actions for unattended clients.

use rand::Rng;
use world_shared::{action::Action, coords::Direction};

/// Parses a console command such as `w`, `left 3`, `jump` or `d j`.
///
/// Returns `None` for anything that is not a movement command.
pub fn parse_command(line: &str) -> Option<Action> {
    let mut action = Action::default();
    let mut any = false;

    for token in line.split_whitespace() {
        let token = token.to_ascii_lowercase();
        match token.as_str() {
            "w" | "up" => action.movement = Direction::Up,
            "s" | "down" => action.movement = Direction::Down,
            "a" | "left" => action.movement = Direction::Left,
            "d" | "right" => action.movement = Direction::Right,
            "j" | "jump" => action.jump = true,
            "." | "wait" => action.movement = Direction::None,
            n => action.distance = Some(n.parse().ok()?),
        }
        any = true;
    }

    any.then_some(action)
}

/// A random step in one of the four directions, occasionally jumping.
pub fn random_walk<R: Rng + ?Sized>(rng: &mut R) -> Action {
    let movement = match rng.gen_range(0..4) {
        0 => Direction::Up,
        1 => Direction::Right,
        2 => Direction::Left,
        _ => Direction::Down,
    };
    Action {
        movement,
        distance: None,
        jump: rng.gen_bool(0.05),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moves_and_jumps() {
        assert_eq!(parse_command("w"), Some(Action::moving(Direction::Up)));
        assert_eq!(
            parse_command("left 3"),
            Some(Action::moving(Direction::Left).with_distance(3))
        );
        assert_eq!(
            parse_command("D j"),
            Some(Action::moving(Direction::Right).with_jump())
        );
        assert_eq!(parse_command("jump"), Some(Action::default().with_jump()));
    }

    #[test]
    fn rejects_other_words() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("status"), None);
        assert_eq!(parse_command("w fast"), None);
    }

    #[test]
    fn random_walk_always_moves() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            assert_ne!(random_walk(&mut rng).movement, Direction::None);
        }
    }
}
