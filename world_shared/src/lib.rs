//! `world_shared`
//!
//! Shared world model used by both client and server.
//!
//! Design goals:
//! - One lock-guarded grid owns every spatial mutation.
//! - Entities are a closed set behind a small capability trait.
//! - Wire encoding and transport are explicit and replaceable.
//! - No `unsafe`.

pub mod action;
pub mod codec;
pub mod config;
pub mod coords;
pub mod entity;
pub mod grid;
pub mod player;
pub mod tile;
pub mod transport;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::action::*;
    pub use crate::codec::*;
    pub use crate::config::*;
    pub use crate::coords::*;
    pub use crate::entity::*;
    pub use crate::grid::*;
    pub use crate::player::*;
    pub use crate::tile::*;
}
