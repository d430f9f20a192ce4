//! `world_server`
//!
//! Server-side systems:
//! - Fixed-period simulation loop
//! - Player spawning and action buffering
//! - Receives `Action`s from client sessions
//! - Sends windowed `PlayerView`s
//!
//! Networking model:
//! - TCP, one framed connection per client
//! - One read task and one write task per connection

pub mod engine;
pub mod server;
pub mod session;

pub use engine::{Engine, TickReport};
pub use server::GameServer;
