//! `world_client`
//!
//! Client-side systems:
//! - Connection management (one framed TCP stream)
//! - Input parsing and action generation
//! - Latest-view tracking

pub mod client;
pub mod input;

pub use client::GameClient;
