//! Wire messages and their JSON encoding.
//!
//! Client -> server frames carry a bare [`Action`]. Server -> client frames
//! carry a [`ServerMsg`]. Encoding is explicit so it can be versioned.

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{action::Action, entity::EntityId, grid::WorldSnapshot, player::Player};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Everything a client sees about itself and its surroundings for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub tick: u64,
    pub player_id: EntityId,
    pub player: Player,
    pub snapshot: WorldSnapshot,
    pub sent_at: DateTime<Utc>,
}

/// Server -> client message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// First message on every connection.
    #[serde(rename_all = "camelCase")]
    Welcome {
        protocol: u32,
        player_id: EntityId,
        grid_size: i32,
        window_size: i32,
    },
    View(PlayerView),
}

pub fn decode_action(b: &[u8]) -> anyhow::Result<Action> {
    serde_json::from_slice(b).context("deserialize action")
}

pub fn encode_action(action: &Action) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(action).context("serialize action")?;
    Ok(Bytes::from(payload))
}

pub fn encode_server_msg(msg: &ServerMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize server msg")?;
    Ok(Bytes::from(payload))
}

pub fn decode_server_msg(b: &[u8]) -> anyhow::Result<ServerMsg> {
    serde_json::from_slice(b).context("deserialize server msg")
}
