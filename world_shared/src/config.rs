//! Configuration system.
//!
//! Loads world configuration from JSON strings (file IO left to app).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Server listen address, e.g. `127.0.0.1:9095`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Simulation ticks per second.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Side length of the square world grid.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
    /// Side length of the view window sent to each client.
    #[serde(default = "default_window_size")]
    pub window_size: i32,
    /// A move may cover at most `speed * speed_tolerance` cells per tick.
    #[serde(default = "default_speed_tolerance")]
    pub speed_tolerance: i32,
    /// Unattended players spawned at startup.
    #[serde(default)]
    pub seed_players: usize,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

fn default_server_addr() -> String {
    "127.0.0.1:9095".to_string()
}

fn default_tick_hz() -> u32 {
    1
}

fn default_grid_size() -> usize {
    100
}

fn default_window_size() -> i32 {
    40
}

fn default_speed_tolerance() -> i32 {
    4
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            tick_hz: default_tick_hz(),
            grid_size: default_grid_size(),
            window_size: default_window_size(),
            speed_tolerance: default_speed_tolerance(),
            seed_players: 0,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.grid_size >= 1, "grid_size must be at least 1");
        anyhow::ensure!(self.window_size >= 1, "window_size must be at least 1");
        anyhow::ensure!(self.tick_hz >= 1, "tick_hz must be at least 1");
        anyhow::ensure!(self.speed_tolerance >= 1, "speed_tolerance must be at least 1");
        anyhow::ensure!(
            self.heartbeat.ping_period() < self.heartbeat.pong_wait(),
            "ping period must be shorter than pong wait"
        );
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }
}

/// Connection keepalive and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Time allowed for a single write to the peer.
    pub write_wait_ms: u64,
    /// Time allowed between inbound frames before the peer is considered gone.
    pub pong_wait_ms: u64,
    /// Largest inbound frame payload accepted.
    pub max_message_size: usize,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            max_message_size: 512,
        }
    }
}

impl HeartbeatConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Pings go out at nine tenths of the pong wait.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }
}
