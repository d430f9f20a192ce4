//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p world_server -- [--addr 127.0.0.1:9095] [--tick-hz 1]
//!       [--grid-size 100] [--window-size 40] [--seed-players 30]
//!       [--config world.json]
//!
//! `--config` is read first; the other flags override it.

use std::env;

use anyhow::Context;
use world_server::server::GameServer;
use world_shared::config::WorldConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<WorldConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            WorldConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => WorldConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("--tick-hz")?;
                i += 2;
            }
            "--grid-size" if i + 1 < args.len() => {
                cfg.grid_size = args[i + 1].parse().context("--grid-size")?;
                i += 2;
            }
            "--window-size" if i + 1 < args.len() => {
                cfg.window_size = args[i + 1].parse().context("--window-size")?;
                i += 2;
            }
            "--seed-players" if i + 1 < args.len() => {
                cfg.seed_players = args[i + 1].parse().context("--seed-players")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        grid_size = cfg.grid_size,
        window_size = cfg.window_size,
        seed_players = cfg.seed_players,
        "Starting server"
    );

    let server = GameServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    server.serve().await
}
