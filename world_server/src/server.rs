//! Server implementation.
//!
//! Accepts TCP connections and runs one session per connection next to the
//! engine's tick loop. It supports:
//! - Fixed-rate, authoritative tick loop
//! - Per-client windowed views with non-blocking fan-out
//! - Keepalive pings and read/write deadlines
//! - Pre-seeded unattended players
//!
//! A panic in the tick loop ends `serve` with an error; the world cannot be
//! trusted after a half-applied tick.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use world_shared::{config::WorldConfig, transport::tcp};

use crate::{
    engine::Engine,
    session::{self, SessionHandle},
};

/// Game server.
pub struct GameServer {
    pub cfg: WorldConfig,
    engine: Arc<Engine>,
    listener: TcpListener,
}

impl GameServer {
    /// Binds the listener and builds the world.
    pub async fn bind(cfg: WorldConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;

        let engine = Arc::new(Engine::new(cfg.clone())?);
        engine.seed_players(cfg.seed_players);

        Ok(Self {
            cfg,
            engine,
            listener,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Accepts exactly one client and starts its session.
    pub async fn accept_one(&self) -> anyhow::Result<SessionHandle> {
        let (stream, peer) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("set nodelay")?;

        let (reader, writer) = tcp::split(stream, self.cfg.heartbeat.max_message_size);
        let session = session::start(
            Arc::clone(&self.engine),
            reader,
            writer,
            self.cfg.heartbeat.clone(),
        );
        info!(%peer, player_id = %session.player_id, "Client attached");
        Ok(session)
    }

    /// Runs the tick loop and accepts clients until the tick loop dies.
    pub async fn serve(self) -> anyhow::Result<()> {
        let mut ticker = self.engine.spawn_tick_loop();
        info!(addr = %self.local_addr()?, "Serving");

        loop {
            tokio::select! {
                res = &mut ticker => {
                    return match res {
                        Ok(()) => Err(anyhow::anyhow!("tick loop exited")),
                        Err(e) => Err(anyhow::anyhow!("tick loop crashed: {e}")),
                    };
                }
                accepted = self.accept_one() => {
                    if let Err(e) = accepted {
                        warn!(error = %e, "Failed to accept client");
                    }
                }
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, WorldConfig)> {
    let mut cfg = WorldConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_hz,
        ..Default::default()
    };

    let server = GameServer::bind(cfg.clone()).await?;
    cfg.server_addr = server.local_addr()?.to_string();
    Ok((server, cfg))
}
