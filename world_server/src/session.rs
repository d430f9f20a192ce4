//! Client session: bridges one connection to the engine.
//!
//! Each session runs two tasks:
//! - the read pump decodes inbound frames into actions for the engine,
//! - the write pump forwards per-tick views and sends heartbeats.
//!
//! The write pump owns teardown. When it stops, for whatever reason, it
//! unregisters the subscription and closes the connection, exactly once.
//! Either pump stopping flips a shared shutdown signal that stops the other.
//!
//! The player entity stays in the world after disconnect.

use std::sync::Arc;

use anyhow::Context;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{timeout, Duration, Instant},
};
use tracing::{debug, info, warn};
use world_shared::{
    codec::{decode_action, encode_server_msg, PlayerView, ServerMsg, PROTOCOL_VERSION},
    config::HeartbeatConfig,
    entity::EntityId,
    transport::{Frame, FrameReader, FrameWriter},
};

use crate::engine::Engine;

/// Shutdown signal shared by a session's two pumps.
#[derive(Clone)]
struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    fn trigger(&self) {
        self.tx.send_replace(true);
    }

    async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A running session.
pub struct SessionHandle {
    pub player_id: EntityId,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SessionHandle {
    /// Waits for both pumps to finish.
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.writer.is_finished()
    }
}

/// Spawns a player for a new connection and starts its pumps.
///
/// Must be called from within a Tokio runtime.
pub fn start<R, W>(
    engine: Arc<Engine>,
    reader: R,
    writer: W,
    heartbeat: HeartbeatConfig,
) -> SessionHandle
where
    R: FrameReader + 'static,
    W: FrameWriter + 'static,
{
    let player_id = engine.add_player();
    let (tx, rx) = mpsc::channel(1);
    engine.register_client(player_id, tx);

    let shutdown = Shutdown::new();
    let reader = tokio::spawn(read_pump(
        Arc::clone(&engine),
        player_id,
        reader,
        heartbeat.pong_wait(),
        shutdown.clone(),
    ));
    let writer = tokio::spawn(write_pump(
        engine, player_id, writer, rx, heartbeat, shutdown,
    ));

    info!(player_id = %player_id, "Client connected and in game");
    SessionHandle {
        player_id,
        reader,
        writer,
    }
}

async fn read_pump<R: FrameReader>(
    engine: Arc<Engine>,
    player_id: EntityId,
    mut reader: R,
    pong_wait: Duration,
    mut shutdown: Shutdown,
) {
    loop {
        // Any inbound frame renews the deadline.
        let next = tokio::select! {
            _ = shutdown.wait() => break,
            next = timeout(pong_wait, reader.recv()) => next,
        };

        match next {
            Err(_) => {
                info!(player_id = %player_id, "No traffic within pong wait, dropping client");
                break;
            }
            Ok(Err(e)) => {
                warn!(player_id = %player_id, error = %e, "Read failed");
                break;
            }
            Ok(Ok(None | Some(Frame::Close))) => {
                debug!(player_id = %player_id, "Peer closed connection");
                break;
            }
            Ok(Ok(Some(Frame::Data(bytes)))) => match decode_action(&bytes) {
                Ok(action) => {
                    if let Err(e) = engine.set_action(player_id, action) {
                        warn!(player_id = %player_id, error = %e, "Action refused");
                    }
                }
                Err(e) => {
                    warn!(player_id = %player_id, error = %e, "Ignoring malformed action");
                }
            },
            Ok(Ok(Some(Frame::Ping | Frame::Pong))) => {}
        }
    }
    shutdown.trigger();
}

async fn write_pump<W: FrameWriter>(
    engine: Arc<Engine>,
    player_id: EntityId,
    mut writer: W,
    mut views: mpsc::Receiver<PlayerView>,
    heartbeat: HeartbeatConfig,
    mut shutdown: Shutdown,
) {
    let welcome = ServerMsg::Welcome {
        protocol: PROTOCOL_VERSION,
        player_id,
        grid_size: engine.grid().size(),
        window_size: engine.window_size(),
    };
    let result = pump_views(&mut writer, welcome, &mut views, &heartbeat, &mut shutdown).await;

    // Teardown: the only place a session unregisters or closes.
    engine.unregister_client(player_id);
    let _ = timeout(heartbeat.write_wait(), writer.send(Frame::Close)).await;
    if let Err(e) = writer.close().await {
        debug!(player_id = %player_id, error = %e, "Close failed");
    }
    shutdown.trigger();

    match result {
        Ok(()) => info!(player_id = %player_id, "Client disconnected"),
        Err(e) => info!(player_id = %player_id, error = %e, "Client disconnected"),
    }
}

async fn pump_views<W: FrameWriter>(
    writer: &mut W,
    welcome: ServerMsg,
    views: &mut mpsc::Receiver<PlayerView>,
    heartbeat: &HeartbeatConfig,
    shutdown: &mut Shutdown,
) -> anyhow::Result<()> {
    let write_wait = heartbeat.write_wait();
    send_frame(writer, Frame::Data(encode_server_msg(&welcome)?), write_wait).await?;

    let period = heartbeat.ping_period();
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            view = views.recv() => {
                // Closed: unregistered from elsewhere.
                let Some(view) = view else { return Ok(()) };
                let payload = encode_server_msg(&ServerMsg::View(view))?;
                send_frame(writer, Frame::Data(payload), write_wait).await?;
            }
            _ = ping.tick() => send_frame(writer, Frame::Ping, write_wait).await?,
            _ = shutdown.wait() => return Ok(()),
        }
    }
}

async fn send_frame<W: FrameWriter>(
    writer: &mut W,
    frame: Frame,
    write_wait: Duration,
) -> anyhow::Result<()> {
    timeout(write_wait, writer.send(frame))
        .await
        .context("write deadline exceeded")?
}
