//! Client implementation.
//!
//! The client maintains:
//! - One framed TCP connection to the server
//! - The identity and window size announced in the server's welcome
//! - The most recent view received
//!
//! Keepalive pings from the server are answered transparently while waiting
//! for views.

use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tracing::{debug, info};
use world_shared::{
    action::Action,
    codec::{decode_server_msg, encode_action, PlayerView, ServerMsg, PROTOCOL_VERSION},
    coords::Coordinates,
    entity::EntityId,
    transport::{
        tcp::{self, TcpFrameReader, TcpFrameWriter},
        Frame, FrameReader, FrameWriter,
    },
};

/// Largest server frame the client accepts. Views grow with the window.
pub const MAX_SERVER_FRAME: usize = 4 * 1024 * 1024;

/// High-level game client.
pub struct GameClient {
    pub player_id: EntityId,
    pub grid_size: i32,
    pub window_size: i32,
    pub last_view: Option<PlayerView>,

    reader: TcpFrameReader,
    writer: TcpFrameWriter,
}

impl GameClient {
    /// Connects to a server and waits for the welcome.
    pub async fn connect(server_addr: &str) -> anyhow::Result<Self> {
        info!(server = %server_addr, "Connecting to server");

        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (mut reader, mut writer) = tcp::split(stream, MAX_SERVER_FRAME);

        let (player_id, grid_size, window_size) = loop {
            match next_msg(&mut reader, &mut writer).await? {
                ServerMsg::Welcome {
                    protocol,
                    player_id,
                    grid_size,
                    window_size,
                } => {
                    anyhow::ensure!(
                        protocol == PROTOCOL_VERSION,
                        "server speaks protocol {protocol}, expected {PROTOCOL_VERSION}"
                    );
                    break (player_id, grid_size, window_size);
                }
                other => debug!(?other, "Message before welcome"),
            }
        };

        info!(player_id = %player_id, grid_size, window_size, "Connected to server");
        Ok(Self {
            player_id,
            grid_size,
            window_size,
            last_view: None,
            reader,
            writer,
        })
    }

    /// Sends this tick's intent.
    pub async fn send_action(&mut self, action: Action) -> anyhow::Result<()> {
        self.writer.send(Frame::Data(encode_action(&action)?)).await
    }

    /// Waits up to `wait` for the next view.
    pub async fn recv_view(&mut self, wait: Duration) -> anyhow::Result<Option<PlayerView>> {
        let next = tokio::time::timeout(wait, async {
            loop {
                match next_msg(&mut self.reader, &mut self.writer).await? {
                    ServerMsg::View(view) => return anyhow::Ok(view),
                    other => debug!(?other, "Unexpected message"),
                }
            }
        })
        .await;

        match next {
            Ok(view) => {
                let view = view?;
                self.last_view = Some(view.clone());
                Ok(Some(view))
            }
            Err(_) => Ok(None),
        }
    }

    /// Own position according to the latest view.
    pub fn position(&self) -> Option<Coordinates> {
        self.last_view
            .as_ref()
            .and_then(|v| v.snapshot.absolute_position(self.player_id))
    }

    pub async fn close(&mut self) -> anyhow::Result<()> {
        let _ = self.writer.send(Frame::Close).await;
        self.writer.close().await
    }
}

/// Reads until a data frame arrives, answering pings on the way.
async fn next_msg(
    reader: &mut TcpFrameReader,
    writer: &mut TcpFrameWriter,
) -> anyhow::Result<ServerMsg> {
    loop {
        match reader.recv().await? {
            Some(Frame::Data(bytes)) => return decode_server_msg(&bytes),
            Some(Frame::Ping) => writer.send(Frame::Pong).await?,
            Some(Frame::Pong) => {}
            Some(Frame::Close) | None => anyhow::bail!("server closed the connection"),
        }
    }
}
