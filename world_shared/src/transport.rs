//! Framed duplex transport.
//!
//! A connection is split into one [`FrameReader`] and one [`FrameWriter`] so
//! a session can read and write from separate tasks. Two implementations:
//! - [`tcp`]: length-prefixed frames over a `TcpStream`.
//! - [`memory`]: in-process pair over channels, for tests and local loops.

use async_trait::async_trait;
use bytes::Bytes;

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    Ping,
    Pong,
    Close,
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Frame::Data(_) => 0,
            Frame::Ping => 1,
            Frame::Pong => 2,
            Frame::Close => 3,
        }
    }
}

/// Receiving half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame, or `None` once the peer has closed the stream.
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// Sending half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()>;

    /// Closes the sending side. Safe to call more than once.
    async fn close(&mut self) -> anyhow::Result<()>;
}

pub mod tcp {
    //! Wire format: `[kind: u8][len: u32 BE][payload]`.

    use anyhow::Context;
    use async_trait::async_trait;
    use bytes::{Buf, BufMut, Bytes, BytesMut};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream,
        },
    };

    use super::{Frame, FrameReader, FrameWriter};

    const HEADER_LEN: usize = 5;

    /// Splits a stream into framed halves. Inbound payloads longer than
    /// `max_frame` are rejected.
    pub fn split(stream: TcpStream, max_frame: usize) -> (TcpFrameReader, TcpFrameWriter) {
        let (read, write) = stream.into_split();
        (
            TcpFrameReader {
                half: read,
                buf: BytesMut::with_capacity(4 * 1024),
                max_frame,
            },
            TcpFrameWriter {
                half: write,
                closed: false,
            },
        )
    }

    #[derive(Debug)]
    pub struct TcpFrameReader {
        half: OwnedReadHalf,
        buf: BytesMut,
        max_frame: usize,
    }

    impl TcpFrameReader {
        /// Pops one complete frame off the buffer, if there is one.
        fn parse_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }
            let kind = self.buf[0];
            let len =
                u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
            anyhow::ensure!(
                len <= self.max_frame,
                "frame of {len} bytes exceeds limit of {}",
                self.max_frame
            );
            if self.buf.len() < HEADER_LEN + len {
                self.buf.reserve(HEADER_LEN + len - self.buf.len());
                return Ok(None);
            }
            self.buf.advance(HEADER_LEN);
            let payload = self.buf.split_to(len).freeze();

            match kind {
                0 => Ok(Some(Frame::Data(payload))),
                1 => Ok(Some(Frame::Ping)),
                2 => Ok(Some(Frame::Pong)),
                3 => Ok(Some(Frame::Close)),
                other => anyhow::bail!("unknown frame kind {other}"),
            }
        }
    }

    #[async_trait]
    impl FrameReader for TcpFrameReader {
        // Partial frames stay in `buf`, so a cancelled `recv` loses nothing.
        async fn recv(&mut self) -> anyhow::Result<Option<Frame>> {
            loop {
                if let Some(frame) = self.parse_frame()? {
                    return Ok(Some(frame));
                }
                let n = self.half.read_buf(&mut self.buf).await.context("tcp read")?;
                if n == 0 {
                    anyhow::ensure!(self.buf.is_empty(), "connection closed mid-frame");
                    return Ok(None);
                }
            }
        }
    }

    #[derive(Debug)]
    pub struct TcpFrameWriter {
        half: OwnedWriteHalf,
        closed: bool,
    }

    #[async_trait]
    impl FrameWriter for TcpFrameWriter {
        async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
            anyhow::ensure!(!self.closed, "send on closed writer");
            let kind = frame.kind();
            let payload = match frame {
                Frame::Data(b) => b,
                _ => Bytes::new(),
            };
            let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
            buf.put_u8(kind);
            buf.put_u32(payload.len() as u32);
            buf.extend_from_slice(&payload);
            self.half.write_all(&buf).await.context("tcp write")?;
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.half.shutdown().await.context("tcp shutdown")
        }
    }
}

pub mod memory {
    //! In-process transport. Each side's writer feeds the other side's reader.

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Frame, FrameReader, FrameWriter};

    pub struct MemoryReader {
        rx: mpsc::UnboundedReceiver<Frame>,
    }

    pub struct MemoryWriter {
        tx: Option<mpsc::UnboundedSender<Frame>>,
    }

    /// One end of an in-memory connection.
    pub type Endpoint = (MemoryReader, MemoryWriter);

    /// Creates two connected endpoints.
    pub fn pair() -> (Endpoint, Endpoint) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            (MemoryReader { rx: a_rx }, MemoryWriter { tx: Some(b_tx) }),
            (MemoryReader { rx: b_rx }, MemoryWriter { tx: Some(a_tx) }),
        )
    }

    #[async_trait]
    impl FrameReader for MemoryReader {
        async fn recv(&mut self) -> anyhow::Result<Option<Frame>> {
            Ok(self.rx.recv().await)
        }
    }

    #[async_trait]
    impl FrameWriter for MemoryWriter {
        async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("send on closed writer"))?;
            tx.send(frame)
                .map_err(|_| anyhow::anyhow!("peer hung up"))
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.tx = None;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio::{
        io::AsyncWriteExt,
        net::{TcpListener, TcpStream},
    };

    async fn tcp_pair() -> anyhow::Result<(TcpStream, TcpStream)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        Ok((client?, accepted?.0))
    }

    #[tokio::test]
    async fn tcp_frames_roundtrip() -> anyhow::Result<()> {
        let (a, b) = tcp_pair().await?;
        let (_, mut writer) = tcp::split(a, 64);
        let (mut reader, _) = tcp::split(b, 64);

        writer.send(Frame::Data(Bytes::from_static(b"hello"))).await?;
        writer.send(Frame::Ping).await?;
        writer.close().await?;
        writer.close().await?;

        assert_eq!(
            reader.recv().await?,
            Some(Frame::Data(Bytes::from_static(b"hello")))
        );
        assert_eq!(reader.recv().await?, Some(Frame::Ping));
        assert_eq!(reader.recv().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn tcp_rejects_oversized_frame() -> anyhow::Result<()> {
        let (mut a, b) = tcp_pair().await?;
        let (mut reader, _) = tcp::split(b, 8);

        let mut raw = vec![0u8];
        raw.extend_from_slice(&9u32.to_be_bytes());
        raw.extend_from_slice(&[b'x'; 9]);
        a.write_all(&raw).await?;

        assert!(reader.recv().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn tcp_recv_survives_cancellation_mid_frame() -> anyhow::Result<()> {
        let (mut a, b) = tcp_pair().await?;
        let (mut reader, _) = tcp::split(b, 64);

        a.write_all(&[0, 0, 0, 0, 3, b'a']).await?;
        let early = tokio::time::timeout(Duration::from_millis(50), reader.recv()).await;
        assert!(early.is_err());

        a.write_all(b"bc").await?;
        assert_eq!(
            reader.recv().await?,
            Some(Frame::Data(Bytes::from_static(b"abc")))
        );
        Ok(())
    }

    #[tokio::test]
    async fn memory_close_ends_peer_stream() -> anyhow::Result<()> {
        let ((_, mut a_writer), (mut b_reader, _)) = memory::pair();
        a_writer.send(Frame::Pong).await?;
        a_writer.close().await?;

        assert_eq!(b_reader.recv().await?, Some(Frame::Pong));
        assert_eq!(b_reader.recv().await?, None);
        assert!(a_writer.send(Frame::Ping).await.is_err());
        Ok(())
    }
}
