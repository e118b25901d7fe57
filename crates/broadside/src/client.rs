//! A minimal Broadside client.
//!
//! Speaks the same framing as the server: requests carry an incrementing
//! sequence number, and multi-frame SHOW replies are reassembled before
//! they are returned.

use broadside_protocol::{encode, ChunkAssembler, FrameBuffer, Packet, PacketKind};
use broadside_transport::{Connection, TcpConnection, TransportError};

use crate::BroadsideError;

/// A client connection to a Broadside server.
pub struct Client {
    conn: TcpConnection,
    frames: FrameBuffer,
    chunks: ChunkAssembler,
    next_seq: u8,
}

impl Client {
    /// Connects to the server at `addr`.
    pub async fn connect(addr: &str) -> Result<Self, BroadsideError> {
        let conn = TcpConnection::connect(addr).await?;
        Ok(Self {
            conn,
            frames: FrameBuffer::new(),
            chunks: ChunkAssembler::new(),
            next_seq: 1,
        })
    }

    /// Sends JOIN with `name`. Returns the sequence number used.
    pub async fn join(&mut self, name: &str) -> Result<u8, BroadsideError> {
        self.send(PacketKind::Join, name).await
    }

    /// Sends one request. Returns its sequence number, which the server
    /// echoes in its reply.
    ///
    /// Sequence numbers run 1..=255 and wrap; 0 is what the server uses for
    /// messages nobody asked for.
    pub async fn send(&mut self, kind: PacketKind, text: &str) -> Result<u8, BroadsideError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.checked_add(1).unwrap_or(1);
        let frame = encode(seq, kind, text.as_bytes())?;
        self.conn.send(&frame).await?;
        Ok(seq)
    }

    /// Writes raw bytes, framed or not.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), BroadsideError> {
        Ok(self.conn.send(bytes).await?)
    }

    /// Receives the next message. Returns `Ok(None)` once the server has
    /// closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Packet>, BroadsideError> {
        loop {
            while let Some(packet) = self.frames.next_packet()? {
                if packet.kind != PacketKind::Show {
                    return Ok(Some(packet));
                }
                if let Some(payload) = self.chunks.push(&packet.payload) {
                    return Ok(Some(Packet { payload, ..packet }));
                }
            }
            match self.conn.recv().await? {
                Some(bytes) => self.frames.extend(&bytes),
                None => return Ok(None),
            }
        }
    }

    /// Receives messages until one matches `pred`, discarding the rest.
    ///
    /// # Errors
    /// [`TransportError::ConnectionClosed`] if the server hangs up first.
    pub async fn recv_until(
        &mut self,
        mut pred: impl FnMut(&Packet) -> bool,
    ) -> Result<Packet, BroadsideError> {
        loop {
            match self.recv().await? {
                Some(packet) if pred(&packet) => return Ok(packet),
                Some(_) => {}
                None => {
                    return Err(TransportError::ConnectionClosed(
                        "server closed the connection".into(),
                    )
                    .into());
                }
            }
        }
    }

    /// Closes the write side of the connection.
    pub async fn close(&self) -> Result<(), BroadsideError> {
        Ok(self.conn.close().await?)
    }
}
