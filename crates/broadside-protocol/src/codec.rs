//! Frame encoding and decoding.
//!
//! Every packet on the wire is one frame:
//!
//! ```text
//! +-----+------+-----+-------------------+--------------+
//! | seq | type | len | payload (len B)   | crc32 (4 B)  |
//! +-----+------+-----+-------------------+--------------+
//! ```
//!
//! The CRC-32 (IEEE) covers `seq`, `type`, `len` and the payload, and is
//! written big-endian.
//!
//! Two decoders are provided:
//!
//! - [`decode`] reads the first frame out of a byte stream, trusting the
//!   length byte to find where it ends. This is what a connection uses.
//! - [`decode_frame`] checks a buffer that is known to hold exactly one
//!   frame. The CRC is taken from the last four bytes, so corruption
//!   anywhere (the length byte included) shows up as a checksum mismatch.

use crc32fast::Hasher;
use tracing::warn;

use crate::{Packet, PacketKind, ProtocolError};

/// Bytes before the payload: seq, type, len.
pub const HEADER_LEN: usize = 3;

/// Bytes after the payload.
pub const CHECKSUM_LEN: usize = 4;

/// Smallest possible frame: header plus checksum, empty payload.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CHECKSUM_LEN;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Consecutive checksum failures after which a stream is treated as
/// desynchronised.
pub const MAX_CONSECUTIVE_CORRUPT: usize = 3;

/// CRC-32 over `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Builds one wire frame.
///
/// # Errors
/// [`ProtocolError::PayloadTooLarge`] when `payload` is over 255 bytes.
pub fn encode(seq: u8, kind: PacketKind, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u8::try_from(payload.len())
        .map_err(|_| ProtocolError::PayloadTooLarge { len: payload.len() })?;

    let mut frame = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
    frame.push(seq);
    frame.push(kind.to_byte());
    frame.push(len);
    frame.extend_from_slice(payload);

    let crc = checksum(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    Ok(frame)
}

/// Decodes the first frame in `buf`.
///
/// Returns the packet and how many bytes it used. On a checksum failure
/// the error still says how many bytes to skip, so the caller can drop
/// the bad frame and keep reading.
pub fn decode(buf: &[u8]) -> Result<(Packet, usize), ProtocolError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::IncompletePacket);
    }

    let len = buf[2] as usize;
    let body_end = HEADER_LEN + len;
    let total = body_end + CHECKSUM_LEN;
    if buf.len() < total {
        return Err(ProtocolError::IncompletePacket);
    }

    if checksum(&buf[..body_end]) != read_crc(&buf[body_end..total]) {
        return Err(ProtocolError::ChecksumMismatch {
            seq: buf[0],
            consumed: total,
        });
    }

    let packet = Packet {
        seq: buf[0],
        kind: PacketKind::from(buf[1]),
        payload: buf[HEADER_LEN..body_end].to_vec(),
    };
    Ok((packet, total))
}

/// Decodes a buffer holding exactly one frame.
///
/// # Errors
/// - [`ProtocolError::IncompletePacket`] if shorter than seven bytes
/// - [`ProtocolError::ChecksumMismatch`] if the trailing CRC disagrees
///   with the rest of the frame
/// - [`ProtocolError::Malformed`] if the CRC is fine but the length byte
///   does not match the payload actually present
pub fn decode_frame(frame: &[u8]) -> Result<Packet, ProtocolError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::IncompletePacket);
    }

    let (body, crc) = frame.split_at(frame.len() - CHECKSUM_LEN);
    if checksum(body) != read_crc(crc) {
        return Err(ProtocolError::ChecksumMismatch {
            seq: frame[0],
            consumed: frame.len(),
        });
    }

    let declared = body[2] as usize;
    let actual = body.len() - HEADER_LEN;
    if declared != actual {
        return Err(ProtocolError::Malformed(format!(
            "length byte says {declared}, frame carries {actual} payload bytes"
        )));
    }

    Ok(Packet {
        seq: body[0],
        kind: PacketKind::from(body[1]),
        payload: body[HEADER_LEN..].to_vec(),
    })
}

fn read_crc(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; CHECKSUM_LEN];
    raw.copy_from_slice(bytes);
    u32::from_be_bytes(raw)
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Accumulates raw reads from a connection and yields whole packets.
///
/// TCP hands over bytes in whatever pieces it likes: half a frame, three
/// frames at once. Feed every read into [`extend`](Self::extend) and call
/// [`next_packet`](Self::next_packet) until it returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    corrupt_streak: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pops the next complete packet.
    ///
    /// - `Ok(None)`: wait for more bytes.
    /// - `Err(ChecksumMismatch)`: the bad frame was dropped. The caller may
    ///   report it and call again.
    /// - `Err(Malformed)`: too many bad frames in a row. The stream is lost
    ///   and the connection should be closed.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        match decode(&self.buf) {
            Ok((packet, consumed)) => {
                self.buf.drain(..consumed);
                self.corrupt_streak = 0;
                Ok(Some(packet))
            }
            Err(ProtocolError::IncompletePacket) => Ok(None),
            Err(ProtocolError::ChecksumMismatch { seq, consumed }) => {
                self.buf.drain(..consumed);
                self.corrupt_streak += 1;
                warn!(seq, streak = self.corrupt_streak, "dropped corrupt frame");

                if self.corrupt_streak >= MAX_CONSECUTIVE_CORRUPT {
                    return Err(ProtocolError::Malformed(format!(
                        "{} consecutive corrupt frames",
                        self.corrupt_streak
                    )));
                }
                Err(ProtocolError::ChecksumMismatch { seq, consumed })
            }
            Err(other) => Err(other),
        }
    }
}
