//! Error types for the protocol layer.
//!
//! Each crate in Broadside defines its own error enum. When you see a
//! `ProtocolError`, the problem is in how bytes were framed, not in what
//! the player asked for.

use broadside_board::BoardError;

/// Errors that can occur while framing or unframing packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The payload does not fit the one-byte length field. Split it with
    /// [`chunk_payload`](crate::chunk_payload) first.
    #[error("payload of {len} bytes exceeds the 255-byte frame limit")]
    PayloadTooLarge { len: usize },

    /// Not enough bytes yet for a whole frame. Buffer more and retry.
    #[error("incomplete packet")]
    IncompletePacket,

    /// The CRC did not match. The frame (`consumed` bytes) should be
    /// dropped; the connection can carry on.
    #[error("checksum mismatch in frame seq {seq}")]
    ChecksumMismatch { seq: u8, consumed: usize },

    /// The byte stream can no longer be trusted to line up with frame
    /// boundaries.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The payload is not valid UTF-8 text.
    #[error("payload is not UTF-8")]
    BadPayload,
}

/// Errors from reading a command payload such as `A1 H Carrier`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The payload does not follow the command's grammar.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// A coordinate or orientation inside the payload is invalid.
    #[error(transparent)]
    Board(#[from] BoardError),
}
