//! Wire protocol for Broadside.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Types** ([`Packet`], [`PacketKind`]): what travels on the wire.
//! - **Codec** ([`encode`], [`decode`], [`decode_frame`], [`FrameBuffer`]):
//!   how packets become checksummed frames and back.
//! - **Chunking** ([`chunk_payload`], [`ChunkAssembler`]): messages longer
//!   than one frame.
//! - **Commands** ([`PlaceCommand`], [`FireCommand`], [`RematchAnswer`]):
//!   the text grammars inside request payloads.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the game
//! session. It doesn't know about players or turns.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Session (match state)
//! ```

mod chunk;
mod codec;
mod command;
mod error;
mod types;

pub use chunk::{chunk_payload, ChunkAssembler, CHUNK_BODY_LEN, LAST_MARKER, MORE_MARKER};
pub use codec::{
    checksum, decode, decode_frame, encode, FrameBuffer, CHECKSUM_LEN, HEADER_LEN,
    MAX_CONSECUTIVE_CORRUPT, MAX_PAYLOAD_LEN, MIN_FRAME_LEN,
};
pub use command::{FireCommand, PlaceCommand, RematchAnswer};
pub use error::{CommandError, ProtocolError};
pub use types::{Packet, PacketKind};
