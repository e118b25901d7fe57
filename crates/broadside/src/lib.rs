//! # Broadside
//!
//! A two-player Battleship server over a small checksummed binary protocol.
//!
//! Broadside pairs players in join order, walks each pair through fleet
//! placement and alternating fire, lets extra connections spectate, holds
//! a dropped player's seat for a while so they can rejoin, and offers a
//! rematch when a fleet goes down.
//!
//! ## Crates
//!
//! | Crate | Concern |
//! |-------|---------|
//! | `broadside-transport` | TCP listener and byte-stream connections |
//! | `broadside-protocol` | Frames, CRC-32 checksums, chunking, command grammars |
//! | `broadside-board` | Coordinates, the fleet, placement and shots |
//! | `broadside-session` | Match phases, turns, rematch, reconnection registry |
//! | `broadside-lobby` | Pairing, spectating, rejoining |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use broadside::prelude::*;
//!
//! let server = BroadsideServer::builder()
//!     .bind("127.0.0.1:12345")
//!     .build()
//!     .await?;
//! server.run().await
//! ```

mod client;
mod error;
mod handler;
mod server;

pub use client::Client;
pub use error::BroadsideError;
pub use server::{BroadsideServer, BroadsideServerBuilder, ServerConfig, DEFAULT_BIND_ADDR};

/// Re-exports for the common case.
pub mod prelude {
    pub use crate::{BroadsideError, BroadsideServer, BroadsideServerBuilder, Client, ServerConfig};
    pub use broadside_board::{Coord, Orientation, ShipType, ShotResult, FLEET};
    pub use broadside_protocol::{Packet, PacketKind};
    pub use broadside_session::{GameError, Phase, ReconnectConfig, Seat, SessionConfig};
}
