//! Match state and reconnection for Broadside.
//!
//! A [`Session`] is one match between two players: their seats, their
//! fleets, whose turn it is, and who is watching. Connection handlers share
//! it through an `Arc` and every operation runs under the session's lock.
//!
//! # Key types
//!
//! - [`Session`]: the match and its operations (place, fire, rematch, quit)
//! - [`Phase`]: the match lifecycle state machine
//! - [`SessionConfig`]: inactivity timeout, rematch window, spectator limit
//! - [`ReconnectRegistry`]: dropped players waiting to rejoin
//! - [`GameError`]: refused requests, each with a wire code

mod config;
mod error;
mod registry;
mod session;

pub use config::{Phase, SessionConfig};
pub use error::GameError;
pub use registry::{ReconnectConfig, ReconnectEntry, ReconnectRegistry};
pub use session::{
    FireOutcome, Participant, ParticipantSender, Recipient, Seat, Session, SessionId,
    SessionOutbound, SpectatorId,
};
