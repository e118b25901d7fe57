//! Unified error type for the Broadside server and client.

use std::time::Duration;

use broadside_lobby::LobbyError;
use broadside_protocol::ProtocolError;
use broadside_session::GameError;
use broadside_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BroadsideError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A framing error (oversized payload, desynchronised stream).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request the match refused.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The lobby would not admit the connection.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The connection never sent its JOIN.
    #[error("no JOIN received within {0:?}")]
    JoinTimeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let broadside_err: BroadsideError = err.into();
        assert!(matches!(broadside_err, BroadsideError::Transport(_)));
        assert!(broadside_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::PayloadTooLarge { len: 300 };
        let broadside_err: BroadsideError = err.into();
        assert!(matches!(broadside_err, BroadsideError::Protocol(_)));
    }

    #[test]
    fn test_from_game_error() {
        let broadside_err: BroadsideError = GameError::NotYourTurn.into();
        assert!(matches!(broadside_err, BroadsideError::Game(_)));
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::NameTaken("Alice".into());
        let broadside_err: BroadsideError = err.into();
        assert!(broadside_err.to_string().contains("Alice"));
    }
}
