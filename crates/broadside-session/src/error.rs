//! Error types for the session layer.
//!
//! A `GameError` is always the player's problem, never the server's: the
//! request is refused, match state is left exactly as it was, and the
//! connection carries on. Each variant has a wire [`code`](GameError::code)
//! that goes at the front of the ERROR frame.

use broadside_board::BoardError;
use broadside_protocol::{CommandError, Packet, PacketKind};

use crate::Phase;

/// Longest piece of client input echoed back in an error, in characters.
const MAX_ECHO_LEN: usize = 16;

/// Cuts client input down to [`MAX_ECHO_LEN`] characters for echoing.
fn clip(text: &str) -> String {
    match text.char_indices().nth(MAX_ECHO_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A request the match refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("it is not your turn")]
    NotYourTurn,

    #[error("not allowed during {0}")]
    WrongPhase(Phase),

    #[error("invalid coordinate `{0}`")]
    BadCoordinate(String),

    #[error("{0}")]
    BadCommand(String),

    #[error("no ship called `{0}` in the fleet")]
    UnknownShip(String),

    #[error("{0} is already placed")]
    AlreadyPlaced(String),

    #[error("{0}")]
    InvalidPlacement(String),

    /// Spectators can only chat or leave.
    #[error("spectators cannot do that")]
    NotAPlayer,

    /// The opponent dropped and has not reconnected yet.
    #[error("opponent is disconnected, wait for them to return")]
    OpponentAway,

    #[error("no room left in this session")]
    SessionFull,

    #[error("unknown packet type 0x{0:02X}")]
    UnknownCommand(u8),

    #[error("payload is not valid text")]
    BadPayload,

    #[error("timed out")]
    Timeout,

    /// The match has already ended.
    #[error("session is over")]
    SessionOver,

    /// Another player with this name is already connected.
    #[error("name `{0}` is already in use")]
    NameTaken(String),
}

impl GameError {
    /// The code placed at the front of the ERROR payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotYourTurn => "NOT_YOUR_TURN",
            Self::WrongPhase(_) | Self::SessionOver => "WRONG_PHASE",
            Self::BadCoordinate(_) => "BAD_COORDINATE",
            Self::BadCommand(_) => "BAD_COMMAND",
            Self::UnknownShip(_) => "UNKNOWN_SHIP",
            Self::AlreadyPlaced(_) => "ALREADY_PLACED",
            Self::InvalidPlacement(_) => "INVALID_PLACEMENT",
            Self::NotAPlayer => "NOT_A_PLAYER",
            Self::OpponentAway => "OPPONENT_AWAY",
            Self::SessionFull => "SESSION_FULL",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::BadPayload => "BAD_PAYLOAD",
            Self::Timeout => "TIMEOUT",
            Self::NameTaken(_) => "NAME_TAKEN",
        }
    }

    /// ERROR frame answering the request numbered `seq`.
    pub fn to_packet(&self, seq: u8) -> Packet {
        Packet::fitted(seq, PacketKind::Error, format!("{} {}", self.code(), self))
    }
}

impl From<BoardError> for GameError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::InvalidCoordinate(text) => Self::BadCoordinate(clip(&text)),
            BoardError::InvalidOrientation(text) => {
                Self::BadCommand(BoardError::InvalidOrientation(clip(&text)).to_string())
            }
            BoardError::UnknownShip(name) => Self::UnknownShip(clip(&name)),
            BoardError::AlreadyPlaced(name) => Self::AlreadyPlaced(name.to_string()),
            BoardError::Blocked { .. } | BoardError::NoRoom(_) => {
                Self::InvalidPlacement(err.to_string())
            }
        }
    }
}

impl From<CommandError> for GameError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Usage(usage) => Self::BadCommand(format!("usage: {usage}")),
            CommandError::Board(board) => board.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_board::Coord;

    #[test]
    fn test_to_packet_prefixes_code_and_echoes_seq() {
        let packet = GameError::NotYourTurn.to_packet(17);
        assert_eq!(packet.seq, 17);
        assert_eq!(packet.kind, PacketKind::Error);
        assert_eq!(packet.text().unwrap(), "NOT_YOUR_TURN it is not your turn");
    }

    #[test]
    fn test_from_board_error_maps_codes() {
        let blocked = BoardError::Blocked {
            ship: "Carrier",
            origin: Coord::new(0, 7).unwrap(),
        };
        assert_eq!(GameError::from(blocked).code(), "INVALID_PLACEMENT");
        assert_eq!(
            GameError::from(BoardError::InvalidCoordinate("Z9".into())).code(),
            "BAD_COORDINATE"
        );
        assert_eq!(
            GameError::from(BoardError::AlreadyPlaced("Cruiser")),
            GameError::AlreadyPlaced("Cruiser".into())
        );
    }

    #[test]
    fn test_from_board_error_clips_long_input() {
        let long = format!("Z{}", "9".repeat(240));
        let err = GameError::from(BoardError::InvalidCoordinate(long));
        assert_eq!(err, GameError::BadCoordinate(format!("Z{}...", "9".repeat(15))));

        let packet = err.to_packet(2);
        assert_eq!(packet.seq, 2);
        assert!(packet.text().unwrap().starts_with("BAD_COORDINATE"));
        assert!(packet.encode().is_ok());
    }

    #[test]
    fn test_to_packet_long_name_still_encodes() {
        let packet = GameError::NameTaken("ö".repeat(300)).to_packet(9);
        assert!(packet.encode().is_ok());
        assert!(packet.text().unwrap().starts_with("NAME_TAKEN"));
    }

    #[test]
    fn test_from_command_usage_is_bad_command() {
        let err = GameError::from(CommandError::Usage("FIRE <coord>"));
        assert_eq!(err.code(), "BAD_COMMAND");
        assert_eq!(err.to_string(), "usage: FIRE <coord>");
    }
}
