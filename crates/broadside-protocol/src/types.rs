//! Packet types that travel on the wire.

use std::fmt;

use crate::{ProtocolError, MAX_PAYLOAD_LEN};

/// What a packet is for. The second byte of every frame.
///
/// Bytes that match no known kind decode to [`PacketKind::Unknown`] so the
/// connection handler can answer them with an error instead of dropping
/// the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Client → Server: first frame, carrying the display name.
    Join,
    /// Client → Server: `<coord>`. Server → Client: the shot's result.
    Fire,
    /// Client → Server: "show my board". Server → Client: the rendering.
    Show,
    /// Either direction: leaving the match.
    Quit,
    /// Free text, broadcast to the whole session.
    Chat,
    /// Client → Server: `<coord> <H|V> <ship>` or `AUTO`.
    Place,
    /// Client → Server: `YES` or `NO` after a game ends.
    Rematch,
    /// Server → Client: `<CODE> <message>`.
    Error,
    /// Any other byte.
    Unknown(u8),
}

impl PacketKind {
    /// Wire byte for this kind.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Join => 0x00,
            Self::Fire => 0x01,
            Self::Show => 0x02,
            Self::Quit => 0x03,
            Self::Chat => 0x04,
            Self::Place => 0x05,
            Self::Rematch => 0x06,
            Self::Error => 0xFF,
            Self::Unknown(byte) => byte,
        }
    }
}

impl From<u8> for PacketKind {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => Self::Join,
            0x01 => Self::Fire,
            0x02 => Self::Show,
            0x03 => Self::Quit,
            0x04 => Self::Chat,
            0x05 => Self::Place,
            0x06 => Self::Rematch,
            0xFF => Self::Error,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join => write!(f, "JOIN"),
            Self::Fire => write!(f, "FIRE"),
            Self::Show => write!(f, "SHOW"),
            Self::Quit => write!(f, "QUIT"),
            Self::Chat => write!(f, "CHAT"),
            Self::Place => write!(f, "PLACE"),
            Self::Rematch => write!(f, "REMATCH"),
            Self::Error => write!(f, "ERROR"),
            Self::Unknown(byte) => write!(f, "UNKNOWN(0x{byte:02X})"),
        }
    }
}

/// One decoded frame.
///
/// `seq` is an opaque correlation id: the server echoes a request's `seq`
/// in its reply and uses 0 for unsolicited broadcasts. Nothing checks it
/// for ordering or replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u8,
    pub kind: PacketKind,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Builds a packet from anything that converts into bytes.
    pub fn new(seq: u8, kind: PacketKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            seq,
            kind,
            payload: payload.into(),
        }
    }

    /// Builds a text packet, cutting `text` on a character boundary so it
    /// fits one frame.
    ///
    /// Use this whenever the text carries something a client supplied.
    pub fn fitted(seq: u8, kind: PacketKind, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.len() > MAX_PAYLOAD_LEN {
            let mut cut = MAX_PAYLOAD_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Self::new(seq, kind, text)
    }

    /// The payload as text.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::BadPayload)
    }

    /// Encodes this packet as one wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        crate::encode(self.seq, self.kind, &self.payload)
    }
}
