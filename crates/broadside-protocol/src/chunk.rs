//! Splitting long payloads across several frames.
//!
//! A frame holds at most 255 payload bytes. Longer messages (a board
//! rendering is 373 bytes) go out as a series of frames whose payloads
//! start with `MORE\n`, except the last, which starts with `LAST\n`.
//! Messages that fit in one frame are sent without a marker.

use crate::MAX_PAYLOAD_LEN;

/// Prefix of every chunk but the last.
pub const MORE_MARKER: &[u8] = b"MORE\n";

/// Prefix of the final chunk.
pub const LAST_MARKER: &[u8] = b"LAST\n";

/// Body bytes per chunk once the marker is accounted for.
pub const CHUNK_BODY_LEN: usize = MAX_PAYLOAD_LEN - MORE_MARKER.len();

/// Splits `message` into frame-sized payloads.
pub fn chunk_payload(message: &[u8]) -> Vec<Vec<u8>> {
    if message.len() <= MAX_PAYLOAD_LEN {
        return vec![message.to_vec()];
    }

    let pieces: Vec<&[u8]> = message.chunks(CHUNK_BODY_LEN).collect();
    let last = pieces.len() - 1;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            let marker = if i == last { LAST_MARKER } else { MORE_MARKER };
            let mut payload = Vec::with_capacity(marker.len() + body.len());
            payload.extend_from_slice(marker);
            payload.extend_from_slice(body);
            payload
        })
        .collect()
}

/// Rebuilds messages on the receiving side.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: Vec<u8>,
    in_progress: bool,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one payload. Returns the whole message once it is complete.
    ///
    /// Unmarked payloads are complete messages on their own and pass
    /// straight through.
    pub fn push(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        if let Some(body) = payload.strip_prefix(MORE_MARKER) {
            self.pending.extend_from_slice(body);
            self.in_progress = true;
            None
        } else if let Some(body) = payload.strip_prefix(LAST_MARKER) {
            self.pending.extend_from_slice(body);
            self.in_progress = false;
            Some(std::mem::take(&mut self.pending))
        } else {
            Some(payload.to_vec())
        }
    }

    /// `true` while a `MORE` sequence is open.
    pub fn is_pending(&self) -> bool {
        self.in_progress
    }

    /// Discards a half-received message.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.in_progress = false;
    }
}
