//! The reconnection registry: players who dropped and may come back.
//!
//! When a player's connection fails mid-match, their handler vacates the
//! seat and files a [`ReconnectEntry`] here under the player's display
//! name. If a connection joins with that name before the timeout, the lobby
//! takes the entry and the player is put back in their seat with the fleet
//! they left behind.
//!
//! ```text
//!   vacate() ──→ insert() ──→ take()          (rejoined in time)
//!                   │
//!                   └──→ expire_stale()        (timeout: seat abandoned)
//! ```
//!
//! # Concurrency note
//!
//! Like the lobby, the registry is a plain `HashMap`. The server keeps it
//! behind a `tokio::sync::Mutex` in its shared state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use broadside_board::Placement;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Seat, Session};

/// How long a dropped player's seat is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub reconnect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout: Duration::from_secs(60),
        }
    }
}

/// What is kept for a player who dropped mid-match.
#[derive(Debug, Clone)]
pub struct ReconnectEntry {
    /// When the connection failed. The timeout is measured from here.
    pub disconnected_at: Instant,
    /// The seat the player held.
    pub seat: Seat,
    /// The seat of the player still in the match.
    pub opponent_seat: Seat,
    /// The player's fleet and board as they left it.
    pub placement: Placement,
    /// The match to return to.
    pub session: Arc<Session>,
}

impl ReconnectEntry {
    fn is_expired(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.disconnected_at) >= timeout
    }
}

/// Dropped players by display name.
#[derive(Debug, Default)]
pub struct ReconnectRegistry {
    entries: HashMap<String, ReconnectEntry>,
    config: ReconnectConfig,
}

impl ReconnectRegistry {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Files an entry, replacing any older one for the same name.
    pub fn insert(&mut self, name: impl Into<String>, entry: ReconnectEntry) {
        let name = name.into();
        info!(
            %name,
            session_id = %entry.session.id(),
            seat = %entry.seat,
            timeout_secs = self.config.reconnect_timeout.as_secs(),
            "holding seat for reconnection"
        );
        self.entries.insert(name, entry);
    }

    /// Removes and returns `name`'s entry if it has not expired.
    ///
    /// An expired entry is discarded and `None` returned, so a late
    /// arrival is treated as a new player.
    pub fn take(&mut self, name: &str) -> Option<ReconnectEntry> {
        self.take_at(name, Instant::now())
    }

    /// [`take`](Self::take) against an explicit clock.
    pub fn take_at(&mut self, name: &str, now: Instant) -> Option<ReconnectEntry> {
        let entry = self.entries.remove(name)?;
        if entry.is_expired(self.config.reconnect_timeout, now) {
            info!(%name, "reconnection window already closed");
            return None;
        }
        Some(entry)
    }

    /// Removes and returns every expired entry.
    ///
    /// Call this periodically. The caller decides what expiry means for
    /// the match (the server abandons the seat).
    pub fn expire_stale(&mut self) -> Vec<(String, ReconnectEntry)> {
        self.expire_stale_at(Instant::now())
    }

    /// [`expire_stale`](Self::expire_stale) against an explicit clock.
    pub fn expire_stale_at(&mut self, now: Instant) -> Vec<(String, ReconnectEntry)> {
        let timeout = self.config.reconnect_timeout;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(timeout, now))
            .map(|(name, _)| name.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|name| {
                let entry = self.entries.remove(&name)?;
                info!(%name, session_id = %entry.session.id(), "reconnection window expired");
                Some((name, entry))
            })
            .collect()
    }

    /// `true` if `name` has an entry, expired or not.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
