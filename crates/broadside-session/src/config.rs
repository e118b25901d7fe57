//! Session configuration and the match phase state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timeouts and limits for every match the server runs.
///
/// Missing fields fall back to the defaults when deserialized, so a config
/// file only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a player may stay silent before the read times out. On
    /// their turn this forfeits the turn.
    pub inactivity_timeout: Duration,

    /// How long both players have to answer the rematch prompt.
    pub rematch_window: Duration,

    /// Spectators allowed per match.
    pub max_spectators: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(30),
            rematch_window: Duration::from_secs(30),
            max_spectators: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a match is in its lifecycle.
///
/// ```text
/// WaitingForPlayers → Placement → InProgress ⇄ GameOver
///          └────────────┴────────────┴─────────┴──→ Terminated
/// ```
///
/// `GameOver → InProgress` is the rematch. Any live phase can end in
/// `Terminated` (quit, declined rematch, abandoned seat), and nothing
/// leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    WaitingForPlayers,
    Placement,
    InProgress,
    GameOver,
    Terminated,
}

impl Phase {
    /// `false` only once the match is over for good.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Terminated)
    }

    /// Returns `true` if moving to `target` is a legal step.
    pub fn can_transition_to(self, target: Self) -> bool {
        use Phase::*;
        matches!(
            (self, target),
            (WaitingForPlayers, Placement)
                | (Placement, InProgress)
                | (InProgress, GameOver)
                | (GameOver, InProgress)
                | (WaitingForPlayers | Placement | InProgress | GameOver, Terminated)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForPlayers => write!(f, "WAITING_FOR_PLAYERS"),
            Self::Placement => write!(f, "PLACEMENT"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::GameOver => write!(f, "GAME_OVER"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}
