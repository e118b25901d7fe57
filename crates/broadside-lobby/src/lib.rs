//! Matchmaking for Broadside.
//!
//! Every connection that has sent its JOIN goes through [`Lobby::admit`],
//! which decides where it belongs:
//!
//! 1. **Rejoin**: the name has a live entry in the reconnection registry,
//!    so the player goes back to their seat.
//! 2. **Spectate**: a match is running and has spectator room.
//! 3. **Queue**: otherwise the connection waits. When a second one
//!    arrives the two are paired into a new [`Session`].
//!
//! The lobby is generic over the connection type `T` it holds while a
//! player waits, so it can be tested without sockets. `T` reports through
//! [`Waiter`] whether its peer is still there; departed waiters are never
//! paired and do not hold on to their name.
//!
//! # Concurrency note
//!
//! `Lobby` is not thread-safe by itself. The server keeps it behind a
//! `tokio::sync::Mutex`, next to the registry.

use std::collections::VecDeque;
use std::sync::Arc;

use broadside_session::{ReconnectEntry, ReconnectRegistry, Session, SessionConfig};
use tracing::info;

mod error;

pub use error::LobbyError;

/// A connection the lobby can hold while it waits for an opponent.
pub trait Waiter {
    /// Returns `true` once the peer has gone and the connection can no
    /// longer be seated.
    fn is_gone(&self) -> bool;
}

/// A connection waiting for an opponent.
#[derive(Debug)]
pub struct Waiting<T> {
    pub name: String,
    pub conn: T,
}

/// Where [`Lobby::admit`] sent a connection.
#[derive(Debug)]
pub enum Admission<T> {
    /// Back to a seat the player dropped out of.
    Rejoin { conn: T, entry: ReconnectEntry },
    /// Watching a running match.
    Spectate { conn: T, session: Arc<Session> },
    /// Held by the lobby until an opponent arrives. `position` counts
    /// from 1.
    Queued { position: usize },
    /// Two waiting connections now share a new session. `players[0]` takes
    /// the first seat.
    Paired {
        session: Arc<Session>,
        players: [Waiting<T>; 2],
    },
}

/// The waiting queue and the list of running matches.
#[derive(Debug)]
pub struct Lobby<T> {
    config: SessionConfig,
    waiting: VecDeque<Waiting<T>>,
    sessions: Vec<Arc<Session>>,
}

impl<T> Lobby<T> {
    /// Creates an empty lobby. New sessions get `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            waiting: VecDeque::new(),
            sessions: Vec::new(),
        }
    }

    /// Takes `name` out of the waiting queue.
    ///
    /// Returns `None` when `name` is not waiting, which includes a waiter
    /// that has already been paired.
    pub fn withdraw(&mut self, name: &str) -> Option<T> {
        let index = self.waiting.iter().position(|w| w.name == name)?;
        let waiting = self.waiting.remove(index)?;
        info!(name, waiting = self.waiting.len(), "left the queue");
        Some(waiting.conn)
    }

    fn is_name_in_use(&self, name: &str) -> bool {
        self.waiting.iter().any(|w| w.name == name)
            || self.sessions.iter().any(|s| s.seat_of(name).is_some())
    }

    /// Forgets terminated sessions. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|session| session.phase().is_live());
        before - self.sessions.len()
    }

    /// Running matches, oldest first.
    pub fn sessions(&self) -> &[Arc<Session>] {
        &self.sessions
    }

    /// Connections waiting for an opponent.
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}

impl<T: Waiter> Lobby<T> {
    /// Routes a newly joined connection.
    ///
    /// Expired reconnection entries are settled first (their seats are
    /// abandoned), terminated sessions and departed waiters are dropped, so
    /// a name whose window has closed is admitted as a new player.
    ///
    /// # Errors
    /// [`LobbyError::NameTaken`] if `name` is already waiting or seated in a
    /// running match and has no reconnection entry.
    pub async fn admit(
        &mut self,
        name: &str,
        conn: T,
        registry: &mut ReconnectRegistry,
    ) -> Result<Admission<T>, LobbyError> {
        for (_, entry) in registry.expire_stale() {
            entry.session.abandon(entry.seat).await;
        }
        self.prune();
        self.drop_departed();

        if let Some(entry) = registry.take(name) {
            if entry.session.phase().is_live() {
                info!(name, session_id = %entry.session.id(), seat = %entry.seat, "rejoining");
                return Ok(Admission::Rejoin { conn, entry });
            }
        }

        if self.is_name_in_use(name) {
            return Err(LobbyError::NameTaken(name.to_string()));
        }

        for session in &self.sessions {
            if session.has_spectator_capacity().await {
                info!(name, session_id = %session.id(), "joining as spectator");
                return Ok(Admission::Spectate {
                    conn,
                    session: Arc::clone(session),
                });
            }
        }

        self.waiting.push_back(Waiting {
            name: name.to_string(),
            conn,
        });
        match self.pair() {
            Some(paired) => Ok(paired),
            None => {
                info!(name, waiting = self.waiting.len(), "queued for a match");
                Ok(Admission::Queued {
                    position: self.waiting.len(),
                })
            }
        }
    }

    /// Pairs the two longest-waiting connections, if there are two.
    fn pair(&mut self) -> Option<Admission<T>> {
        self.drop_departed();
        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?;
        let second = self.waiting.pop_front()?;

        let session = Session::new(
            self.config.clone(),
            [first.name.clone(), second.name.clone()],
        );
        info!(
            session_id = %session.id(),
            first = %first.name,
            second = %second.name,
            "players paired"
        );
        self.sessions.push(Arc::clone(&session));
        Some(Admission::Paired {
            session,
            players: [first, second],
        })
    }

    /// Forgets waiters whose peer has gone.
    fn drop_departed(&mut self) {
        self.waiting.retain(|w| {
            let gone = w.conn.is_gone();
            if gone {
                info!(name = %w.name, "dropping departed waiter");
            }
            !gone
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Waiter for u32 {
        fn is_gone(&self) -> bool {
            *self == 0
        }
    }

    #[tokio::test]
    async fn test_admit_first_connection_is_queued() {
        let mut lobby = Lobby::new(SessionConfig::default());
        let mut registry = ReconnectRegistry::default();

        let admission = lobby.admit("Alice", 1u32, &mut registry).await.unwrap();

        assert!(matches!(admission, Admission::Queued { position: 1 }));
        assert_eq!(lobby.waiting_len(), 1);
    }

    #[tokio::test]
    async fn test_admit_duplicate_waiting_name_rejected() {
        let mut lobby = Lobby::new(SessionConfig::default());
        let mut registry = ReconnectRegistry::default();
        lobby.admit("Alice", 1u32, &mut registry).await.unwrap();

        let err = lobby.admit("Alice", 2, &mut registry).await.unwrap_err();
        assert_eq!(err, LobbyError::NameTaken("Alice".into()));
    }

    #[tokio::test]
    async fn test_withdraw_frees_name() {
        let mut lobby = Lobby::new(SessionConfig::default());
        let mut registry = ReconnectRegistry::default();
        lobby.admit("Alice", 1u32, &mut registry).await.unwrap();

        assert_eq!(lobby.withdraw("Alice"), Some(1));
        assert_eq!(lobby.withdraw("Alice"), None);
        assert_eq!(lobby.waiting_len(), 0);
    }

    #[tokio::test]
    async fn test_admit_departed_waiter_is_not_paired() {
        let mut lobby = Lobby::new(SessionConfig::default());
        let mut registry = ReconnectRegistry::default();
        lobby.admit("Alice", 0u32, &mut registry).await.unwrap();

        let admission = lobby.admit("Bob", 2, &mut registry).await.unwrap();
        assert!(matches!(admission, Admission::Queued { position: 1 }));
    }

    #[test]
    fn test_prune_on_empty_lobby() {
        let mut lobby: Lobby<u32> = Lobby::new(SessionConfig::default());
        assert_eq!(lobby.prune(), 0);
        assert!(lobby.sessions().is_empty());
    }
}
