//! `BroadsideServer` builder and server loop.
//!
//! This is the entry point for running a Broadside server. It ties
//! together all the layers: transport → protocol → lobby → session.

use std::sync::Arc;
use std::time::Duration;

use broadside_lobby::Lobby;
use broadside_session::{ReconnectConfig, ReconnectRegistry, SessionConfig};
use broadside_transport::{Transport, TcpTransport};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::handler::{handle_connection, Pending};
use crate::BroadsideError;

/// Default listening address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:12345";

/// Shortest sweep period accepted; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Server-wide settings.
///
/// Every field has a default, so a partial JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Settings for each match.
    pub session: SessionConfig,
    /// How long a dropped player's seat is held.
    pub reconnect: ReconnectConfig,
    /// How long a new connection has to send its JOIN.
    pub join_timeout: Duration,
    /// How often expired reconnection entries are settled.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            session: SessionConfig::default(),
            reconnect: ReconnectConfig::default(),
            join_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Lock order is `lobby` then `registry`; nothing takes them the other way
/// round.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) lobby: Mutex<Lobby<Pending>>,
    pub(crate) registry: Mutex<ReconnectRegistry>,
}

/// Builder for configuring and starting a Broadside server.
///
/// # Example
///
/// ```rust,ignore
/// use broadside::prelude::*;
///
/// let server = BroadsideServer::builder()
///     .bind("0.0.0.0:12345")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct BroadsideServerBuilder {
    config: ServerConfig,
}

impl BroadsideServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the per-match configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets how long dropped players may take to come back.
    pub fn reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.config.reconnect = config;
        self
    }

    /// Sets how long a new connection has to send its JOIN.
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Binds the listener.
    pub async fn build(self) -> Result<BroadsideServer, BroadsideError> {
        let transport = TcpTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            lobby: Mutex::new(Lobby::new(self.config.session.clone())),
            registry: Mutex::new(ReconnectRegistry::new(self.config.reconnect.clone())),
            config: self.config,
        });

        Ok(BroadsideServer { transport, state })
    }
}

impl Default for BroadsideServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Broadside server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BroadsideServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl BroadsideServer {
    /// Creates a new builder.
    pub fn builder() -> BroadsideServerBuilder {
        BroadsideServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task per accepted connection and a sweeper that
    /// settles seats whose reconnection window ran out. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), BroadsideError> {
        tracing::info!(addr = %self.state.config.bind_addr, "Broadside server running");
        let _sweeper = spawn_sweeper(Arc::clone(&self.state));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodically abandons the seats of players who did not come back in
/// time, so their opponents are not left waiting for the next JOIN.
fn spawn_sweeper(state: Arc<ServerState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = state.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let expired = state.registry.lock().await.expire_stale();
            for (name, entry) in expired {
                if entry.session.abandon(entry.seat).await {
                    tracing::info!(
                        %name,
                        session_id = %entry.session.id(),
                        "reconnection window closed, seat abandoned"
                    );
                }
            }
            state.lobby.lock().await.prune();
        }
    })
}
