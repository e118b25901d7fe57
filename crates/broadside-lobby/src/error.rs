//! Error types for the lobby.

/// Errors from admitting a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// Someone with this name is already waiting or playing. Names key the
    /// reconnection registry, so two live players cannot share one.
    #[error("name `{0}` is already in use")]
    NameTaken(String),
}
