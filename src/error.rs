//! Error taxonomy for the ACP provider core.

use thiserror::Error;

/// Result type alias for ACP operations.
pub type Result<T> = std::result::Result<T, AcpError>;

/// Errors surfaced by the ACP provider core.
///
/// Variants map directly onto the error taxonomy of the component design:
/// configuration guard failures, process lifecycle failures, session
/// creation failures, protocol-level failures, and the two user-facing
/// cancellation paths.
#[derive(Debug, Error)]
pub enum AcpError {
    /// ACP disabled, unknown agent id, or no agents configured.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The agent subprocess could not be spawned.
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(String),

    /// The `initialize` handshake did not complete within the bounded time.
    #[error("handshake with agent did not complete: {0}")]
    HandshakeFailed(String),

    /// `session/new` or `session/load` failed.
    #[error("failed to create or load session: {0}")]
    SessionCreationFailed(String),

    /// Malformed frame or unrecoverable parse failure on the wire.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// `prompt` returned an error.
    #[error("prompt failed: {0}")]
    PromptFailed(String),

    /// The user cancelled a pending permission dialog.
    #[error("permission request cancelled")]
    PermissionCancelled,

    /// The consumer abandoned the stream; `cancel` was issued to the agent.
    #[error("stream cancelled by consumer")]
    UserCancellation,

    /// Protocol-level errors surfaced by `agent_client_protocol` itself.
    #[error("agent client protocol error: {0}")]
    Protocol(#[from] agent_client_protocol::Error),

    /// IO errors spawning or talking to a child process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors on the JSON wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AcpError {
    /// True for errors that must not be cached — the next `getConnection`
    /// retries a fresh spawn rather than reusing a dead handle.
    pub fn is_transient_spawn_error(&self) -> bool {
        matches!(self, AcpError::SpawnFailed(_) | AcpError::HandshakeFailed(_))
    }
}
