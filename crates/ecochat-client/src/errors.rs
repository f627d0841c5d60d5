//! Client error types.

use thiserror::Error;

/// Convenience alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the chat client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The gateway URL or identity headers could not form a valid request.
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),

    /// The client was shut down and no longer accepts commands.
    #[error("client is closed")]
    Closed,
}
