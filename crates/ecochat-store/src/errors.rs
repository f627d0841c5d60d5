//! Error types for the session store.

use thiserror::Error;

/// Errors returned by session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// Requested session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Message text was empty after trimming.
    #[error("message text must not be empty")]
    EmptyMessage,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_display() {
        let err = StoreError::SessionNotFound("chat_123".into());
        assert_eq!(err.to_string(), "session not found: chat_123");
    }

    #[test]
    fn empty_message_display() {
        assert_eq!(
            StoreError::EmptyMessage.to_string(),
            "message text must not be empty"
        );
    }

    #[test]
    fn from_rusqlite_error() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn migration_error_display() {
        let err = StoreError::Migration {
            message: "v001 failed".into(),
        };
        assert_eq!(err.to_string(), "migration error: v001 failed");
    }
}
