//! Gateway error types and their wire projection.

use ecochat_core::wire::ServerSignal;
use ecochat_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Convenience alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by gateway operations.
///
/// Every variant maps to a caller-only [`ServerSignal::Error`]; nothing in
/// here is ever broadcast to a group.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The caller's role does not permit the operation.
    #[error("operation not permitted for this role: {0}")]
    NotPermitted(&'static str),

    /// The operation requires a target session but none was given.
    #[error("missing session id for {0}")]
    MissingSession(&'static str),

    /// Storage-layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Stable machine-readable code carried in the error signal's details.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotPermitted(_) => "NOT_PERMITTED",
            Self::MissingSession(_) => "MISSING_SESSION",
            Self::Store(StoreError::SessionNotFound(_)) => "SESSION_NOT_FOUND",
            Self::Store(StoreError::EmptyMessage) => "EMPTY_MESSAGE",
            Self::Store(_) => "STORE_FAILURE",
        }
    }

    /// Project this error into the caller-only error signal.
    pub fn to_signal(&self) -> ServerSignal {
        // Internal store failures are not echoed verbatim to clients.
        let message = match self {
            Self::Store(StoreError::SessionNotFound(_) | StoreError::EmptyMessage)
            | Self::NotPermitted(_)
            | Self::MissingSession(_) => self.to_string(),
            Self::Store(_) => "internal storage failure".to_owned(),
        };
        ServerSignal::error_with_details(message, json!({ "code": self.code() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_permitted_signal_carries_code() {
        let err = GatewayError::NotPermitted("SendMessageToSession");
        let v = serde_json::to_value(err.to_signal()).unwrap();
        assert_eq!(v["type"], "Error");
        assert_eq!(v["details"]["code"], "NOT_PERMITTED");
    }

    #[test]
    fn session_not_found_maps_through() {
        let err = GatewayError::from(StoreError::SessionNotFound("chat_x".into()));
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
        let v = serde_json::to_value(err.to_signal()).unwrap();
        assert!(v["message"].as_str().unwrap().contains("chat_x"));
    }

    #[test]
    fn internal_store_errors_are_not_echoed() {
        let err = GatewayError::from(StoreError::Internal("pool exploded".into()));
        let v = serde_json::to_value(err.to_signal()).unwrap();
        assert_eq!(v["details"]["code"], "STORE_FAILURE");
        assert!(!v["message"].as_str().unwrap().contains("pool exploded"));
    }
}
