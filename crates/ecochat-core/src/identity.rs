//! Caller identity as resolved by the transport layer.
//!
//! Authentication itself is external: by the time a connection reaches the
//! gateway the transport has already established *who* is calling. The
//! gateway only consumes the resolved identity.

use serde::{Deserialize, Serialize};

/// Resolved identity of a connected caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Whether the caller has the admin (support staff) role.
    pub is_admin: bool,
}

impl Identity {
    /// A customer identity.
    pub fn customer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    /// An admin identity.
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}
