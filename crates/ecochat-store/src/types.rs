//! Persisted chat entities.

use ecochat_core::wire::MessagePayload;
use serde::{Deserialize, Serialize};

/// A durable conversation thread between one customer and the admin pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Server-generated identifier (`chat_<uuidv7>`).
    pub id: String,
    /// Owning customer.
    pub user_id: String,
    /// Creation timestamp (RFC-3339, immutable).
    pub created_at: String,
    /// Soft-close flag. Sessions are never hard-deleted.
    pub is_active: bool,
}

/// A single message within a session. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store-assigned ID, strictly increasing within a session.
    pub id: i64,
    /// Owning session (immutable).
    pub session_id: String,
    /// Sender identity.
    pub from_user_id: String,
    /// Message text, opaque to the core.
    pub text: String,
    /// Server-assigned timestamp (RFC-3339).
    pub sent_at: String,
    /// Whether the sender was support staff (immutable).
    pub from_admin: bool,
    /// Read flag — the only mutable field.
    pub is_read: bool,
}

/// Result of a successful append.
///
/// `was_first` is computed inside the insert transaction, so two
/// near-simultaneous first sends cannot both observe an empty session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// The persisted message with assigned `id` and `sent_at`.
    pub message: ChatMessage,
    /// Whether this was the first message ever stored in the session.
    pub was_first: bool,
}

impl From<ChatMessage> for MessagePayload {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            session_id: m.session_id,
            from_user_id: m.from_user_id,
            text: m.text,
            sent_at: m.sent_at,
            from_admin: m.from_admin,
            is_read: m.is_read,
        }
    }
}
