//! The session store contract consumed by the chat gateway.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{ChatMessage, ChatSession, StoredMessage};

/// Durable CRUD for chat sessions and messages.
///
/// Implementations own their concurrency control: `get_or_create_session`
/// must be atomic (concurrent calls for one user yield exactly one session),
/// and `append_message` must assign IDs in a total order per session.
/// Every method is a potential suspension point — callers hold no locks
/// across these calls.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the user's active session, creating one if none exists.
    async fn get_or_create_session(&self, user_id: &str) -> Result<ChatSession>;

    /// Fetch a session by ID.
    ///
    /// Fails with [`crate::StoreError::SessionNotFound`] for unknown IDs.
    async fn get_session_by_id(&self, session_id: &str) -> Result<ChatSession>;

    /// List sessions, newest first. Inactive sessions are excluded unless
    /// `include_inactive` is set.
    async fn list_sessions(&self, include_inactive: bool) -> Result<Vec<ChatSession>>;

    /// Append a message to a session, assigning its ID and timestamp.
    ///
    /// Rejects empty text and unknown sessions. The returned
    /// [`StoredMessage::was_first`] flag is computed atomically with the
    /// insert.
    async fn append_message(
        &self,
        session_id: &str,
        from_user_id: &str,
        text: &str,
        from_admin: bool,
    ) -> Result<StoredMessage>;

    /// Fetch a session's messages in insertion order.
    async fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Flag the counterparty's unread messages as read.
    ///
    /// When `admin_viewer` is true, customer messages are flagged; otherwise
    /// admin messages are. Returns the number of messages flipped.
    async fn mark_read(&self, session_id: &str, admin_viewer: bool) -> Result<u64>;

    /// Soft-close a session (`is_active = false`). Administrative action;
    /// the gateway never calls this.
    async fn close_session(&self, session_id: &str) -> Result<()>;
}
