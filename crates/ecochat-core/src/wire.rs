//! Wire contract between clients and the chat gateway.
//!
//! Both directions are JSON objects tagged by a `type` field. Signal and
//! command names are the protocol surface every consumer parses, so they are
//! spelled out here once and reused by the server and the client wrapper.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted chat message as broadcast to subscribers.
///
/// This is the full stored message projected verbatim. There is no
/// per-recipient field filtering: customers and admins see the same shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Store-assigned message ID, monotonic within a session.
    pub id: i64,
    /// Owning session.
    pub session_id: String,
    /// Sender identity.
    pub from_user_id: String,
    /// Message text, opaque to the core.
    pub text: String,
    /// Server-assigned RFC-3339 timestamp.
    pub sent_at: String,
    /// Whether the sender was support staff.
    pub from_admin: bool,
    /// Read flag, `false` at creation.
    pub is_read: bool,
}

/// Client→gateway invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Send a message into the caller's own session (customers only).
    SendMessage {
        /// Message text.
        text: String,
    },
    /// Send a message into an explicit session (admins only).
    SendMessageToSession {
        /// Target session.
        session_id: String,
        /// Message text.
        text: String,
    },
    /// Join a session's broadcast group (admins only).
    JoinSession {
        /// Target session.
        session_id: String,
    },
    /// Leave a session's broadcast group (admins only).
    LeaveSession {
        /// Target session.
        session_id: String,
    },
    /// Ephemeral typing indicator. Admins pass the target session;
    /// customers omit it and their own active session is used.
    Typing {
        /// Target session (admins only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Mark the counterparty's messages in a session as read. Admins pass
    /// the target session; customers omit it.
    MarkRead {
        /// Target session (admins only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

/// Gateway→client signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerSignal {
    /// A message was persisted into a session this connection follows.
    ReceiveMessage(MessagePayload),
    /// Admin-wide alert for a customer message (preview only).
    NewMessageNotification {
        /// Session that received the message.
        session_id: String,
        /// Customer who sent it.
        user_id: String,
        /// Truncated preview of the text.
        message_preview: String,
    },
    /// Admin-wide alert that a session received its first message.
    NewSession {
        /// Newly surfaced session.
        session_id: String,
        /// Owning customer.
        user_id: String,
        /// Session creation timestamp (RFC-3339).
        created_at: String,
    },
    /// Caller-only error report. Never broadcast.
    Error {
        /// Human-readable description.
        message: String,
        /// Optional diagnostic detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    /// Caller-only confirmation of `JoinSession`.
    JoinedSession {
        /// Joined session.
        session_id: String,
    },
    /// Caller-only confirmation of `LeaveSession`.
    LeftSession {
        /// Left session.
        session_id: String,
    },
    /// Someone else in the session is typing. Not persisted.
    UserTyping {
        /// Session where typing is happening.
        session_id: String,
        /// Who is typing.
        user_id: String,
        /// Whether the typist is support staff.
        is_admin: bool,
    },
    /// Caller-only confirmation of `MarkRead`.
    MarkedRead {
        /// Session whose messages were flagged.
        session_id: String,
        /// Number of messages flipped to read.
        count: u64,
    },
}

impl ServerSignal {
    /// Build a caller-only error signal without diagnostic detail.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: None,
        }
    }

    /// Build a caller-only error signal with diagnostic detail.
    pub fn error_with_details(message: impl Into<String>, details: Value) -> Self {
        Self::Error {
            message: message.into(),
            details: Some(details),
        }
    }
}
