//! Session and connection ID generation.
//!
//! IDs are UUID v7 (time-ordered) strings with an entity prefix, so logs and
//! databases sort them chronologically for free.

use uuid::Uuid;

/// Generate a new chat session ID (`chat_<uuidv7>`).
pub fn new_session_id() -> String {
    format!("chat_{}", Uuid::now_v7())
}

/// Generate a new connection ID (`conn_<uuidv7>`).
pub fn new_connection_id() -> String {
    format!("conn_{}", Uuid::now_v7())
}
