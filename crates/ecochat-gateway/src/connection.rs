//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ecochat_core::identity::Identity;
use ecochat_core::wire::ServerSignal;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Messages dropped on a full send channel before the connection is
/// considered too slow to keep.
pub const MAX_DROPPED_MESSAGES: u64 = 256;

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID (`conn_<uuidv7>`).
    pub id: String,
    /// Authenticated caller identity.
    pub identity: Identity,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, identity: Identity, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// The caller's user ID.
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// Whether the caller connected as support staff.
    pub fn is_admin(&self) -> bool {
        self.identity.is_admin
    }

    /// Send pre-serialized text to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a signal and send it to this client only.
    pub fn send_signal(&self, signal: &ServerSignal) -> bool {
        match serde_json::to_string(signal) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the client has fallen too far behind to keep.
    pub fn is_saturated(&self) -> bool {
        self.drop_count() >= MAX_DROPPED_MESSAGES
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
