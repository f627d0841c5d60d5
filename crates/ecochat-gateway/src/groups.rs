//! Group membership and signal fan-out.
//!
//! The registry owns the connection-id → groups mapping explicitly, so
//! membership can be inspected and torn down deterministically when a
//! connection drops. Signals are serialized once per broadcast and the
//! resulting `Arc<String>` is cloned per recipient.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ecochat_core::wire::ServerSignal;
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::connection::ClientConnection;

#[derive(Default)]
struct Inner {
    /// Connected clients indexed by connection ID.
    connections: HashMap<String, Arc<ClientConnection>>,
    /// Group name → member connection IDs.
    groups: HashMap<String, HashSet<String>>,
    /// Connection ID → groups it joined (reverse index for teardown).
    joined: HashMap<String, HashSet<String>>,
}

/// Manages group membership and signal broadcasting to connected clients.
pub struct GroupRegistry {
    inner: RwLock<Inner>,
    connection_count: AtomicUsize,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            connection_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut inner = self.inner.write().await;
        let _ = inner.connections.insert(connection.id.clone(), connection);
        self.connection_count
            .store(inner.connections.len(), Ordering::Relaxed);
    }

    /// Remove a connection and all its group memberships.
    pub async fn remove(&self, connection_id: &str) {
        let mut inner = self.inner.write().await;
        let _ = inner.connections.remove(connection_id);
        if let Some(groups) = inner.joined.remove(connection_id) {
            for group in groups {
                if let Some(members) = inner.groups.get_mut(&group) {
                    let _ = members.remove(connection_id);
                    if members.is_empty() {
                        let _ = inner.groups.remove(&group);
                    }
                }
            }
        }
        self.connection_count
            .store(inner.connections.len(), Ordering::Relaxed);
    }

    /// Add a connection to a group. Idempotent; unknown connections are
    /// ignored.
    pub async fn join(&self, connection_id: &str, group: &str) {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(connection_id) {
            return;
        }
        let _ = inner
            .groups
            .entry(group.to_owned())
            .or_default()
            .insert(connection_id.to_owned());
        let _ = inner
            .joined
            .entry(connection_id.to_owned())
            .or_default()
            .insert(group.to_owned());
        debug!(connection_id, group, "joined group");
    }

    /// Remove a connection from a group. Idempotent.
    pub async fn leave(&self, connection_id: &str, group: &str) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.groups.get_mut(group) {
            let _ = members.remove(connection_id);
            if members.is_empty() {
                let _ = inner.groups.remove(group);
            }
        }
        if let Some(groups) = inner.joined.get_mut(connection_id) {
            let _ = groups.remove(group);
        }
        debug!(connection_id, group, "left group");
    }

    /// Broadcast a signal to every member of a group.
    pub async fn broadcast(&self, group: &str, signal: &ServerSignal) {
        self.fan_out(group, None, signal).await;
    }

    /// Broadcast a signal to a group, skipping one connection.
    pub async fn broadcast_except(&self, group: &str, except: &str, signal: &ServerSignal) {
        self.fan_out(group, Some(except), signal).await;
    }

    async fn fan_out(&self, group: &str, except: Option<&str>, signal: &ServerSignal) {
        let json = match serde_json::to_string(signal) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(group, error = %e, "failed to serialize signal");
                return;
            }
        };
        let inner = self.inner.read().await;
        let Some(members) = inner.groups.get(group) else {
            debug!(group, "broadcast to empty group");
            return;
        };
        let mut recipients = 0usize;
        for id in members {
            if except == Some(id.as_str()) {
                continue;
            }
            let Some(conn) = inner.connections.get(id) else {
                continue;
            };
            if conn.send(json.clone()) {
                recipients += 1;
            } else {
                counter!("chat_signals_dropped_total").increment(1);
                warn!(connection_id = %conn.id, group, "failed to send signal to client");
            }
        }
        debug!(group, recipients, "broadcast signal");
    }

    /// Send a signal to a single connection.
    pub async fn send_to(&self, connection_id: &str, signal: &ServerSignal) -> bool {
        let inner = self.inner.read().await;
        match inner.connections.get(connection_id) {
            Some(conn) => conn.send_signal(signal),
            None => false,
        }
    }

    /// Number of registered connections. Lock-free snapshot.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Number of members in a group.
    pub async fn group_size(&self, group: &str) -> usize {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map_or(0, HashSet::len)
    }

    /// Groups a connection currently belongs to.
    pub async fn groups_of(&self, connection_id: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .joined
            .get(connection_id)
            .map(|g| {
                let mut v: Vec<String> = g.iter().cloned().collect();
                v.sort();
                v
            })
            .unwrap_or_default()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
