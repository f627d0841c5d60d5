//! Chat operations over the group registry and session store.
//!
//! The gateway holds no per-session state of its own. Customer operations
//! re-resolve the active session through the store on every call, so a
//! session closed between two calls is transparently replaced and the
//! connection re-joined to the new group.

use std::sync::Arc;

use ecochat_core::groups::{ADMINS_GROUP, session_group};
use ecochat_core::identity::Identity;
use ecochat_core::ids::new_connection_id;
use ecochat_core::text::message_preview;
use ecochat_core::wire::{ClientCommand, MessagePayload, ServerSignal};
use ecochat_store::SessionStore;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::ClientConnection;
use crate::errors::{GatewayError, Result};
use crate::groups::GroupRegistry;

/// The chat gateway. Cheap to clone via `Arc`.
pub struct ChatGateway {
    store: Arc<dyn SessionStore>,
    registry: Arc<GroupRegistry>,
}

impl ChatGateway {
    /// Create a gateway over a store and a group registry.
    pub fn new(store: Arc<dyn SessionStore>, registry: Arc<GroupRegistry>) -> Self {
        Self { store, registry }
    }

    /// The underlying group registry.
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Register a new connection and place it in its initial groups.
    ///
    /// Customers are joined to their own session group (creating the session
    /// if needed). Admins are joined to the `admins` group and to every
    /// active session group.
    pub async fn connect(
        self: &Arc<Self>,
        identity: Identity,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Result<ClientHandle> {
        let conn = Arc::new(ClientConnection::new(
            new_connection_id(),
            identity.clone(),
            tx,
        ));
        self.registry.add(conn.clone()).await;

        let setup = if identity.is_admin {
            self.setup_admin(&conn).await
        } else {
            self.setup_customer(&conn).await
        };
        if let Err(e) = setup {
            self.registry.remove(&conn.id).await;
            return Err(e);
        }

        counter!("chat_connections_total", "role" => role_label(identity.is_admin)).increment(1);
        gauge!("chat_connections_active").increment(1.0);
        info!(
            connection_id = %conn.id,
            user_id = %identity.user_id,
            is_admin = identity.is_admin,
            "client connected"
        );

        Ok(if identity.is_admin {
            ClientHandle::Admin(AdminHandle {
                gateway: Arc::clone(self),
                conn,
            })
        } else {
            ClientHandle::Customer(CustomerHandle {
                gateway: Arc::clone(self),
                conn,
            })
        })
    }

    async fn setup_customer(&self, conn: &Arc<ClientConnection>) -> Result<()> {
        let session = self.store.get_or_create_session(conn.user_id()).await?;
        self.registry
            .join(&conn.id, &session_group(&session.id))
            .await;
        Ok(())
    }

    async fn setup_admin(&self, conn: &Arc<ClientConnection>) -> Result<()> {
        self.registry.join(&conn.id, ADMINS_GROUP).await;
        for session in self.store.list_sessions(false).await? {
            self.registry
                .join(&conn.id, &session_group(&session.id))
                .await;
        }
        Ok(())
    }

    /// Tear down a connection and all its memberships.
    pub async fn disconnect(&self, connection_id: &str) {
        self.registry.remove(connection_id).await;
        gauge!("chat_connections_active").decrement(1.0);
        info!(connection_id, "client disconnected");
    }

    /// Customer send into their own active session.
    async fn send_message(&self, conn: &ClientConnection, text: &str) -> Result<()> {
        let session = self.store.get_or_create_session(conn.user_id()).await?;
        let group = session_group(&session.id);
        // Re-join covers session rotation after an out-of-band close.
        self.registry.join(&conn.id, &group).await;

        let stored = self
            .store
            .append_message(&session.id, conn.user_id(), text, false)
            .await?;
        counter!("chat_messages_total", "role" => "customer").increment(1);

        let payload: MessagePayload = stored.message.into();
        self.registry
            .broadcast(&group, &ServerSignal::ReceiveMessage(payload))
            .await;

        if stored.was_first {
            counter!("chat_sessions_surfaced_total").increment(1);
            self.registry
                .broadcast(
                    ADMINS_GROUP,
                    &ServerSignal::NewSession {
                        session_id: session.id.clone(),
                        user_id: session.user_id.clone(),
                        created_at: session.created_at.clone(),
                    },
                )
                .await;
        }
        self.registry
            .broadcast(
                ADMINS_GROUP,
                &ServerSignal::NewMessageNotification {
                    session_id: session.id,
                    user_id: session.user_id,
                    message_preview: message_preview(text),
                },
            )
            .await;
        Ok(())
    }

    /// Admin send into an explicit session.
    async fn send_to_session(
        &self,
        conn: &ClientConnection,
        session_id: &str,
        text: &str,
    ) -> Result<()> {
        let stored = self
            .store
            .append_message(session_id, conn.user_id(), text, true)
            .await?;
        counter!("chat_messages_total", "role" => "admin").increment(1);

        let payload: MessagePayload = stored.message.into();
        self.registry
            .broadcast(
                &session_group(session_id),
                &ServerSignal::ReceiveMessage(payload),
            )
            .await;
        Ok(())
    }

    /// Admin subscribe to a session group.
    async fn join_session(&self, conn: &ClientConnection, session_id: &str) -> ServerSignal {
        self.registry
            .join(&conn.id, &session_group(session_id))
            .await;
        ServerSignal::JoinedSession {
            session_id: session_id.to_owned(),
        }
    }

    /// Admin unsubscribe from a session group.
    async fn leave_session(&self, conn: &ClientConnection, session_id: &str) -> ServerSignal {
        self.registry
            .leave(&conn.id, &session_group(session_id))
            .await;
        ServerSignal::LeftSession {
            session_id: session_id.to_owned(),
        }
    }

    /// Ephemeral typing indicator, fanned out to everyone else in the
    /// session group. Never persisted.
    async fn typing(&self, conn: &ClientConnection, session_id: Option<&str>) -> Result<()> {
        let session_id = match session_id {
            Some(id) => id.to_owned(),
            None => {
                self.store
                    .get_or_create_session(conn.user_id())
                    .await?
                    .id
            }
        };
        let group = session_group(&session_id);
        if !conn.is_admin() {
            self.registry.join(&conn.id, &group).await;
        }
        self.registry
            .broadcast_except(
                &group,
                &conn.id,
                &ServerSignal::UserTyping {
                    session_id,
                    user_id: conn.user_id().to_owned(),
                    is_admin: conn.is_admin(),
                },
            )
            .await;
        Ok(())
    }

    /// Flag the counterparty's messages as read.
    async fn mark_read(
        &self,
        conn: &ClientConnection,
        session_id: Option<&str>,
    ) -> Result<ServerSignal> {
        let session_id = match session_id {
            Some(id) => id.to_owned(),
            None => {
                self.store
                    .get_or_create_session(conn.user_id())
                    .await?
                    .id
            }
        };
        let count = self.store.mark_read(&session_id, conn.is_admin()).await?;
        Ok(ServerSignal::MarkedRead { session_id, count })
    }
}

fn role_label(is_admin: bool) -> &'static str {
    if is_admin { "admin" } else { "customer" }
}

/// A connected customer. Operations are scoped to the customer's own
/// active session.
pub struct CustomerHandle {
    gateway: Arc<ChatGateway>,
    conn: Arc<ClientConnection>,
}

/// A connected admin. Operations target explicit sessions.
pub struct AdminHandle {
    gateway: Arc<ChatGateway>,
    conn: Arc<ClientConnection>,
}

/// Role-typed view of a connection, produced by [`ChatGateway::connect`].
pub enum ClientHandle {
    /// Customer-side operations.
    Customer(CustomerHandle),
    /// Admin-side operations.
    Admin(AdminHandle),
}

impl ClientHandle {
    /// The underlying connection.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        match self {
            Self::Customer(h) => &h.conn,
            Self::Admin(h) => &h.conn,
        }
    }

    fn gateway(&self) -> &Arc<ChatGateway> {
        match self {
            Self::Customer(h) => &h.gateway,
            Self::Admin(h) => &h.gateway,
        }
    }

    /// Dispatch a parsed command, returning the caller-only response signal
    /// (if any). Broadcast side effects happen inside the gateway.
    ///
    /// Commands for the wrong role are rejected with a caller-only error.
    /// Typing *delivery* failures are logged and swallowed: the indicator is
    /// best-effort and a stale one is harmless. An admin `Typing` with no
    /// session id is a malformed request, not a delivery failure — there is
    /// no target to even attempt — so it is rejected like any other bad
    /// command.
    pub async fn handle_command(&self, cmd: ClientCommand) -> Option<ServerSignal> {
        let gateway = self.gateway();
        let conn = self.connection();
        let result: Result<Option<ServerSignal>> = match (self, cmd) {
            (Self::Customer(_), ClientCommand::SendMessage { text }) => {
                gateway.send_message(conn, &text).await.map(|()| None)
            }
            (Self::Admin(_), ClientCommand::SendMessage { .. }) => {
                Err(GatewayError::NotPermitted("SendMessage"))
            }

            (Self::Admin(_), ClientCommand::SendMessageToSession { session_id, text }) => gateway
                .send_to_session(conn, &session_id, &text)
                .await
                .map(|()| None),
            (Self::Customer(_), ClientCommand::SendMessageToSession { .. }) => {
                Err(GatewayError::NotPermitted("SendMessageToSession"))
            }

            (Self::Admin(_), ClientCommand::JoinSession { session_id }) => {
                Ok(Some(gateway.join_session(conn, &session_id).await))
            }
            (Self::Customer(_), ClientCommand::JoinSession { .. }) => {
                Err(GatewayError::NotPermitted("JoinSession"))
            }

            (Self::Admin(_), ClientCommand::LeaveSession { session_id }) => {
                Ok(Some(gateway.leave_session(conn, &session_id).await))
            }
            (Self::Customer(_), ClientCommand::LeaveSession { .. }) => {
                Err(GatewayError::NotPermitted("LeaveSession"))
            }

            (Self::Admin(_), ClientCommand::Typing { session_id: None }) => {
                Err(GatewayError::MissingSession("Typing"))
            }
            (_, ClientCommand::Typing { session_id }) => {
                // Customers always type into their own session.
                let target = if conn.is_admin() {
                    session_id
                } else {
                    None
                };
                if let Err(e) = gateway.typing(conn, target.as_deref()).await {
                    debug!(connection_id = %conn.id, error = %e, "typing indicator dropped");
                }
                Ok(None)
            }

            (Self::Admin(_), ClientCommand::MarkRead { session_id: None }) => {
                Err(GatewayError::MissingSession("MarkRead"))
            }
            (_, ClientCommand::MarkRead { session_id }) => {
                let target = if conn.is_admin() {
                    session_id
                } else {
                    None
                };
                gateway.mark_read(conn, target.as_deref()).await.map(Some)
            }
        };

        match result {
            Ok(signal) => signal,
            Err(e) => {
                warn!(connection_id = %conn.id, error = %e, code = e.code(), "command failed");
                counter!("chat_command_errors_total", "code" => e.code()).increment(1);
                Some(e.to_signal())
            }
        }
    }
}
