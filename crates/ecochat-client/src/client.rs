//! The chat client: a persistent WebSocket connection with automatic
//! reconnection, a typed command surface, and an event stream of parsed
//! server signals.

use std::time::Duration;

use ecochat_core::identity::Identity;
use ecochat_core::wire::{ClientCommand, ServerSignal};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, DEFAULT_BASE, DEFAULT_CAP};
use crate::errors::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for [`ChatClient::connect`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Gateway WebSocket URL, e.g. `ws://localhost:8460/ws`.
    pub url: String,
    /// Caller identity, sent as headers on the upgrade request.
    pub identity: Identity,
    /// Base reconnect delay.
    pub backoff_base: Duration,
    /// Reconnect delay cap.
    pub backoff_cap: Duration,
    /// Event channel capacity.
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Config with default backoff for the given URL and identity.
    pub fn new(url: impl Into<String>, identity: Identity) -> Self {
        Self {
            url: url.into(),
            identity,
            backoff_base: DEFAULT_BASE,
            backoff_cap: DEFAULT_CAP,
            event_buffer: 256,
        }
    }
}

/// Connection lifecycle and traffic, as observed by the consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// The WebSocket is established (fires again after each reconnect).
    Connected,
    /// A parsed signal from the gateway.
    Signal(ServerSignal),
    /// The WebSocket dropped; the client is backing off to reconnect.
    Disconnected,
}

/// Handle to a running chat client.
///
/// Commands are queued and flushed in order once a connection is up, so
/// callers never observe the reconnect loop directly. Dropping the handle
/// (or calling [`ChatClient::close`]) stops the driver task.
pub struct ChatClient {
    cmd_tx: mpsc::Sender<ClientCommand>,
    shutdown: CancellationToken,
}

impl ChatClient {
    /// Start the client and return it with its event stream.
    ///
    /// The connection is established in the background; commands sent before
    /// it is up are queued.
    pub fn connect(config: ClientConfig) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        // Validate the request shape up front so a bad URL fails fast.
        let _ = build_request(&config)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let shutdown = CancellationToken::new();

        drop(tokio::spawn(run_driver(
            config,
            cmd_rx,
            event_tx,
            shutdown.clone(),
        )));

        Ok((
            Self { cmd_tx, shutdown },
            event_rx,
        ))
    }

    /// Send a message into the caller's own session (customers).
    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::SendMessage { text: text.into() }).await
    }

    /// Send a message into an explicit session (admins).
    pub async fn send_to_session(
        &self,
        session_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<()> {
        self.send(ClientCommand::SendMessageToSession {
            session_id: session_id.into(),
            text: text.into(),
        })
        .await
    }

    /// Join a session's broadcast group (admins).
    pub async fn join_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::JoinSession {
            session_id: session_id.into(),
        })
        .await
    }

    /// Leave a session's broadcast group (admins).
    pub async fn leave_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::LeaveSession {
            session_id: session_id.into(),
        })
        .await
    }

    /// Emit a typing indicator. Admins pass the target session.
    pub async fn typing(&self, session_id: Option<String>) -> Result<()> {
        self.send(ClientCommand::Typing { session_id }).await
    }

    /// Mark the counterparty's messages as read. Admins pass the target
    /// session.
    pub async fn mark_read(&self, session_id: Option<String>) -> Result<()> {
        self.send(ClientCommand::MarkRead { session_id }).await
    }

    async fn send(&self, cmd: ClientCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Closed)
    }

    /// Stop the driver task and close the connection.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn build_request(config: &ClientConfig) -> Result<Request> {
    let mut req = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
    let user_id = config
        .identity
        .user_id
        .parse()
        .map_err(|_| ClientError::InvalidRequest("user id is not a valid header".into()))?;
    let _ = req.headers_mut().insert("x-user-id", user_id);
    let role = if config.identity.is_admin {
        "admin"
    } else {
        "customer"
    };
    let role = role
        .parse()
        .map_err(|_| ClientError::InvalidRequest("role is not a valid header".into()))?;
    let _ = req.headers_mut().insert("x-role", role);
    Ok(req)
}

async fn run_driver(
    config: ClientConfig,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    event_tx: mpsc::Sender<ClientEvent>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_cap);

    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let request = match build_request(&config) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "cannot build upgrade request, stopping");
                return;
            }
        };

        let connect = tokio::select! {
            () = shutdown.cancelled() => return,
            res = connect_async(request) => res,
        };
        match connect {
            Ok((ws, _)) => {
                info!(url = %config.url, "connected");
                backoff.reset();
                if event_tx.send(ClientEvent::Connected).await.is_err() {
                    return;
                }
                run_connection(ws, &mut cmd_rx, &event_tx, &shutdown).await;
                if shutdown.is_cancelled() {
                    return;
                }
                if event_tx.send(ClientEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(url = %config.url, error = %e, "connect failed");
            }
        }

        let delay = backoff.next_delay();
        debug!(attempt = backoff.attempt(), ?delay, "reconnecting after backoff");
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump one established connection until it drops or the client shuts down.
async fn run_connection(
    mut ws: WsStream,
    cmd_rx: &mut mpsc::Receiver<ClientCommand>,
    event_tx: &mpsc::Sender<ClientEvent>,
    shutdown: &CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { return };
                let json = match serde_json::to_string(&cmd) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize command");
                        continue;
                    }
                };
                if ws.send(Message::Text(json.into())).await.is_err() {
                    return;
                }
            }
            frame = ws.next() => {
                let Some(Ok(msg)) = frame else { return };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ServerSignal>(&text) {
                        Ok(signal) => {
                            if event_tx.send(ClientEvent::Signal(signal)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "unparseable signal"),
                    },
                    Message::Ping(payload) => {
                        if ws.send(Message::Pong(payload)).await.is_err() {
                            return;
                        }
                    }
                    Message::Close(_) => return,
                    Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_identity_headers() {
        let config = ClientConfig::new("ws://localhost:1/ws", Identity::admin("a1"));
        let req = build_request(&config).unwrap();
        assert_eq!(req.headers().get("x-user-id").unwrap(), "a1");
        assert_eq!(req.headers().get("x-role").unwrap(), "admin");
    }

    #[test]
    fn customer_role_header() {
        let config = ClientConfig::new("ws://localhost:1/ws", Identity::customer("u1"));
        let req = build_request(&config).unwrap();
        assert_eq!(req.headers().get("x-role").unwrap(), "customer");
    }

    #[test]
    fn bad_url_is_rejected_up_front() {
        let config = ClientConfig::new("not a url", Identity::customer("u1"));
        assert!(matches!(
            build_request(&config),
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[test]
    fn non_ascii_user_id_is_rejected() {
        let config = ClientConfig::new("ws://localhost:1/ws", Identity::customer("üser\n"));
        assert!(matches!(
            build_request(&config),
            Err(ClientError::InvalidRequest(_))
        ));
    }
}
