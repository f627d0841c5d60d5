//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use ecochat_core::identity::Identity;
use ecochat_core::wire::{ClientCommand, ServerSignal};
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::gateway::ChatGateway;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the gateway (joining initial groups)
/// 2. Dispatches incoming text frames as chat commands
/// 3. Forwards outbound signals via the send channel
/// 4. Sends periodic Ping frames and disconnects unresponsive clients
/// 5. Closes on server shutdown and cleans up group memberships
#[instrument(skip_all, fields(user_id = %identity.user_id, is_admin = identity.is_admin))]
pub async fn run_ws_session(
    ws: WebSocket,
    identity: Identity,
    gateway: Arc<ChatGateway>,
    config: ServerConfig,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_buffer);
    let handle = match gateway.connect(identity, send_tx).await {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "connection setup failed");
            let signal = e.to_signal();
            if let Ok(text) = serde_json::to_string(&signal) {
                let _ = ws_tx.send(Message::Text(text.into())).await;
            }
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let connection = handle.connection().clone();
    let connection_start = std::time::Instant::now();

    // Spawn outbound forwarder with periodic Ping frames.
    let ping_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
    let outbound_conn = connection.clone();
    let outbound_shutdown = shutdown.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = outbound_shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if outbound_conn.is_saturated() {
                        warn!(dropped = outbound_conn.drop_count(), "client too slow, disconnecting");
                        break;
                    }
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Process incoming frames.
    loop {
        let msg = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(m)) => m,
                _ => break,
            },
        };
        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };
        connection.mark_alive();

        let command: ClientCommand = match serde_json::from_str(&text) {
            Ok(cmd) => cmd,
            Err(e) => {
                counter!("chat_command_errors_total", "code" => "BAD_REQUEST").increment(1);
                debug!(error = %e, "unparseable command");
                let signal = ServerSignal::error_with_details(
                    "unparseable command",
                    json!({ "code": "BAD_REQUEST" }),
                );
                let _ = connection.send_signal(&signal);
                continue;
            }
        };

        if let Some(signal) = handle.handle_command(command).await {
            if !connection.send_signal(&signal) {
                debug!("failed to enqueue response (channel full or closed)");
            }
        }
    }

    info!("session ended");
    histogram!("chat_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    outbound.abort();
    gateway.disconnect(&connection.id).await;
}
