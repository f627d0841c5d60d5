//! `ChatServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use ecochat_core::identity::Identity;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::gateway::ChatGateway;
use crate::ws::run_ws_session;

/// Resolves the caller identity from the upgrade request.
///
/// Authentication lives upstream (reverse proxy, API gateway); this trait is
/// the seam where its verdict enters the chat server. Returning `None`
/// rejects the upgrade with `401`.
pub trait IdentityResolver: Send + Sync {
    /// Resolve an identity from request headers, or reject.
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Resolves identity from `x-user-id` and `x-role` headers, the contract an
/// authenticating reverse proxy fills in.
pub struct HeaderIdentityResolver;

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let user_id = headers.get("x-user-id")?.to_str().ok()?.trim();
        if user_id.is_empty() {
            return None;
        }
        match headers.get("x-role").map(|v| v.to_str().ok()) {
            None => Some(Identity::customer(user_id)),
            Some(Some("customer")) => Some(Identity::customer(user_id)),
            Some(Some("admin")) => Some(Identity::admin(user_id)),
            Some(_) => None,
        }
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The chat gateway.
    pub gateway: Arc<ChatGateway>,
    /// Identity resolver for the upgrade request.
    pub resolver: Arc<dyn IdentityResolver>,
    /// Server configuration.
    pub config: ServerConfig,
    /// Cancelled when the server shuts down; live sessions close on it.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
}

/// The chat server.
pub struct ChatServer {
    config: ServerConfig,
    gateway: Arc<ChatGateway>,
    resolver: Arc<dyn IdentityResolver>,
    shutdown: CancellationToken,
    start_time: Instant,
}

impl ChatServer {
    /// Create a new server with header-based identity resolution.
    pub fn new(config: ServerConfig, gateway: Arc<ChatGateway>) -> Self {
        Self {
            config,
            gateway,
            resolver: Arc::new(HeaderIdentityResolver),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Swap in a different identity resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            gateway: self.gateway.clone(),
            resolver: self.resolver.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
    }

    /// Bind and serve until [`ChatServer::shutdown_token`] is cancelled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// Live WebSocket sessions observe the same token and close, so the
    /// graceful drain completes promptly.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind(format!("{}:{}", self.config.host, self.config.port))
                .await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
        });
        info!(%addr, "chat server listening");
        Ok((addr, handle))
    }

    /// Token cancelled to shut the server down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the gateway.
    pub fn gateway(&self) -> &Arc<ChatGateway> {
        &self.gateway
    }
}

/// Health check payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server responds.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently registered WebSocket connections.
    pub connections: usize,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.gateway.registry().connection_count(),
    })
}

/// GET /ws — WebSocket upgrade, rejected with 401 when identity resolution
/// fails.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(identity) = state.resolver.resolve(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let gateway = state.gateway.clone();
    let config = state.config.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| run_ws_session(socket, identity, gateway, config, shutdown))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ecochat_store::SqliteSessionStore;
    use tower::ServiceExt;

    use crate::groups::GroupRegistry;

    fn make_server() -> ChatServer {
        let store = Arc::new(SqliteSessionStore::in_memory().unwrap());
        let gateway = Arc::new(ChatGateway::new(store, Arc::new(GroupRegistry::new())));
        ChatServer::new(ServerConfig::default(), gateway)
    }

    #[test]
    fn header_resolver_reads_user_and_role() {
        let resolver = HeaderIdentityResolver;
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-user-id", "u1".parse().unwrap());
        assert_eq!(resolver.resolve(&headers), Some(Identity::customer("u1")));

        let _ = headers.insert("x-role", "admin".parse().unwrap());
        assert_eq!(resolver.resolve(&headers), Some(Identity::admin("u1")));
    }

    #[test]
    fn header_resolver_rejects_missing_or_bogus() {
        let resolver = HeaderIdentityResolver;
        assert_eq!(resolver.resolve(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-user-id", "  ".parse().unwrap());
        assert_eq!(resolver.resolve(&headers), None);

        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-user-id", "u1".parse().unwrap());
        let _ = headers.insert("x-role", "superuser".parse().unwrap());
        assert_eq!(resolver.resolve(&headers), None);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn ws_without_identity_is_unauthorized() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/ws")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_auto_port_and_shuts_down() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown_token().cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .expect("join error");
    }
}
