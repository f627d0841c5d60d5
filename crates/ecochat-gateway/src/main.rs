//! # ecochat-server
//!
//! Chat server binary — wires the store and gateway together and starts the
//! HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ecochat_gateway::config::ServerConfig;
use ecochat_gateway::gateway::ChatGateway;
use ecochat_gateway::groups::GroupRegistry;
use ecochat_gateway::server::ChatServer;
use ecochat_store::sqlite::ConnectionConfig;
use ecochat_store::SqliteSessionStore;
use tracing_subscriber::EnvFilter;

/// Customer support chat server.
#[derive(Parser, Debug)]
#[command(name = "ecochat-server", about = "Customer support chat server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8460")]
    port: u16,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Heartbeat interval in seconds.
    #[arg(long, default_value = "30")]
    heartbeat_interval_secs: u64,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".ecochat").join("chat.db")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let db_path = args.db_path.unwrap_or_else(Cli::default_db_path);
    ensure_parent_dir(&db_path)?;
    let store = SqliteSessionStore::open(&db_path.to_string_lossy(), &ConnectionConfig::default())
        .context("Failed to open database")?;
    tracing::info!(path = %db_path.display(), "database ready");

    let gateway = Arc::new(ChatGateway::new(
        Arc::new(store),
        Arc::new(GroupRegistry::new()),
    ));

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        heartbeat_interval_secs: args.heartbeat_interval_secs,
        ..ServerConfig::default()
    };
    let server = ChatServer::new(config, gateway);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("ecochat listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");
    server.shutdown_token().cancel();
    let _ = handle.await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["ecochat-server"]);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 8460);
        assert_eq!(cli.db_path, None);
        assert_eq!(cli.heartbeat_interval_secs, 30);
    }

    #[test]
    fn cli_custom_values() {
        let cli = Cli::parse_from([
            "ecochat-server",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--db-path",
            "/tmp/chat.db",
        ]);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/chat.db")));
    }

    #[test]
    fn default_db_path_under_ecochat_dir() {
        let path = Cli::default_db_path();
        assert!(path.to_string_lossy().contains(".ecochat"));
        assert!(path.to_string_lossy().ends_with("chat.db"));
    }

    #[test]
    fn ensure_parent_dir_creates_nested() {
        let dir = std::env::temp_dir().join("ecochat-test-nested");
        let path = dir.join("a").join("b").join("chat.db");
        ensure_parent_dir(&path).unwrap();
        assert!(path.parent().unwrap().exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
