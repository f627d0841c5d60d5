//! # ecochat-gateway
//!
//! WebSocket gateway for customer↔support chat. Customers hold one
//! connection into their own session; admins follow the `admins` group and
//! join per-session groups on demand. All fan-out goes through the
//! [`groups::GroupRegistry`].

pub mod config;
pub mod connection;
pub mod errors;
pub mod gateway;
pub mod groups;
pub mod server;
pub mod ws;

pub use config::ServerConfig;
pub use connection::ClientConnection;
pub use errors::{GatewayError, Result};
pub use gateway::{AdminHandle, ChatGateway, ClientHandle, CustomerHandle};
pub use groups::GroupRegistry;
pub use server::{AppState, ChatServer, HeaderIdentityResolver, IdentityResolver};
