//! # ecochat-client
//!
//! Client wrapper for the ecochat gateway: one persistent WebSocket with
//! jittered-exponential reconnection, typed command methods, and a channel
//! of parsed [`ecochat_core::wire::ServerSignal`]s.

pub mod backoff;
pub mod client;
pub mod errors;

pub use backoff::Backoff;
pub use client::{ChatClient, ClientConfig, ClientEvent};
pub use errors::{ClientError, Result};
