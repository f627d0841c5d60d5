//! # ecochat-store
//!
//! Durable storage for chat sessions and messages:
//!
//! - [`SessionStore`]: the contract the gateway consumes — atomic
//!   get-or-create, append with first-message detection, history fetch,
//!   read flags
//! - [`sqlite`]: `rusqlite` implementation over an `r2d2` pool with
//!   version-tracked migrations
//!
//! The store is the single source of truth for conversation state. Its
//! concurrency control (immediate transactions plus a partial unique index
//! on active sessions) is what makes the gateway safe to call from many
//! connections at once.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
mod store;
mod types;

pub use errors::{Result, StoreError};
pub use sqlite::SqliteSessionStore;
pub use store::SessionStore;
pub use types::{ChatMessage, ChatSession, StoredMessage};
