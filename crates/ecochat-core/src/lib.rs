//! # ecochat-core
//!
//! Shared foundation for the EcoChat realtime messaging core:
//!
//! - Wire contract: client commands and server signals (`wire`)
//! - Deterministic group naming (`groups`)
//! - Caller identity resolved by the transport layer (`identity`)
//! - UTF-8–safe message previews (`text`)
//! - Session ID generation (`ids`)

#![deny(unsafe_code)]

pub mod groups;
pub mod identity;
pub mod ids;
pub mod text;
pub mod wire;
