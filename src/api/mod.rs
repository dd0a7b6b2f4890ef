//! API module
//!
//! This module provides the HTTP surface for todochat: the axum server with
//! the JSON API and the HTML UI, and the client the CLI uses to drive it.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError};
pub use server::{router, serve, ChatReply, ServerConfig};
