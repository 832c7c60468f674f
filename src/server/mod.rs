//! Server module for the conversation controller protocol.
//!
//! This module provides:
//! - MCP-style JSON-RPC 2.0 server over stdio
//! - Tool call handlers mapping onto the session facade
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::session::{SharedSession, TreeSession};

/// Application state shared across handlers.
///
/// Holds the one conversation session this process drives. Every tool call
/// takes the session lock for its whole duration, so operations never
/// interleave.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The live conversation session.
    pub session: SharedSession,
}

impl AppState {
    /// Create new application state with a fresh session
    pub fn new(config: Config) -> Self {
        let session = TreeSession::new(&config.session).into_shared();
        Self { config, session }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
