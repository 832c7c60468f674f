//! # TreeChat
//!
//! A branching conversation history: a tree of divergent dialogue branches
//! that share a common prefix up to the point where they fork.
//!
//! ## Features
//!
//! - **Tree Store**: branch and message records, per-branch ordered message
//!   lists, and fork-aware transcript reconstruction
//! - **Session Facade**: one live tree per session with fresh ids, generated
//!   fork titles and a version counter for change notification
//! - **Reply Streaming**: ordered, cancellable application of streamed
//!   assistant fragments
//! - **Controller Server**: JSON-RPC 2.0 over stdio exposing every session
//!   operation as a tool
//!
//! ## Architecture
//!
//! ```text
//! Controller (stdio JSON-RPC) → TreeSession → TreeState
//!                                    ↑
//!                     stream_reply (fragment source)
//! ```
//!
//! ## Example
//!
//! ```
//! use treechat::config::SessionConfig;
//! use treechat::session::TreeSession;
//!
//! let mut session = TreeSession::new(&SessionConfig::default());
//! let hi = session.send_user("hi").unwrap();
//! session.append_assistant("hello").unwrap();
//!
//! session.fork(&hi.id).unwrap();
//! session.append_assistant("yo").unwrap();
//!
//! let contents: Vec<String> = session.transcript().into_iter().map(|m| m.content).collect();
//! assert_eq!(contents, vec!["hi", "yo"]);
//! ```

#![warn(missing_docs)]

/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Controller server and request handling.
pub mod server;
/// Session facade over a single conversation tree.
pub mod session;
/// Streaming assistant replies into the tree.
pub mod stream;
/// Branch tree data model and store.
pub mod tree;

pub use config::Config;
pub use error::{AppError, TreeError, TreeResult};
pub use server::{AppState, McpServer, SharedState};
pub use session::{SharedSession, TreeSession};
pub use tree::{BranchNode, ChatMessage, Message, NewMessage, Role, TreeState};
