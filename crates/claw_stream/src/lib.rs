//! claw_stream - subprocess transport for the Claude Code CLI
//!
//! This crate runs the `claude` CLI for a single prompt and turns its
//! stream-json output into typed [`Message`](messages::Message)s.
//!
//! # Overview
//!
//! - One CLI process per query, configured through [`QueryOptions`](options::QueryOptions)
//! - Newline-delimited JSON on stdout, parsed leniently: noise lines are skipped and
//!   malformed messages become diagnostic user messages instead of ending the stream
//! - Bounded buffering for oversized lines and stderr
//! - Cooperative cancellation through [`tokio_util::sync::CancellationToken`]
//! - Graceful shutdown: SIGINT first, SIGKILL after a grace period
//!
//! # Architecture
//!
//! - `parser`: JSON value to [`Message`](messages::Message)
//! - `transport`: process lifecycle and stdout/stderr plumbing
//! - `query`: the one-call facade returning a [`QueryStream`](query::QueryStream)
//! - `options`: per-query configuration and CLI argument construction
//! - `error`: the [`ClawError`](error::ClawError) hierarchy
//!
//! The crate only emits `tracing` events; install a subscriber to see them.
//!
//! # Example
//!
//! ```rust,no_run
//! use claw_stream::prelude::*;
//! use tokio_stream::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClawError> {
//!     let options = QueryOptions::builder()
//!         .allowed_tools(vec!["Read".into(), "Edit".into(), "Bash".into()])
//!         .permission_mode(PermissionMode::AcceptEdits)
//!         .build();
//!
//!     let mut stream = query("Find and fix the bug in auth.py", &options, CancellationToken::new()).await?;
//!
//!     while let Some(message) = stream.next().await {
//!         match message {
//!             Message::Assistant(msg) => {
//!                 for block in msg.content {
//!                     if let ContentBlock::Text { text } = block {
//!                         println!("{}", text);
//!                     }
//!                 }
//!             }
//!             Message::Result(result) => {
//!                 println!("Done in {} turns", result.num_turns);
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # License
//!
//! Licensed under MIT. See LICENSE file for details.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CLI process transport
///
/// This module provides the `Transport` trait and `SubprocessCLITransport`, which
/// spawns the `claude` CLI, frames its stdout into messages and tears it down.
pub mod transport;

/// Error types and utilities
///
/// This module defines the `ClawError` enum:
///
/// - `CliNotFound` - Claude Code CLI binary not found or not startable
/// - `Connection` - Working directory or pipe setup failures
/// - `Process` - CLI launch failures and non-zero exits
/// - `JsonDecode` - stdout lines that are not JSON
/// - `MessageParse` - JSON that does not match a protocol message
/// - `Io` - Other I/O failures (auto-converts from `std::io::Error`)
pub mod error;

/// Message types and structures
///
/// The primary `Message` enum represents all messages from the CLI:
///
/// - `System` - System lifecycle events (init)
/// - `Assistant` - Assistant responses with content blocks
/// - `User` - User text, tool results and transport diagnostics
/// - `Result` - Final result with timing, cost and session
pub mod messages;

/// Protocol parser for raw JSON messages
pub mod parser;

/// Simple query API for one-shot Claude interactions
pub mod query;

/// Configuration options and builder
///
/// This module provides `QueryOptions` for configuring a query, including model
/// selection, tool permissions, MCP servers and the process environment.
pub mod options;

// Public API re-exports
pub use query::query;

// Prelude module for common imports
pub mod prelude {
    //! Common imports for claw_stream users
    //!
    //! Use `use claw_stream::prelude::*;` to import commonly used types.

    pub use crate::error::{ClawError, ParseErrorKind};
    pub use crate::messages::{
        AssistantMessage, ContentBlock, Message, MessageType, ResultMessage, SystemMessage,
        UserMessage,
    };
    pub use crate::options::{McpServerConfig, PermissionMode, QueryOptions};
    pub use crate::query::{query, QueryStream};
    pub use crate::transport::{CliDiscovery, StreamLimits, SubprocessCLITransport, Transport};
}
