//! Transport abstraction over the Claude Code CLI process
//!
//! The transport layer handles:
//! - CLI discovery
//! - Process lifecycle management (spawning, signalling, reaping)
//! - NDJSON framing on stdout with a per-line size bound
//! - Bounded stderr capture for failure reports
//!
//! # Default Implementation
//!
//! [`SubprocessCLITransport`] spawns the `claude` CLI for one prompt and streams
//! its stdout as typed [`Message`]s.
//!
//! # Example
//!
//! ```no_run
//! use claw_stream::options::QueryOptions;
//! use claw_stream::transport::{SubprocessCLITransport, Transport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), claw_stream::error::ClawError> {
//! let mut transport = SubprocessCLITransport::new();
//! transport.connect(&QueryOptions::default(), "What is 2 + 2?").await?;
//!
//! let mut messages = transport.receive_messages(CancellationToken::new()).await?;
//! while let Some(message) = messages.recv().await {
//!     println!("{:?}", message);
//! }
//!
//! transport.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ClawError;
use crate::messages::Message;
use crate::options::QueryOptions;

mod discovery;
mod lines;
mod stderr;
mod subprocess;

pub use discovery::CliDiscovery;
pub use lines::{BoundedLineReader, LineRead};
pub use subprocess::SubprocessCLITransport;

/// Abstract transport for one Claude Code CLI session.
///
/// # Lifecycle
///
/// 1. **Connect** - [`connect()`](Transport::connect) starts the CLI for a prompt
/// 2. **Receive** - [`receive_messages()`](Transport::receive_messages) hands out the message stream, once
/// 3. **Disconnect** - [`disconnect()`](Transport::disconnect) tears the process down
///
/// In-stream failures (oversized lines, parse failures, a non-zero exit) arrive as
/// diagnostic user messages on the stream rather than as errors.
#[async_trait]
pub trait Transport: Send {
    /// Start the CLI for `prompt` configured by `options`.
    ///
    /// # Errors
    ///
    /// - [`ClawError::Connection`] if already connected, the working directory is
    ///   missing, or a pipe cannot be captured
    /// - [`ClawError::CliNotFound`] if the executable cannot be found or started
    /// - [`ClawError::Process`] if a non-`claude` executable fails to start
    async fn connect(&mut self, options: &QueryOptions, prompt: &str) -> Result<(), ClawError>;

    /// Begin streaming parsed messages from the CLI's stdout.
    ///
    /// The returned channel closes after the process has been reaped, or when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`ClawError::Connection`] if not connected or already streaming
    async fn receive_messages(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Message>, ClawError>;

    /// Stop streaming and terminate the CLI process.
    ///
    /// Safe to call repeatedly; teardown happens once.
    async fn disconnect(&mut self) -> Result<(), ClawError>;

    /// Whether the CLI process has been started and not yet torn down.
    fn is_ready(&self) -> bool;
}

/// Resource bounds for a streaming session
///
/// # Example
///
/// ```
/// use claw_stream::transport::StreamLimits;
/// use std::time::Duration;
///
/// let limits = StreamLimits {
///     shutdown_grace: Duration::from_secs(1),
///     ..StreamLimits::default()
/// };
/// assert_eq!(limits.max_line_bytes, 1024 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Longest accepted stdout line, excluding the newline
    pub max_line_bytes: usize,
    /// Stderr bytes retained for failure reports
    pub max_stderr_bytes: usize,
    /// How long to wait for stderr to drain after stdout closes
    pub stderr_timeout: Duration,
    /// How long the process gets to exit after SIGINT
    pub shutdown_grace: Duration,
    /// Capacity of the message channel
    pub channel_capacity: usize,
}

impl StreamLimits {
    /// 1 MiB
    pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;
    /// 10 MiB
    pub const DEFAULT_MAX_STDERR_BYTES: usize = 10 * 1024 * 1024;
    /// Messages buffered ahead of a slow consumer
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: Self::DEFAULT_MAX_LINE_BYTES,
            max_stderr_bytes: Self::DEFAULT_MAX_STDERR_BYTES,
            stderr_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = StreamLimits::default();
        assert_eq!(limits.max_line_bytes, 1_048_576);
        assert_eq!(limits.max_stderr_bytes, 10_485_760);
        assert_eq!(limits.stderr_timeout, Duration::from_secs(30));
        assert_eq!(limits.shutdown_grace, Duration::from_secs(5));
        assert_eq!(limits.channel_capacity, 10);
    }

    #[test]
    fn test_transport_is_object_safe() {
        fn _accepts(_transport: Box<dyn Transport>) {}
        let _ = _accepts;
    }
}
