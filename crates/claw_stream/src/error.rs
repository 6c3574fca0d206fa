//! Error types for the claw_stream crate
//!
//! This module defines the error hierarchy using `thiserror`. Every fallible
//! operation returns `Result<T, ClawError>`.
//!
//! # Error Variants
//!
//! - [`ClawError::CliNotFound`]: the `claude` executable could not be resolved or launched
//! - [`ClawError::Connection`]: pipe or working-directory setup failures
//! - [`ClawError::Process`]: failed launch or non-zero exit
//! - [`ClawError::JsonDecode`]: a stdout line that is not valid JSON
//! - [`ClawError::MessageParse`]: valid JSON with an invalid protocol shape
//! - [`ClawError::Io`]: other I/O failures (auto-converts from `std::io::Error`)
//!
//! Only setup failures are returned to the caller. Failures observed while a
//! stream is running are turned into diagnostic [`UserMessage`](crate::messages::UserMessage)s
//! so a single bad line never ends an otherwise healthy session.
//!
//! # Example
//!
//! ```rust
//! use claw_stream::error::ClawError;
//! use std::error::Error;
//!
//! let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
//! let err = ClawError::process("failed to start CLI process", 0, "", Some(io));
//! assert!(err.source().is_some());
//! ```

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Classification of a protocol shape failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A discriminant or required payload field is absent or has the wrong type
    MissingField,
    /// The message `type` discriminant is not a known message type
    UnknownType,
    /// A content block is not an object or has an unknown block type
    MalformedBlock,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseErrorKind::MissingField => "missing field",
            ParseErrorKind::UnknownType => "unknown type",
            ParseErrorKind::MalformedBlock => "malformed block",
        };
        f.write_str(name)
    }
}

/// The main error type for all claw_stream operations
#[derive(Error, Debug)]
pub enum ClawError {
    /// Claude Code CLI binary was not found
    ///
    /// Returned by discovery when no candidate exists, and by `connect` when the
    /// process fails to start and the resolved path names the `claude` executable.
    ///
    /// # Resolution
    /// - Install Claude Code CLI: `npm install -g @anthropic-ai/claude-code`
    /// - Or set `cli_path` on the query options
    #[error("Claude Code CLI not found at path: {}", path.display())]
    CliNotFound {
        /// The path that was searched or launched (empty when nothing was found)
        path: PathBuf,
        /// The underlying launch failure, if any
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to set up the connection to the CLI process
    #[error("Failed to connect to Claude Code CLI: {message}")]
    Connection {
        /// What went wrong
        message: String,
        /// The underlying I/O failure, if any
        #[source]
        source: Option<std::io::Error>,
    },

    /// The CLI process failed to launch or exited with a non-zero code
    #[error("{message} (exit code {code}): {stderr}")]
    Process {
        /// What went wrong
        message: String,
        /// Exit code of the process (0 when it never ran)
        code: i32,
        /// Captured standard error output
        stderr: String,
        /// The underlying I/O failure, if any
        #[source]
        source: Option<std::io::Error>,
    },

    /// A stdout line was not valid JSON
    #[error("Failed to decode JSON from CLI: {source}")]
    JsonDecode {
        /// The offending line
        raw: String,
        /// The decoder error
        #[source]
        source: serde_json::Error,
    },

    /// Valid JSON that does not match the protocol shape
    #[error("Failed to parse message ({kind}): {reason}")]
    MessageParse {
        /// Failure classification
        kind: ParseErrorKind,
        /// Description of what went wrong
        reason: String,
        /// The raw JSON that failed to parse
        raw: String,
    },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClawError {
    /// Build a [`ClawError::Connection`]
    pub fn connection(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        ClawError::Connection {
            message: message.into(),
            source,
        }
    }

    /// Build a [`ClawError::Process`]
    pub fn process(
        message: impl Into<String>,
        code: i32,
        stderr: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Self {
        ClawError::Process {
            message: message.into(),
            code,
            stderr: stderr.into(),
            source,
        }
    }

    /// Build a [`ClawError::MessageParse`] capturing the offending JSON
    pub fn parse(kind: ParseErrorKind, reason: impl Into<String>, raw: &serde_json::Value) -> Self {
        ClawError::MessageParse {
            kind,
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    /// The parse classification, if this is a [`ClawError::MessageParse`]
    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            ClawError::MessageParse { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_cli_not_found_message() {
        let err = ClawError::CliNotFound {
            path: PathBuf::from("/usr/bin/claude"),
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "Claude Code CLI not found at path: /usr/bin/claude"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_cli_not_found_chains_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ClawError::CliNotFound {
            path: PathBuf::from("claude"),
            source: Some(io_err),
        };
        let source = err.source().expect("source should be chained");
        assert!(source.to_string().contains("no such file"));
    }

    #[test]
    fn test_connection_error_message() {
        let err = ClawError::connection("Working directory does not exist: /nope", None);
        assert_eq!(
            err.to_string(),
            "Failed to connect to Claude Code CLI: Working directory does not exist: /nope"
        );
    }

    #[test]
    fn test_process_error_message() {
        let err = ClawError::process("CLI process failed", 3, "boom", None);
        let text = err.to_string();
        assert!(text.contains("exit code 3"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_message_parse_error() {
        let raw = serde_json::json!({"type": "mystery"});
        let err = ClawError::parse(ParseErrorKind::UnknownType, "Unknown message type: mystery", &raw);
        assert!(err.to_string().contains("unknown type"));
        assert!(err.to_string().contains("mystery"));
        assert_eq!(err.parse_kind(), Some(ParseErrorKind::UnknownType));
        match err {
            ClawError::MessageParse { raw, .. } => assert!(raw.contains("\"mystery\"")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_decode_chains_source() {
        let source = serde_json::from_str::<serde_json::Value>("{ invalid }").unwrap_err();
        let err = ClawError::JsonDecode {
            raw: "{ invalid }".to_string(),
            source,
        };
        assert!(err.to_string().contains("decode"));
        assert!(err.source().is_some());
        assert_eq!(err.parse_kind(), None);
    }

    #[test]
    fn test_io_error_conversion() {
        fn read_file() -> Result<String, ClawError> {
            Ok(std::fs::read_to_string("/nonexistent/file.txt")?)
        }

        let err = read_file().unwrap_err();
        assert!(matches!(err, ClawError::Io(_)));
    }
}
