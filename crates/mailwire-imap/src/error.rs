//! Error types for the response interpreter.
//!
//! Errors fall into four classes (see [`ErrorKind`]). Only syntax errors are
//! recovered inside the parser; everything else reaches the caller.

use thiserror::Error;

use crate::source::TransportError;
use crate::types::Status;

/// A grammar violation inside one production.
///
/// Recovered locally: the rest of the offending line is discarded and
/// parsing resumes with the next line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at byte {position}: {message}")]
pub struct SyntaxError {
    /// Byte offset within the current line.
    pub position: usize,
    /// Description of what went wrong.
    pub message: String,
}

impl SyntaxError {
    /// Creates a syntax error at the given line offset.
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Errors that can occur while interpreting server responses.
#[derive(Debug, Error)]
pub enum Error {
    /// Grammar violation in a single production.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Tagged NO or BAD completion.
    #[error("{command} failed with {status}: {text}")]
    CommandFailed {
        /// Name of the failing command.
        command: String,
        /// NO or BAD.
        status: Status,
        /// Human readable text from the server.
        text: String,
    },

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// The line source failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The connection ended before a literal's promised octets arrived.
    #[error("literal truncated: expected {expected} octets, received {received}")]
    LiteralTruncated {
        /// Octets announced by `{n}`.
        expected: u32,
        /// Octets actually received.
        received: u32,
    },

    /// A literal exceeded the configured memory ceiling.
    #[error("literal too large: {size} bytes (max {limit})")]
    LiteralTooLarge {
        /// Announced literal size.
        size: u32,
        /// Configured ceiling.
        limit: u32,
    },

    /// Framing violation detected below the grammar (for example an overlong line).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error in the async framing layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Non-fatal, recovered per line.
    Syntax,
    /// Tagged NO/BAD; the connection remains usable.
    CommandFailure,
    /// BYE, transport failure or a short literal; the connection is gone.
    ConnectionFatal,
    /// A resource ceiling was exceeded; handled like a fatal error.
    ResourceExhausted,
}

impl Error {
    /// Returns the taxonomy class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax(_) => ErrorKind::Syntax,
            Self::CommandFailed { .. } => ErrorKind::CommandFailure,
            Self::LiteralTooLarge { .. } => ErrorKind::ResourceExhausted,
            Self::Bye(_)
            | Self::Transport(_)
            | Self::LiteralTruncated { .. }
            | Self::Protocol(_)
            | Self::Io(_) => ErrorKind::ConnectionFatal,
        }
    }

    /// Returns true if the connection can no longer be used.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionFatal | ErrorKind::ResourceExhausted
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_is_recoverable() {
        let err = Error::from(SyntaxError::new(4, "bad token"));
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "syntax error at byte 4: bad token");
    }

    #[test]
    fn test_command_failure_is_not_fatal() {
        let err = Error::CommandFailed {
            command: "SELECT".to_string(),
            status: Status::No,
            text: "no such mailbox".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::CommandFailure);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("SELECT failed with NO"));
    }

    #[test]
    fn test_fatal_classes() {
        assert!(Error::Bye("shutting down".into()).is_fatal());
        assert!(Error::Transport(TransportError::Closed).is_fatal());
        assert!(
            Error::LiteralTruncated {
                expected: 10,
                received: 3
            }
            .is_fatal()
        );

        let err = Error::LiteralTooLarge { size: 10, limit: 5 };
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(err.is_fatal());
    }
}
