//! Error types for remote-unpack
//!
//! This module provides the crate-wide error type and its mapping onto reply
//! statuses, so that any failure inside a handler can still be reported to the
//! client as a well-formed final reply.

use std::io;
use thiserror::Error;

use crate::protocol::Status;

/// Result type alias for remote-unpack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for remote-unpack
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "protocol_version")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message payload was not valid JSON (or not valid UTF-8)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A frame declared (or would need) a length above the allowed maximum
    #[error("frame of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// Declared or required payload length
        len: u64,
        /// Maximum payload length accepted
        max: u64,
    },

    /// The peer went away while replies were still being sent
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// External tool execution failed (unrar not runnable, wait failed, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error means the connection to the peer is gone
    ///
    /// No reply can be delivered for such errors, so callers skip the error
    /// reply and just close the session.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Disconnected(_) => true,
            Error::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}

/// I/O error kinds that indicate the remote end of a stream is gone.
pub(crate) fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}

/// Convert errors to reply statuses for the wire protocol
///
/// This trait maps domain errors to the status a client receives when a
/// request fails inside the server.
pub trait ToReplyStatus {
    /// Get the reply status for this error
    fn reply_status(&self) -> Status;

    /// Get the machine-readable error code (used in structured logs)
    fn error_code(&self) -> &str;
}

impl ToReplyStatus for Error {
    fn reply_status(&self) -> Status {
        match self {
            // 404 Not Found - the path named by the request is missing
            Error::Io(e) if e.kind() == io::ErrorKind::NotFound => Status::NOT_FOUND,

            // 500 for everything else: the request was well-formed but could not be served
            Error::Config { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::FrameTooLarge { .. }
            | Error::Disconnected(_)
            | Error::ExternalTool(_)
            | Error::NotSupported(_)
            | Error::Other(_) => Status::INTERNAL_ERROR,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::FrameTooLarge { .. } => "frame_too_large",
            Error::Disconnected(_) => "disconnected",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_status_code, expected_error_code) for every variant.
    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::config("protocol_version", "must not be empty"),
                500,
                "config_error",
            ),
            (
                Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone")),
                404,
                "io_error",
            ),
            (
                Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
                500,
                "io_error",
            ),
            (
                Error::Serialization(serde_json::from_str::<serde_json::Value>("{").unwrap_err()),
                500,
                "serialization_error",
            ),
            (
                Error::FrameTooLarge { len: 10, max: 5 },
                500,
                "frame_too_large",
            ),
            (
                Error::Disconnected("reset".into()),
                500,
                "disconnected",
            ),
            (
                Error::ExternalTool("unrar missing".into()),
                500,
                "external_tool_error",
            ),
            (
                Error::NotSupported("no unrar".into()),
                500,
                "not_supported",
            ),
            (Error::Other("boom".into()), 500, "internal_error"),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(
                error.reply_status().code,
                status,
                "unexpected status for {error}"
            );
            assert_eq!(error.error_code(), code, "unexpected code for {error}");
        }
    }

    #[test]
    fn disconnect_classification() {
        assert!(Error::Disconnected("gone".into()).is_disconnect());
        assert!(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_disconnect());
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_disconnect());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::NotFound)).is_disconnect());
        assert!(!Error::ExternalTool("spawn failed".into()).is_disconnect());
    }

    #[test]
    fn config_error_carries_key() {
        match Error::config("server.port", "port must not be 0") {
            Error::Config { message, key } => {
                assert_eq!(key.as_deref(), Some("server.port"));
                assert!(message.contains("port"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn frame_too_large_message_mentions_both_sizes() {
        let msg = Error::FrameTooLarge { len: 100, max: 10 }.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("10"));
    }
}
