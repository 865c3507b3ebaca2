//! Error types for the transport layer.

use std::io;

/// Errors raised while framing or unframing adapter messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header section contained invalid UTF-8.
    #[error("invalid UTF-8 in header")]
    InvalidUtf8,

    /// A header terminator was found but the Content-Length value did not
    /// parse as an integer.
    #[error("malformed Content-Length header value")]
    MalformedContentLength,

    /// A header terminator was found with no Content-Length header at all.
    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// The frame body was not valid JSON. The frame has already been
    /// consumed, so decoding can continue with the next frame.
    #[error("JSON deserialization failed: {0}")]
    JsonDeserialize(#[source] serde_json::Error),

    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[source] serde_json::Error),
}

impl CodecError {
    /// Whether the byte stream is still aligned on a frame boundary after
    /// this error. Header errors lose the boundary and are terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::JsonDeserialize(_))
    }
}

/// An adapter response with `success: false`, failing the originating
/// request.
#[derive(Debug, Clone)]
pub struct AdapterError {
    pub command: String,
    pub message: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "adapter rejected '{}': {}", self.command, message),
            None => write!(f, "adapter rejected '{}'", self.command),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Errors surfaced to callers of [`crate::Connection`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying stream closed (or the connection was shut down) while
    /// the request was pending.
    #[error("transport closed")]
    Closed,

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("failed to encode outgoing message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error writing frame: {0}")]
    Write(#[source] io::Error),
}

impl From<CodecError> for TransportError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(io) => TransportError::Write(io),
            CodecError::JsonSerialize(e) => TransportError::Encode(e),
            other => TransportError::Write(io::Error::other(other)),
        }
    }
}
