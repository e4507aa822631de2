//! Error types for the chatstream server.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the chatstream server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The token source failed to open or produce a stream.
    #[error("Token source failed: {0}")]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// An inbound frame could not be decoded.
    #[error("Decode failed: {0}")]
    Decode(#[from] chatstream_protocol::DecodeError),

    /// An outbound frame could not be encoded.
    #[error("Encode failed: {0}")]
    Encode(#[from] chatstream_protocol::EncodeError),

    /// The source produced no fragment within the configured bound.
    #[error("Timed out after {0:?} waiting for the next fragment")]
    StreamTimeout(Duration),

    /// The connection is gone; no further frames can be delivered.
    #[error("Connection closed")]
    ConnectionClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new source error from any displayable failure.
    pub fn source_error(msg: impl Into<String>) -> Self {
        Self::Source(msg.into().into())
    }

    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// A description safe to put in an `error` frame shown to the client.
    ///
    /// Source failures are assumed to be user-displayable already; anything
    /// else collapses to a generic message so internal detail stays out of
    /// the channel.
    pub fn user_message(&self) -> String {
        match self {
            ServerError::Source(e) => format!("The assistant reply failed: {}", e),
            ServerError::StreamTimeout(_) => {
                "The assistant reply timed out. Please try again.".to_string()
            }
            ServerError::Decode(e) => format!("Could not read message: {}", e),
            _ => "Something went wrong while handling the conversation.".to_string(),
        }
    }
}
