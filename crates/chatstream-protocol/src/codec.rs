//! Stateless JSON codec for the wire protocol.
//!
//! Pure transformations between frames and JSON text. The codec holds no
//! state and performs no I/O; both the connection handler and any client
//! implementation share this vocabulary.

use serde_json::error::Category;
use thiserror::Error;

use crate::frames::{ClientFrame, Frame};

/// Errors produced when decoding inbound text into a frame.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The input was not syntactically valid JSON.
    #[error("Malformed JSON: {message}")]
    Syntax { message: String },

    /// The JSON was valid but did not match any frame shape: unknown kind,
    /// missing required field, or a field of the wrong type.
    #[error("Invalid frame: {message}")]
    Schema { message: String },
}

impl DecodeError {
    fn from_json(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Syntax | Category::Eof => Self::Syntax {
                message: err.to_string(),
            },
            _ => Self::Schema {
                message: err.to_string(),
            },
        }
    }
}

/// Error produced when encoding a frame. Well-formed frames always encode;
/// this surfaces only serializer-level failures.
#[derive(Error, Debug)]
#[error("Frame serialization failed: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Encode a server frame as JSON text.
pub fn encode(frame: &Frame) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode JSON text into a server frame.
pub fn decode(input: &str) -> Result<Frame, DecodeError> {
    serde_json::from_str(input).map_err(DecodeError::from_json)
}

/// Decode JSON text into a client frame.
pub fn decode_client(input: &str) -> Result<ClientFrame, DecodeError> {
    serde_json::from_str(input).map_err(DecodeError::from_json)
}
