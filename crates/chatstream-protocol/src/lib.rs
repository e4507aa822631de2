//! Type definitions and codec for the chatstream wire protocol
//!
//! This crate provides the shared contract between the chat session server
//! and its clients, ensuring type-safe communication across the channel
//! boundary. Centralizing the frame vocabulary prevents drift between the
//! two ends and makes protocol compliance a compile-time property on the
//! server side.
//!
//! ## Protocol shape
//!
//! Clients send one frame shape, `{"message": "..."}`. The server answers
//! with frames discriminated by a `"type"` field: `status`, `user_message`,
//! `ai_start`, `ai_chunk`, `ai_complete`, and `error`. Every server frame
//! carries an ISO-8601 timestamp; the frames of one assistant turn all carry
//! the timestamp assigned at `ai_start`, which is the key clients use to
//! correlate chunks with the reply they extend.
//!
//! ## Example
//!
//! ```rust
//! use chatstream_protocol::{codec, Frame, FrameKind};
//! use chrono::Utc;
//!
//! let frame = Frame::ai_chunk("Hel", Utc::now());
//! let wire = codec::encode(&frame).unwrap();
//! let back = codec::decode(&wire).unwrap();
//!
//! assert_eq!(back.kind(), FrameKind::AiChunk);
//! assert_eq!(back, frame);
//! ```

pub mod codec;
pub mod frames;
pub mod types;

pub use codec::{DecodeError, EncodeError};
pub use frames::{
    AiChunkFrame, AiCompleteFrame, AiStartFrame, ClientFrame, ErrorFrame, Frame, FrameKind,
    StatusFrame, UserMessageFrame,
};
pub use types::{ChatMessage, Role};
