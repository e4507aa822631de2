//! Frame types for the chatstream wire protocol.
//!
//! One frame is one discrete protocol message on the channel. Server frames
//! are externally discriminated by a `"type"` field; every server frame
//! carries a timestamp, and all frames belonging to one assistant turn share
//! the timestamp assigned at `ai_start`. That shared value is the correlation
//! key clients use to route incoming chunks to the in-progress message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of a server frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Informational message outside any turn.
    Status,
    /// Echo of a user message accepted for a turn.
    UserMessage,
    /// The assistant reply for a turn begins.
    AiStart,
    /// An incremental fragment of the assistant reply.
    AiChunk,
    /// The assistant reply finished successfully.
    AiComplete,
    /// The turn (or the exchange that triggered it) was aborted.
    Error,
}

/// Informational frame outside any turn, such as the connect greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    /// Display text for the client.
    pub message: String,
    /// When the frame was produced.
    pub timestamp: DateTime<Utc>,
}

/// Echo of a user message that was accepted and opened a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessageFrame {
    /// The accepted message text.
    pub message: String,
    /// The turn timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Marks the start of a streamed assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiStartFrame {
    /// The turn timestamp, carried unchanged by every frame of this turn.
    pub timestamp: DateTime<Utc>,
}

/// One incremental fragment of an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiChunkFrame {
    /// The fragment text, exactly as produced by the source.
    pub chunk: String,
    /// The turn timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Marks the successful end of a streamed assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiCompleteFrame {
    /// The turn timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Reports an aborted turn or a rejected exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// A user-displayable description of what went wrong.
    pub message: String,
    /// The turn timestamp when the error replaced a reply, otherwise the
    /// instant the error was produced.
    pub timestamp: DateTime<Utc>,
}

/// A server frame on the chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Informational message outside any turn.
    Status(StatusFrame),
    /// Echo of a user message accepted for a turn.
    UserMessage(UserMessageFrame),
    /// The assistant reply for a turn begins.
    AiStart(AiStartFrame),
    /// An incremental fragment of the assistant reply.
    AiChunk(AiChunkFrame),
    /// The assistant reply finished successfully.
    AiComplete(AiCompleteFrame),
    /// The turn (or the exchange that triggered it) was aborted.
    Error(ErrorFrame),
}

impl Frame {
    /// Create a status frame.
    pub fn status(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Frame::Status(StatusFrame {
            message: message.into(),
            timestamp,
        })
    }

    /// Create a user message echo frame.
    pub fn user_message(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Frame::UserMessage(UserMessageFrame {
            message: message.into(),
            timestamp,
        })
    }

    /// Create a reply start frame for the turn stamped `timestamp`.
    pub fn ai_start(timestamp: DateTime<Utc>) -> Self {
        Frame::AiStart(AiStartFrame { timestamp })
    }

    /// Create a reply fragment frame for the turn stamped `timestamp`.
    pub fn ai_chunk(chunk: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Frame::AiChunk(AiChunkFrame {
            chunk: chunk.into(),
            timestamp,
        })
    }

    /// Create a reply completion frame for the turn stamped `timestamp`.
    pub fn ai_complete(timestamp: DateTime<Utc>) -> Self {
        Frame::AiComplete(AiCompleteFrame { timestamp })
    }

    /// Create an error frame.
    pub fn error(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Frame::Error(ErrorFrame {
            message: message.into(),
            timestamp,
        })
    }

    /// Get the frame kind.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Status(_) => FrameKind::Status,
            Frame::UserMessage(_) => FrameKind::UserMessage,
            Frame::AiStart(_) => FrameKind::AiStart,
            Frame::AiChunk(_) => FrameKind::AiChunk,
            Frame::AiComplete(_) => FrameKind::AiComplete,
            Frame::Error(_) => FrameKind::Error,
        }
    }

    /// Get the frame timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Frame::Status(f) => f.timestamp,
            Frame::UserMessage(f) => f.timestamp,
            Frame::AiStart(f) => f.timestamp,
            Frame::AiChunk(f) => f.timestamp,
            Frame::AiComplete(f) => f.timestamp,
            Frame::Error(f) => f.timestamp,
        }
    }
}

/// The single frame shape clients send: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// The user's message text.
    pub message: String,
}

impl ClientFrame {
    /// Create a client frame.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
