use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, ErrorCode, Result},
    message::{Message, Role},
    metadata::Metadata,
    response::{FinishReason, Usage},
};

/// A lazy, one-shot, forward-only sequence of stream chunks.
///
/// `Err` items are transport-level failures; well-behaved producers prefer a
/// terminal [`StreamChunk::Error`] so consumers see an in-band close.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// One element of a streaming response.
///
/// Sequence numbers are non-decreasing integers starting at 0. A successful
/// stream is `start`, then content/tool/metadata chunks, then exactly one
/// `done`; an `error` chunk terminates the stream instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Exactly once, at the head.
    Start {
        sequence: u64,
        metadata: Metadata,
    },

    /// Incremental content. `delta` is the universal wire form;
    /// `accumulated`, when present, equals the concatenation of all deltas up
    /// to and including this chunk.
    Content {
        sequence: u64,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accumulated: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },

    /// Incremental tool-call input.
    ToolUse {
        sequence: u64,
        id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_delta: Option<String>,
    },

    /// Mid-stream usage or metadata updates.
    Metadata {
        sequence: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },

    /// Exactly once, at the end of a successful stream.
    Done {
        sequence: u64,
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
    },

    /// Terminates the stream on failure.
    Error {
        sequence: u64,
        error: ChunkError,
    },
}

/// The in-band error payload of a terminal [`StreamChunk::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&Error> for ChunkError {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code,
            message: error.message.clone(),
            details: error.details.clone(),
        }
    }
}

impl StreamChunk {
    #[must_use]
    pub fn start(sequence: u64, metadata: Metadata) -> Self {
        Self::Start { sequence, metadata }
    }

    pub fn content(sequence: u64, delta: impl Into<String>) -> Self {
        Self::Content {
            sequence,
            delta: delta.into(),
            accumulated: None,
            role: None,
        }
    }

    #[must_use]
    pub fn done(sequence: u64, finish_reason: FinishReason) -> Self {
        Self::Done {
            sequence,
            finish_reason,
            usage: None,
            message: None,
        }
    }

    #[must_use]
    pub fn error(sequence: u64, error: &Error) -> Self {
        Self::Error {
            sequence,
            error: error.into(),
        }
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Start { sequence, .. }
            | Self::Content { sequence, .. }
            | Self::ToolUse { sequence, .. }
            | Self::Metadata { sequence, .. }
            | Self::Done { sequence, .. }
            | Self::Error { sequence, .. } => *sequence,
        }
    }

    #[must_use]
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Content { .. })
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Whether this chunk closes the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.is_done() || self.is_error()
    }

    /// The content delta, for content chunks.
    #[must_use]
    pub fn delta(&self) -> Option<&str> {
        match self {
            Self::Content { delta, .. } => Some(delta),
            _ => None,
        }
    }

    /// The accumulated text, for content chunks carrying it.
    #[must_use]
    pub fn accumulated(&self) -> Option<&str> {
        match self {
            Self::Content { accumulated, .. } => accumulated.as_deref(),
            _ => None,
        }
    }
}
