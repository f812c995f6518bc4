//! Delta ↔ accumulated conversion.
//!
//! A content chunk is in *accumulated* mode iff its `accumulated` field is
//! set; otherwise it is in *delta* mode. `delta` is always the universal
//! wire form, so conversion only ever adds or removes the `accumulated`
//! field — a chunk whose `delta` is empty but whose `accumulated` is set is
//! still a valid content chunk.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt as _;
use weft_ir::{ChunkStream, StreamChunk, StreamMode};

/// Optional transform applied to the accumulated text before it is written
/// onto each chunk.
pub type AccumulatedTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
pub struct ConvertOptions {
    pub mode: StreamMode,

    /// Applied to the accumulated text of every converted content chunk.
    pub transform: Option<AccumulatedTransform>,
}

impl ConvertOptions {
    #[must_use]
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            transform: None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: AccumulatedTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Whether a chunk is in accumulated mode.
#[must_use]
pub fn is_accumulated_chunk(chunk: &StreamChunk) -> bool {
    chunk.accumulated().is_some()
}

/// Normalize every content chunk of `stream` into the requested mode.
/// Non-content chunks pass through untouched.
#[must_use]
pub fn convert_stream(stream: ChunkStream, options: ConvertOptions) -> ChunkStream {
    match options.mode {
        StreamMode::Accumulated => add_accumulated_with(stream, options.transform),
        StreamMode::Delta => strip_accumulated(stream),
    }
}

/// Delta → accumulated: write the running concatenation onto each content
/// chunk, keeping the delta.
#[must_use]
pub fn add_accumulated(stream: ChunkStream) -> ChunkStream {
    add_accumulated_with(stream, None)
}

fn add_accumulated_with(
    mut upstream: ChunkStream,
    transform: Option<AccumulatedTransform>,
) -> ChunkStream {
    Box::pin(stream! {
        let mut total = String::new();

        while let Some(item) = upstream.next().await {
            match item {
                Ok(StreamChunk::Content {
                    sequence,
                    delta,
                    accumulated,
                    role,
                }) => {
                    // An already-accumulated chunk is authoritative for the
                    // running total.
                    match accumulated {
                        Some(existing) => total = existing,
                        None => total.push_str(&delta),
                    }

                    let visible = match &transform {
                        Some(transform) => transform(&total),
                        None => total.clone(),
                    };

                    yield Ok(StreamChunk::Content {
                        sequence,
                        delta,
                        accumulated: Some(visible),
                        role,
                    });
                }
                other => yield other,
            }
        }
    })
}

/// Accumulated → delta: drop the `accumulated` field, pass the delta
/// through.
#[must_use]
pub fn strip_accumulated(mut upstream: ChunkStream) -> ChunkStream {
    Box::pin(stream! {
        while let Some(item) = upstream.next().await {
            match item {
                Ok(StreamChunk::Content {
                    sequence,
                    delta,
                    accumulated: _,
                    role,
                }) => {
                    yield Ok(StreamChunk::Content {
                        sequence,
                        delta,
                        accumulated: None,
                        role,
                    });
                }
                other => yield other,
            }
        }
    })
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
