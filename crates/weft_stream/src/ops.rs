//! Rx-style chunk operators.
//!
//! Every operator preserves non-content chunks and emission order; the only
//! permitted "reordering" is dropping or replacing a value in place.

use async_stream::stream;
use futures::StreamExt as _;
use weft_ir::{
    ChatResponse, ChunkError, ChunkStream, Error, Metadata, Result, StreamChunk,
};

use crate::accumulator::Accumulator;

/// Map content chunks; returning `None` filters the chunk out. Non-content
/// chunks pass through untouched.
#[must_use]
pub fn transform<F>(mut upstream: ChunkStream, f: F) -> ChunkStream
where
    F: Fn(StreamChunk) -> Option<StreamChunk> + Send + 'static,
{
    Box::pin(stream! {
        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) if chunk.is_content() => {
                    if let Some(chunk) = f(chunk) {
                        yield Ok(chunk);
                    }
                }
                other => yield other,
            }
        }
    })
}

/// Keep chunks matching the predicate. Applies to every chunk kind.
#[must_use]
pub fn filter_chunks<F>(mut upstream: ChunkStream, predicate: F) -> ChunkStream
where
    F: Fn(&StreamChunk) -> bool + Send + 'static,
{
    Box::pin(stream! {
        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) if !predicate(&chunk) => {}
                other => yield other,
            }
        }
    })
}

/// Map every chunk.
#[must_use]
pub fn map_chunks<F>(mut upstream: ChunkStream, f: F) -> ChunkStream
where
    F: Fn(StreamChunk) -> StreamChunk + Send + 'static,
{
    Box::pin(stream! {
        while let Some(item) = upstream.next().await {
            yield item.map(&f);
        }
    })
}

/// Observe every chunk without changing the stream.
#[must_use]
pub fn tap<F>(mut upstream: ChunkStream, f: F) -> ChunkStream
where
    F: Fn(&StreamChunk) + Send + 'static,
{
    Box::pin(stream! {
        while let Some(item) = upstream.next().await {
            if let Ok(chunk) = &item {
                f(chunk);
            }
            yield item;
        }
    })
}

/// Drain the stream into a chunk list, failing on the first `Err` item.
pub async fn collect(mut stream: ChunkStream) -> Result<Vec<StreamChunk>> {
    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        chunks.push(item?);
    }

    Ok(chunks)
}

/// Drain the stream into its final content text.
pub async fn stream_to_text(mut stream: ChunkStream) -> Result<String> {
    let mut accumulator = Accumulator::new();
    while let Some(item) = stream.next().await {
        accumulator = accumulator.accumulate(&item?);
    }

    Ok(accumulator.accumulated)
}

/// Drain the stream into a [`ChatResponse`].
///
/// A stream that ends without a `done` chunk still produces a response; a
/// terminal error chunk becomes an [`Error`] instead.
pub async fn stream_to_response(
    mut stream: ChunkStream,
    metadata: Option<Metadata>,
) -> Result<ChatResponse> {
    let mut accumulator = Accumulator::new();

    while let Some(item) = stream.next().await {
        let chunk = item?;
        if let StreamChunk::Error { error, .. } = &chunk {
            return Err(Error::new(error.code, error.message.clone()));
        }

        accumulator = accumulator.accumulate(&chunk);
    }

    Ok(accumulator.into_response(metadata))
}

/// Convert `Err` items into a terminal in-band error chunk and close.
///
/// `on_error` may suppress the chunk by returning `None`; the stream still
/// terminates.
#[must_use]
pub fn catch_errors<F>(mut upstream: ChunkStream, on_error: F) -> ChunkStream
where
    F: Fn(&Error) -> Option<ChunkError> + Send + 'static,
{
    Box::pin(stream! {
        let mut sequence = 0u64;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) => {
                    sequence = sequence.max(chunk.sequence());
                    yield Ok(chunk);
                }
                Err(error) => {
                    if let Some(payload) = on_error(&error) {
                        yield Ok(StreamChunk::Error {
                            sequence: sequence + 1,
                            error: payload,
                        });
                    }
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
