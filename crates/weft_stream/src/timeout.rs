use std::time::Duration;

use async_stream::stream;
use futures::StreamExt as _;
use tracing::warn;
use weft_ir::{ChunkStream, Error, StreamChunk};

/// Fail the stream if the gap between consecutive chunks exceeds `window`.
///
/// On expiry a terminal `timeout` error chunk is emitted and the stream
/// closes; the upstream is dropped. This is the inter-chunk timeout — the
/// whole-request timeout lives at the bridge.
#[must_use]
pub fn with_timeout(mut upstream: ChunkStream, window: Duration) -> ChunkStream {
    Box::pin(stream! {
        let mut sequence = 0u64;

        loop {
            match tokio::time::timeout(window, upstream.next()).await {
                Ok(Some(item)) => {
                    if let Ok(chunk) = &item {
                        sequence = sequence.max(chunk.sequence());
                    }
                    yield item;
                }
                Ok(None) => return,
                Err(_) => {
                    warn!(window_ms = window.as_millis(), "Inter-chunk timeout expired.");
                    let error = Error::timeout(format!(
                        "no chunk within {}ms",
                        window.as_millis()
                    ));
                    yield Ok(StreamChunk::error(sequence + 1, &error));
                    return;
                }
            }
        }
    })
}
