use std::time::Duration;

use async_stream::stream;
use futures::StreamExt as _;
use tokio::time::Instant;
use weft_ir::{ChunkStream, StreamChunk};

/// Throttle content chunks to at most `chunks_per_second`.
///
/// Non-content chunks (start, metadata, tool use, terminals) pass instantly;
/// only the content firehose is paced.
#[must_use]
pub fn rate_limit(mut upstream: ChunkStream, chunks_per_second: f64) -> ChunkStream {
    let interval = if chunks_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / chunks_per_second)
    } else {
        Duration::ZERO
    };

    Box::pin(stream! {
        let mut next_slot = Instant::now();

        while let Some(item) = upstream.next().await {
            let is_content = matches!(&item, Ok(chunk) if chunk.is_content());

            if is_content && !interval.is_zero() {
                let now = Instant::now();
                if next_slot > now {
                    tokio::time::sleep_until(next_slot).await;
                }
                next_slot = next_slot.max(now) + interval;
            }

            yield item;
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt as _;
    use weft_ir::FinishReason;

    use super::*;
    use crate::from_chunks;

    #[tokio::test(start_paused = true)]
    async fn content_is_paced_and_terminals_pass_instantly() {
        let stream = from_chunks(vec![
            StreamChunk::content(0, "a"),
            StreamChunk::content(1, "b"),
            StreamChunk::content(2, "c"),
            StreamChunk::done(3, FinishReason::Stop),
        ]);

        let started = Instant::now();
        let out: Vec<_> = rate_limit(stream, 10.0).try_collect().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(out.len(), 4);
        // First chunk is immediate; the next two wait one 100ms slot each.
        assert!(elapsed >= Duration::from_millis(200), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn zero_rate_disables_throttling() {
        let stream = from_chunks(vec![
            StreamChunk::content(0, "a"),
            StreamChunk::content(1, "b"),
        ]);

        let out: Vec<_> = rate_limit(stream, 0.0).try_collect().await.unwrap();
        assert_eq!(out.len(), 2);
    }
}
