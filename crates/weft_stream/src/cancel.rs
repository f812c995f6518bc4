use async_stream::stream;
use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_ir::{ChunkStream, Error, StreamChunk};

/// Cooperative mid-flight cancellation.
///
/// The signal is polled at every chunk boundary; on cancellation a terminal
/// `cancelled` error chunk is emitted and the stream closes.
#[must_use]
pub fn with_cancellation(mut upstream: ChunkStream, signal: CancellationToken) -> ChunkStream {
    Box::pin(stream! {
        let mut sequence = 0u64;

        loop {
            tokio::select! {
                () = signal.cancelled() => {
                    debug!("Stream cancelled between chunks.");
                    yield Ok(StreamChunk::error(sequence + 1, &Error::cancelled()));
                    return;
                }
                item = upstream.next() => {
                    let Some(item) = item else { return };
                    if let Ok(chunk) = &item {
                        sequence = sequence.max(chunk.sequence());
                    }
                    yield item;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::TryStreamExt as _;
    use weft_ir::ErrorCode;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancellation_emits_a_terminal_error_chunk() {
        let upstream: ChunkStream = Box::pin(stream! {
            yield Ok(StreamChunk::content(0, "a"));
            tokio::time::sleep(Duration::from_secs(3600)).await;
            yield Ok(StreamChunk::content(1, "never delivered"));
        });

        let signal = CancellationToken::new();
        let cancel = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let out: Vec<_> = with_cancellation(upstream, signal)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].delta(), Some("a"));
        match &out[1] {
            StreamChunk::Error { error, .. } => assert_eq!(error.code, ErrorCode::Cancelled),
            other => panic!("expected cancelled chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn uncancelled_streams_pass_untouched() {
        let upstream = crate::from_chunks(vec![StreamChunk::content(0, "a")]);
        let out: Vec<_> = with_cancellation(upstream, CancellationToken::new())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}
