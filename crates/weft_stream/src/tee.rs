use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use weft_ir::{ChunkStream, Result, StreamChunk};

/// Split a stream into `n` independently-consumable branches.
///
/// The source is a one-shot stream, so this is the only approved
/// multi-consumer pattern: a forwarding task drains the source once and fans
/// every item out to per-branch buffers. Each branch sees every chunk in
/// order regardless of how fast the others are consumed; a dropped branch
/// just stops buffering.
#[must_use]
pub fn tee(mut upstream: ChunkStream, n: usize) -> Vec<ChunkStream> {
    let mut senders: Vec<mpsc::UnboundedSender<Result<StreamChunk>>> = Vec::with_capacity(n);
    let mut branches: Vec<ChunkStream> = Vec::with_capacity(n);

    for _ in 0..n {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(tx);
        branches.push(Box::pin(UnboundedReceiverStream::new(rx)));
    }

    tokio::spawn(async move {
        while let Some(item) = upstream.next().await {
            for sender in &senders {
                // A closed branch is fine; the rest keep receiving.
                let _ = sender.send(item.clone());
            }
        }
    });

    branches
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt as _;
    use weft_ir::FinishReason;

    use super::*;
    use crate::from_chunks;

    fn chunks() -> Vec<StreamChunk> {
        vec![
            StreamChunk::content(0, "a"),
            StreamChunk::content(1, "b"),
            StreamChunk::done(2, FinishReason::Stop),
        ]
    }

    #[tokio::test]
    async fn every_branch_sees_every_chunk_in_order() {
        let branches = tee(from_chunks(chunks()), 3);
        assert_eq!(branches.len(), 3);

        for branch in branches {
            let out: Vec<_> = branch.try_collect().await.unwrap();
            assert_eq!(out, chunks());
        }
    }

    #[tokio::test]
    async fn branches_buffer_independently_of_consumption_rate() {
        let mut branches = tee(from_chunks(chunks()), 2);
        let slow = branches.pop().unwrap();
        let fast = branches.pop().unwrap();

        // Drain the fast branch completely first.
        let fast_out: Vec<_> = fast.try_collect().await.unwrap();
        assert_eq!(fast_out.len(), 3);

        // The slow branch still replays the full stream afterwards.
        let slow_out: Vec<_> = slow.try_collect().await.unwrap();
        assert_eq!(slow_out, fast_out);
    }

    #[tokio::test]
    async fn dropping_a_branch_does_not_break_the_others() {
        let mut branches = tee(from_chunks(chunks()), 2);
        drop(branches.pop());

        let out: Vec<_> = branches.pop().unwrap().try_collect().await.unwrap();
        assert_eq!(out.len(), 3);
    }
}
