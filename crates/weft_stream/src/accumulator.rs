use weft_ir::{
    ChatResponse, FinishReason, Message, Metadata, Role, StreamChunk, Usage,
};

/// Running state of a content stream.
///
/// Pure: every [`Accumulator::accumulate`] returns a new value and never
/// mutates its input, so operators can hold snapshots at arbitrary points of
/// the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    /// Concatenation of every content delta seen so far.
    pub accumulated: String,

    pub role: Role,

    /// The highest sequence number seen.
    pub sequence: u64,

    pub metadata: Option<Metadata>,

    pub finish_reason: Option<FinishReason>,

    pub usage: Option<Usage>,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulated: String::new(),
            role: Role::Assistant,
            sequence: 0,
            metadata: None,
            finish_reason: None,
            usage: None,
        }
    }

    /// Apply one chunk, returning the next accumulator state.
    ///
    /// Content chunks in accumulated mode are trusted over local
    /// concatenation: their `accumulated` value may have passed through a
    /// caller transform.
    #[must_use]
    pub fn accumulate(&self, chunk: &StreamChunk) -> Self {
        let mut next = self.clone();
        next.sequence = next.sequence.max(chunk.sequence());

        match chunk {
            StreamChunk::Start { metadata, .. } => {
                next.metadata = Some(metadata.clone());
            }

            StreamChunk::Content {
                delta,
                accumulated,
                role,
                ..
            } => {
                match accumulated {
                    Some(total) => next.accumulated = total.clone(),
                    None => next.accumulated.push_str(delta),
                }
                if let Some(role) = role {
                    next.role = *role;
                }
            }

            StreamChunk::Metadata {
                usage, metadata, ..
            } => {
                if let Some(usage) = usage {
                    next.usage = Some(usage.clone());
                }
                if let Some(metadata) = metadata {
                    next.metadata = Some(match next.metadata.take() {
                        Some(ours) => ours.merged_over(metadata),
                        None => metadata.clone(),
                    });
                }
            }

            StreamChunk::Done {
                finish_reason,
                usage,
                ..
            } => {
                next.finish_reason = Some(*finish_reason);
                if let Some(usage) = usage {
                    next.usage = Some(usage.clone());
                }
            }

            StreamChunk::ToolUse { .. } | StreamChunk::Error { .. } => {}
        }

        next
    }

    /// Build the terminal response.
    ///
    /// On metadata conflicts the accumulator wins; `caller_metadata` only
    /// fills gaps. A stream that never delivered a `done` chunk finishes as
    /// [`FinishReason::Stop`].
    #[must_use]
    pub fn into_response(self, caller_metadata: Option<Metadata>) -> ChatResponse {
        let metadata = match (self.metadata, caller_metadata) {
            (Some(ours), Some(caller)) => ours.merged_over(&caller),
            (Some(ours), None) => ours,
            (None, Some(caller)) => caller,
            (None, None) => Metadata::new(),
        };

        let mut response = ChatResponse::new(
            Message::new(self.role, self.accumulated),
            self.finish_reason.unwrap_or(FinishReason::Stop),
            metadata,
        );
        response.usage = self.usage;
        response
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accumulate_never_mutates_its_input() {
        let zero = Accumulator::new();
        let one = zero.accumulate(&StreamChunk::content(0, "Hello"));
        let two = one.accumulate(&StreamChunk::content(1, " World"));

        assert_eq!(zero.accumulated, "");
        assert_eq!(one.accumulated, "Hello");
        assert_eq!(two.accumulated, "Hello World");
        assert_eq!(two.sequence, 1);
    }

    #[test]
    fn accumulated_mode_chunks_are_trusted() {
        let acc = Accumulator::new().accumulate(&StreamChunk::content(0, "Hello"));

        let chunk = StreamChunk::Content {
            sequence: 1,
            delta: String::new(),
            accumulated: Some("HELLO WORLD".to_owned()),
            role: None,
        };
        let acc = acc.accumulate(&chunk);
        assert_eq!(acc.accumulated, "HELLO WORLD");
    }

    #[test]
    fn done_chunk_sets_finish_reason_and_usage() {
        let done = StreamChunk::Done {
            sequence: 2,
            finish_reason: FinishReason::Length,
            usage: Some(Usage::new(10, 5)),
            message: None,
        };
        let acc = Accumulator::new().accumulate(&done);
        assert_eq!(acc.finish_reason, Some(FinishReason::Length));
        assert_eq!(acc.usage, Some(Usage::new(10, 5)));
    }

    #[test]
    fn into_response_prefers_accumulator_metadata() {
        let mut stream_meta = Metadata::with_request_id("from-stream");
        stream_meta.custom.insert("k".into(), json!("stream"));

        let mut caller_meta = Metadata::with_request_id("from-caller");
        caller_meta.custom.insert("k".into(), json!("caller"));
        caller_meta.custom.insert("caller_only".into(), json!(true));

        let acc = Accumulator::new()
            .accumulate(&StreamChunk::start(0, stream_meta))
            .accumulate(&StreamChunk::content(1, "hi"));

        let response = acc.into_response(Some(caller_meta));
        assert_eq!(response.metadata.request_id, "from-stream");
        assert_eq!(response.metadata.custom["k"], json!("stream"));
        assert_eq!(response.metadata.custom["caller_only"], json!(true));
        assert_eq!(response.text(), "hi");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }
}
