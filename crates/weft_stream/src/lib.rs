//! Stream transformation layer.
//!
//! Normalizes between delta and accumulated chunk modes, validates sequence
//! numbering, and provides the operator set every higher layer composes:
//! transform/filter/map/tap, collection into text or a response, error
//! capture, inter-chunk timeouts, chunk rate limiting, `tee`, and
//! cooperative cancellation.
//!
//! All operators consume and return [`weft_ir::ChunkStream`]; none of them
//! reorder chunks.

pub mod accumulator;
pub mod cancel;
pub mod mode;
pub mod ops;
pub mod rate_limit;
pub mod tee;
pub mod timeout;
pub mod validate;

pub use accumulator::Accumulator;
pub use cancel::with_cancellation;
pub use mode::{ConvertOptions, add_accumulated, convert_stream, is_accumulated_chunk, strip_accumulated};
pub use ops::{catch_errors, collect, filter_chunks, map_chunks, stream_to_response, stream_to_text, tap, transform};
pub use rate_limit::rate_limit;
pub use tee::tee;
pub use timeout::with_timeout;
pub use validate::{SequenceIssue, ValidateOptions, validate_sequence};

/// Build a chunk stream from an in-memory chunk list. Test and fixture glue.
#[must_use]
pub fn from_chunks(chunks: Vec<weft_ir::StreamChunk>) -> weft_ir::ChunkStream {
    Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
}
