//! Sequence-number validation.
//!
//! Sequence numbers are non-decreasing integers starting at 0. Gaps,
//! duplicates and out-of-order arrivals are reported through the configured
//! callback in lenient mode; strict mode terminates the stream with an
//! in-band `validation` error chunk instead.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt as _;
use tracing::warn;
use weft_ir::{ChunkStream, Error, StreamChunk};

/// One observed sequencing anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceIssue {
    /// Integers missing between two observed values.
    Gap { from: u64, to: u64 },

    /// The same sequence number seen again.
    Duplicate { sequence: u64 },

    /// A sequence number lower than one already seen.
    OutOfOrder { sequence: u64, last: u64 },
}

impl SequenceIssue {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Gap { from, to } => format!("sequence gap between {from} and {to}"),
            Self::Duplicate { sequence } => format!("duplicate sequence {sequence}"),
            Self::OutOfOrder { sequence, last } => {
                format!("out-of-order sequence {sequence} after {last}")
            }
        }
    }
}

/// Callback invoked for every anomaly in lenient mode.
pub type IssueCallback = Arc<dyn Fn(&SequenceIssue) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ValidateOptions {
    /// Fail the stream on the first anomaly instead of reporting it.
    pub strict: bool,

    pub on_warning: Option<IssueCallback>,
}

impl ValidateOptions {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            on_warning: None,
        }
    }

    #[must_use]
    pub fn lenient(on_warning: IssueCallback) -> Self {
        Self {
            strict: false,
            on_warning: Some(on_warning),
        }
    }
}

/// Validate sequencing as chunks flow through.
#[must_use]
pub fn validate_sequence(mut upstream: ChunkStream, options: ValidateOptions) -> ChunkStream {
    Box::pin(stream! {
        let mut last: Option<u64> = None;

        while let Some(item) = upstream.next().await {
            let Ok(chunk) = item else {
                yield item;
                continue;
            };

            let sequence = chunk.sequence();
            let issue = match last {
                // The first number must be 0.
                None if sequence > 0 => Some(SequenceIssue::Gap {
                    from: 0,
                    to: sequence,
                }),
                Some(last) if sequence == last => Some(SequenceIssue::Duplicate { sequence }),
                Some(last) if sequence < last => Some(SequenceIssue::OutOfOrder { sequence, last }),
                Some(last) if sequence > last + 1 => Some(SequenceIssue::Gap {
                    from: last,
                    to: sequence,
                }),
                _ => None,
            };

            if let Some(issue) = issue {
                if options.strict {
                    let error = Error::validation(issue.describe());
                    yield Ok(StreamChunk::error(sequence, &error));
                    return;
                }

                warn!(issue = issue.describe(), "Stream sequencing anomaly.");
                if let Some(on_warning) = &options.on_warning {
                    on_warning(&issue);
                }
            }

            last = Some(last.unwrap_or(0).max(sequence));
            yield Ok(chunk);
        }
    })
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
