use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use weft_ir::{ChatResponse, Error};

/// How parallel dispatch picks its winner.
#[derive(Clone, Default)]
pub enum ParallelStrategy {
    /// First successful completion wins; the rest are cancelled when
    /// [`ParallelOptions::cancel_on_first_success`] is set.
    #[default]
    First,

    /// Run every backend to completion; the first success (in completion
    /// order) wins.
    All,

    /// Run every backend to completion; the lowest-latency success wins.
    Fastest,

    /// Caller-supplied aggregator: picks the winning outcome index.
    Custom(CustomAggregator),
}

pub type CustomAggregator =
    Arc<dyn Fn(&[ParallelOutcome]) -> Option<usize> + Send + Sync>;

#[derive(Clone)]
pub struct ParallelOptions {
    /// Backends to race; defaults to every available backend.
    pub backends: Option<Vec<String>>,

    pub strategy: ParallelStrategy,

    /// Deadline over the whole dispatch.
    pub timeout: Option<Duration>,

    /// Cancel the losing siblings once a winner is known (`First` only).
    pub cancel_on_first_success: bool,

    /// Parent cancellation signal; every sibling shares a child of it.
    pub signal: Option<CancellationToken>,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            backends: None,
            strategy: ParallelStrategy::First,
            timeout: None,
            cancel_on_first_success: true,
            signal: None,
        }
    }
}

/// One sibling's result.
#[derive(Debug)]
pub struct ParallelOutcome {
    pub backend: String,
    pub latency: Duration,
    pub result: weft_ir::Result<ChatResponse>,
}

/// The outcome of a parallel dispatch.
#[derive(Debug)]
pub struct ParallelDispatchResult {
    /// The winning response.
    pub response: ChatResponse,

    /// The backend that produced it.
    pub backend: String,

    /// Observed latency per backend, cancelled siblings included.
    pub latencies: IndexMap<String, Duration>,

    pub successful_backends: Vec<String>,

    /// Failures, excluding siblings that were merely cancelled.
    pub failed_backends: Vec<(String, Error)>,
}
