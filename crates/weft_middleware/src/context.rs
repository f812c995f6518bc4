use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_ir::ChatRequest;

/// Scratch state shared by every middleware of one request.
pub type StateMap = Arc<Mutex<IndexMap<String, Value>>>;

/// Per-request execution context.
///
/// Cloning is cheap and shares the scratch state, the cancellation signal
/// and the streaming counters; middleware instances themselves are reusable
/// across requests and must not hold request-scoped state of their own.
#[derive(Clone)]
pub struct Context {
    pub request: ChatRequest,

    /// Stack-level configuration, opaque to the fabric.
    pub config: Arc<IndexMap<String, Value>>,

    /// Scratch map middleware use to talk to each other.
    pub state: StateMap,

    pub signal: CancellationToken,

    pub is_streaming: bool,

    /// The backend the router selected, once known.
    pub backend: Option<String>,

    /// Names of middleware that ran, in execution order. Feeds provenance.
    pub executed: Arc<Mutex<Vec<String>>>,

    /// Streaming-only counter middleware may increment per chunk.
    pub chunks_processed: Arc<AtomicU64>,

    /// Streaming-only flag set once the stream ran to completion.
    pub stream_complete: Arc<AtomicBool>,
}

impl Context {
    /// Context for the unary path; `is_streaming` derives from the request.
    #[must_use]
    pub fn unary(request: ChatRequest) -> Self {
        let is_streaming = request.stream;
        Self::build(request, is_streaming)
    }

    /// Context for the streaming path; `is_streaming` is forced true.
    #[must_use]
    pub fn streaming(request: ChatRequest) -> Self {
        Self::build(request, true)
    }

    fn build(request: ChatRequest, is_streaming: bool) -> Self {
        Self {
            request,
            config: Arc::new(IndexMap::new()),
            state: Arc::new(Mutex::new(IndexMap::new())),
            signal: CancellationToken::new(),
            is_streaming,
            backend: None,
            executed: Arc::new(Mutex::new(Vec::new())),
            chunks_processed: Arc::new(AtomicU64::new(0)),
            stream_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: IndexMap<String, Value>) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.state.lock().insert(key.into(), value);
    }

    #[must_use]
    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Middleware names recorded so far.
    #[must_use]
    pub fn executed_names(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn note_chunk(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed.load(Ordering::Relaxed)
    }

    pub fn mark_stream_complete(&self) {
        self.stream_complete.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_stream_complete(&self) -> bool {
        self.stream_complete.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_ir::Message;

    use super::*;

    #[test]
    fn unary_context_derives_streaming_from_the_request() {
        let request = ChatRequest::new(vec![Message::user("hi")]);
        assert!(!Context::unary(request.clone()).is_streaming);
        assert!(Context::unary(request.clone().streaming()).is_streaming);
        assert!(Context::streaming(request).is_streaming);
    }

    #[test]
    fn state_is_shared_across_clones() {
        let ctx = Context::unary(ChatRequest::new(vec![Message::user("hi")]));
        let clone = ctx.clone();

        clone.set_state("seen", json!(true));
        assert_eq!(ctx.state_value("seen"), Some(json!(true)));

        clone.note_chunk();
        assert_eq!(ctx.chunks_processed(), 1);
    }
}
