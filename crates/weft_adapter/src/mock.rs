//! Mock backend for testing without real provider calls.
//!
//! A configurable [`Backend`] implementation, useful for:
//!
//! - Router tests that need scripted success/failure sequences
//! - Verifying cancellation propagation (the mock records whether its
//!   cancel signal fired)
//! - Exercising stream failover with in-band error chunks
//!
//! Shipped in `src/` rather than behind `cfg(test)` so downstream crates can
//! use it in their own tests.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use weft_ir::{
    ChatRequest, ChatResponse, ChunkStream, Error, FinishReason, Message, Metadata, Result,
    StreamChunk, Usage, token,
};

use crate::{
    backend::Backend,
    capabilities::Capabilities,
    models::{ListModelsOptions, ModelListing},
};

/// What one call against the mock should do.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with this assistant message.
    Respond(String),

    /// Fail outright: unary calls error, streaming calls fail to open.
    Fail(Error),

    /// The stream opens, then terminates with an in-band error chunk before
    /// any content. Unary calls treat this as [`MockOutcome::Fail`].
    StreamErrorChunk(Error),

    /// The stream delivers content, then terminates with an error chunk.
    ChunksThenError(Vec<String>, Error),
}

/// A scripted backend. Outcomes are consumed call by call; once the script
/// is exhausted the last outcome repeats.
pub struct MockBackend {
    name: String,
    capabilities: Capabilities,
    script: Mutex<Vec<MockOutcome>>,
    delay: Option<Duration>,
    cost_per_request: Option<f64>,
    calls: AtomicUsize,
    cursor: AtomicUsize,
    cancelled: AtomicBool,
    healthy: AtomicBool,
}

impl MockBackend {
    pub fn with_script(name: impl Into<String>, script: Vec<MockOutcome>) -> Self {
        assert!(!script.is_empty(), "mock backend needs at least one outcome");

        Self {
            name: name.into(),
            capabilities: Capabilities::default(),
            script: Mutex::new(script),
            delay: None,
            cost_per_request: None,
            calls: AtomicUsize::new(0),
            cursor: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
        }
    }

    /// A backend that always succeeds with the given message.
    pub fn with_message(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_script(name, vec![MockOutcome::Respond(content.into())])
    }

    /// A backend that always fails with the given error.
    pub fn failing(name: impl Into<String>, error: Error) -> Self {
        Self::with_script(name, vec![MockOutcome::Fail(error)])
    }

    /// Delay every call, so tests can order concurrent completions.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_cost(mut self, cost_per_request: f64) -> Self {
        self.cost_per_request = Some(cost_per_request);
        self
    }

    /// Flip the outcome of subsequent health checks.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// How many execute/stream calls reached this backend.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether any call observed its cancellation signal firing.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        let script = self.script.lock();
        let index = self.cursor.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
        script[index].clone()
    }

    fn response(&self, request: &ChatRequest, content: String) -> ChatResponse {
        let mut metadata = Metadata::with_request_id(request.metadata.request_id.clone());
        metadata.provenance.backend = Some(self.name.clone());

        let usage = Usage::new(
            token::estimate_request_tokens(request),
            token::estimate_tokens(&content),
        );

        ChatResponse::new(Message::assistant(content), FinishReason::Stop, metadata).with_usage(usage)
    }

    /// Wait out the configured delay, watching the cancel signal.
    async fn settle(&self, signal: Option<&CancellationToken>) -> Result<()> {
        if let Some(signal) = signal
            && signal.is_cancelled()
        {
            self.cancelled.store(true, Ordering::SeqCst);
            return Err(Error::cancelled().with_provenance(self.name.clone()));
        }

        let Some(delay) = self.delay else {
            return Ok(());
        };

        match signal {
            Some(signal) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => Ok(()),
                    () = signal.cancelled() => {
                        self.cancelled.store(true, Ordering::SeqCst);
                        Err(Error::cancelled().with_provenance(self.name.clone()))
                    }
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    async fn execute(
        &self,
        request: ChatRequest,
        signal: Option<CancellationToken>,
    ) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.settle(signal.as_ref()).await?;

        match self.next_outcome() {
            MockOutcome::Respond(content) => Ok(self.response(&request, content)),
            MockOutcome::Fail(error)
            | MockOutcome::StreamErrorChunk(error)
            | MockOutcome::ChunksThenError(_, error) => {
                Err(error.with_provenance(self.name.clone()))
            }
        }
    }

    async fn execute_stream(
        &self,
        request: ChatRequest,
        signal: Option<CancellationToken>,
    ) -> Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.settle(signal.as_ref()).await?;

        let mut metadata = Metadata::with_request_id(request.metadata.request_id.clone());
        metadata.provenance.backend = Some(self.name.clone());

        let (chunks, error) = match self.next_outcome() {
            MockOutcome::Fail(error) => return Err(error.with_provenance(self.name.clone())),
            MockOutcome::Respond(content) => (vec![content], None),
            MockOutcome::StreamErrorChunk(error) => (vec![], Some(error)),
            MockOutcome::ChunksThenError(chunks, error) => (chunks, Some(error)),
        };

        Ok(Box::pin(stream! {
            let mut sequence = 0u64;
            yield Ok(StreamChunk::start(sequence, metadata));

            for content in chunks {
                if let Some(signal) = &signal
                    && signal.is_cancelled()
                {
                    sequence += 1;
                    yield Ok(StreamChunk::error(sequence, &Error::cancelled()));
                    return;
                }

                sequence += 1;
                yield Ok(StreamChunk::content(sequence, content));
            }

            sequence += 1;
            match error {
                Some(error) => yield Ok(StreamChunk::error(sequence, &error)),
                None => yield Ok(StreamChunk::done(sequence, FinishReason::Stop)),
            }
        }))
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::provider("mock backend marked unhealthy", true)
                .with_provenance(self.name.clone()))
        }
    }

    fn estimate_cost(&self, _request: &ChatRequest) -> Option<f64> {
        self.cost_per_request
    }

    async fn list_models(&self, options: ListModelsOptions) -> Result<ModelListing> {
        let mut listing = ModelListing::from_ids(&self.capabilities.supported_models);
        if let Some(filter) = &options.filter {
            listing = listing.filtered(filter);
        }

        Ok(listing)
    }
}
