use std::{
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{Stream, StreamExt as _};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use weft_adapter::{Backend, Frontend};
use weft_ir::{ChatRequest, ChatResponse, Error, ErrorCode, Result};
use weft_middleware::{Context, Handler, Stack, StreamHandler};
use weft_router::{RouteOptions, Router, RouterEvent};

use crate::{
    event::{BridgeEvent, EventBus},
    stats::{BridgeStats, BridgeStatsInner},
};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Generate a request id when the frontend did not.
    pub auto_request_id: bool,

    /// Bridge-level retry attempts after the first failure; 0 disables.
    /// Layers on top of whatever retry the backend or middleware performs.
    pub retries: u32,

    /// Base delay between bridge-level retries, doubled per attempt.
    pub retry_delay: Duration,

    /// Default whole-request deadline; per-request options override it.
    pub timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            auto_request_id: true,
            retries: 0,
            retry_delay: Duration::from_millis(250),
            timeout: None,
        }
    }
}

/// What a bridge delegates to: a single adapter, or a router. Both satisfy
/// the backend contract; the router additionally honors per-request backend
/// overrides.
#[derive(Clone)]
pub enum BridgeBackend {
    Adapter(Arc<dyn Backend>),
    Router(Arc<Router>),
}

impl BridgeBackend {
    fn name(&self) -> &str {
        match self {
            Self::Adapter(backend) => backend.name(),
            Self::Router(router) => router.name(),
        }
    }

    async fn execute(
        &self,
        request: ChatRequest,
        signal: CancellationToken,
        preferred: Option<String>,
    ) -> Result<ChatResponse> {
        match self {
            Self::Adapter(backend) => {
                if preferred.is_some() {
                    debug!("Backend override ignored: bridge owns a single adapter.");
                }
                backend.execute(request, Some(signal)).await
            }
            Self::Router(router) => {
                router
                    .execute_with_options(request, RouteOptions {
                        backend: preferred,
                        signal: Some(signal),
                    })
                    .await
            }
        }
    }

    async fn execute_stream(
        &self,
        request: ChatRequest,
        signal: CancellationToken,
        preferred: Option<String>,
    ) -> Result<weft_ir::ChunkStream> {
        match self {
            Self::Adapter(backend) => backend.execute_stream(request, Some(signal)).await,
            Self::Router(router) => {
                router
                    .execute_stream_with_options(request, RouteOptions {
                        backend: preferred,
                        signal: Some(signal),
                    })
                    .await
            }
        }
    }
}

/// Per-request overrides.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Preferred backend, when the bridge owns a router.
    pub backend: Option<String>,

    pub timeout: Option<Duration>,

    pub signal: Option<CancellationToken>,

    /// Bypass the middleware stack for this request.
    pub skip_middleware: bool,
}

/// Binds one frontend to one backend (or router) with an owned middleware
/// stack, an event bus, and aggregate statistics.
pub struct Bridge<F: Frontend> {
    frontend: F,
    backend: BridgeBackend,
    stack: Stack,
    events: EventBus,
    stats: Mutex<BridgeStatsInner>,
    config: BridgeConfig,
}

impl<F: Frontend> Bridge<F> {
    pub fn new(frontend: F, backend: Arc<dyn Backend>) -> Self {
        Self {
            frontend,
            backend: BridgeBackend::Adapter(backend),
            stack: Stack::new(),
            events: EventBus::new(),
            stats: Mutex::new(BridgeStatsInner::default()),
            config: BridgeConfig::default(),
        }
    }

    /// A bridge over a router. Router events (selection, failover) are
    /// forwarded onto the bridge event bus.
    pub fn with_router(frontend: F, router: Arc<Router>) -> Self {
        let events = EventBus::new();
        let bus = events.clone();
        router.on_event(Arc::new(move |event: &RouterEvent| match event {
            RouterEvent::BackendSelected {
                request_id,
                backend,
            } => bus.emit(&BridgeEvent::BackendSelected {
                request_id: request_id.clone(),
                backend: backend.clone(),
            }),
            RouterEvent::Failover {
                request_id,
                from,
                to,
            } => bus.emit(&BridgeEvent::BackendFailover {
                request_id: request_id.clone(),
                from: from.clone(),
                to: to.clone(),
            }),
            RouterEvent::BreakerTransition { .. } | RouterEvent::HealthChanged { .. } => {}
        }));

        Self {
            frontend,
            backend: BridgeBackend::Router(router),
            stack: Stack::new(),
            events,
            stats: Mutex::new(BridgeStatsInner::default()),
            config: BridgeConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// The middleware stack, mutable until the first request locks it.
    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[must_use]
    pub fn router(&self) -> Option<&Arc<Router>> {
        match &self.backend {
            BridgeBackend::Router(router) => Some(router),
            BridgeBackend::Adapter(_) => None,
        }
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        self.stats.lock().snapshot()
    }

    // ---- unary -------------------------------------------------------

    pub async fn chat(&self, request: F::Request) -> Result<F::Response> {
        self.chat_with(request, RequestOptions::default()).await
    }

    pub async fn chat_with(
        &self,
        request: F::Request,
        options: RequestOptions,
    ) -> Result<F::Response> {
        self.frontend.validate(&request)?;
        let mut ir = self.frontend.to_ir(request)?;
        self.prepare(&mut ir);

        let request_id = ir.metadata.request_id.clone();
        self.events.emit(&BridgeEvent::RequestStart {
            request_id: request_id.clone(),
        });

        let started = Instant::now();
        match self.execute_unary(ir, &options).await {
            Ok((response, executed)) => {
                for name in &executed {
                    self.events.emit(&BridgeEvent::MiddlewareExecuted {
                        request_id: request_id.clone(),
                        name: name.clone(),
                    });
                }

                self.stats.lock().record_success(
                    started.elapsed(),
                    response.metadata.provenance.backend.as_deref(),
                );
                self.events.emit(&BridgeEvent::RequestSuccess {
                    request_id,
                    latency_ms: started.elapsed().as_millis(),
                });

                self.frontend.from_ir(response)
            }
            Err(error) => {
                self.stats.lock().record_failure(error.code);
                if error.code == ErrorCode::Cancelled {
                    self.events
                        .emit(&BridgeEvent::RequestCancelled { request_id });
                } else {
                    self.events.emit(&BridgeEvent::RequestError {
                        request_id,
                        code: error.code,
                    });
                }

                Err(error)
            }
        }
    }

    fn prepare(&self, ir: &mut ChatRequest) {
        if self.config.auto_request_id && ir.metadata.request_id.is_empty() {
            ir.metadata.request_id = Uuid::new_v4().to_string();
        }

        ir.metadata
            .provenance
            .frontend
            .get_or_insert_with(|| self.frontend.name().to_owned());
    }

    async fn execute_unary(
        &self,
        ir: ChatRequest,
        options: &RequestOptions,
    ) -> Result<(ChatResponse, Vec<String>)> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match self.dispatch_once(ir.clone(), options).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => error,
            };

            if attempt > self.config.retries
                || !error.is_retryable()
                || error.code == ErrorCode::Cancelled
            {
                return Err(error);
            }

            let delay = error.retry_after.unwrap_or_else(|| {
                self.config.retry_delay * 2u32.saturating_pow(attempt - 1)
            });
            warn!(
                attempt,
                retries = self.config.retries,
                delay_ms = delay.as_millis(),
                error = error.to_string(),
                "Bridge-level retry."
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn dispatch_once(
        &self,
        ir: ChatRequest,
        options: &RequestOptions,
    ) -> Result<(ChatResponse, Vec<String>)> {
        let signal = options.signal.clone().unwrap_or_default();

        let mut ctx = Context::unary(ir).with_signal(signal.clone());
        if let Some(backend) = &options.backend {
            ctx = ctx.with_backend(backend.clone());
        }
        let ctx_handle = ctx.clone();

        let backend = self.backend.clone();
        let preferred = options.backend.clone();
        let handler: Handler = Arc::new(move |ctx: Context| {
            let backend = backend.clone();
            let preferred = preferred.clone();
            Box::pin(async move {
                backend
                    .execute(ctx.request.clone(), ctx.signal.clone(), preferred)
                    .await
            })
        });

        let skip_middleware = options.skip_middleware;
        let run = async {
            if skip_middleware {
                handler(ctx).await
            } else {
                self.stack.execute(ctx, handler).await
            }
        };

        let mut response = match options.timeout.or(self.config.timeout) {
            Some(deadline) => match tokio::time::timeout(deadline, run).await {
                Ok(result) => result?,
                Err(_) => {
                    signal.cancel();
                    return Err(Error::timeout("request deadline exceeded"));
                }
            },
            None => run.await?,
        };

        let executed = ctx_handle.executed_names();
        for name in &executed {
            if !response.metadata.provenance.middleware.contains(name) {
                response.metadata.provenance.middleware.push(name.clone());
            }
        }

        Ok((response, executed))
    }

    // ---- streaming ---------------------------------------------------

    pub async fn chat_stream(
        &self,
        request: F::Request,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<F::StreamItem>> + Send>>> {
        self.chat_stream_with(request, RequestOptions::default()).await
    }

    pub async fn chat_stream_with(
        &self,
        request: F::Request,
        options: RequestOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<F::StreamItem>> + Send>>> {
        self.frontend.validate(&request)?;
        let mut ir = self.frontend.to_ir(request)?;
        ir.stream = true;
        self.prepare(&mut ir);

        let request_id = ir.metadata.request_id.clone();
        self.stats.lock().record_stream();
        self.events.emit(&BridgeEvent::StreamStart {
            request_id: request_id.clone(),
        });

        let signal = options.signal.clone().unwrap_or_default();
        let ctx = Context::streaming(ir).with_signal(signal.clone());
        let ctx_handle = ctx.clone();

        let backend = self.backend.clone();
        let preferred = options.backend.clone();
        let handler: StreamHandler = Arc::new(move |ctx: Context| {
            let backend = backend.clone();
            let preferred = preferred.clone();
            Box::pin(async move {
                backend
                    .execute_stream(ctx.request.clone(), ctx.signal.clone(), preferred)
                    .await
            })
        });

        let skip_middleware = options.skip_middleware;
        let open = async {
            if skip_middleware {
                handler(ctx).await
            } else {
                self.stack.execute_stream(ctx, handler).await
            }
        };

        let opened = match options.timeout.or(self.config.timeout) {
            Some(deadline) => match tokio::time::timeout(deadline, open).await {
                Ok(result) => result,
                Err(_) => {
                    signal.cancel();
                    Err(Error::timeout("stream open deadline exceeded"))
                }
            },
            None => open.await,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                self.stats.lock().record_failure(error.code);
                self.events.emit(&BridgeEvent::StreamError {
                    request_id,
                    code: error.code,
                });
                return Err(error);
            }
        };

        let stream = weft_stream::with_cancellation(stream, signal);
        let stream = self.observe_stream(stream, request_id, ctx_handle);

        Ok(self.frontend.from_ir_stream(stream))
    }

    /// Wrap a chunk stream with event emission and context counters.
    fn observe_stream(
        &self,
        mut stream: weft_ir::ChunkStream,
        request_id: String,
        ctx: Context,
    ) -> weft_ir::ChunkStream {
        let events = self.events.clone();

        Box::pin(async_stream::stream! {
            let mut terminated = false;

            while let Some(item) = stream.next().await {
                match &item {
                    Ok(chunk) => {
                        ctx.note_chunk();
                        events.emit(&BridgeEvent::StreamChunk {
                            request_id: request_id.clone(),
                            sequence: chunk.sequence(),
                        });

                        if let weft_ir::StreamChunk::Error { error, .. } = chunk {
                            terminated = true;
                            events.emit(&BridgeEvent::StreamError {
                                request_id: request_id.clone(),
                                code: error.code,
                            });
                        } else if chunk.is_done() {
                            terminated = true;
                            ctx.mark_stream_complete();
                            events.emit(&BridgeEvent::StreamComplete {
                                request_id: request_id.clone(),
                            });
                        }
                    }
                    Err(error) => {
                        terminated = true;
                        events.emit(&BridgeEvent::StreamError {
                            request_id: request_id.clone(),
                            code: error.code,
                        });
                    }
                }

                yield item;
            }

            if !terminated {
                ctx.mark_stream_complete();
                events.emit(&BridgeEvent::StreamComplete {
                    request_id: request_id.clone(),
                });
            }
        })
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
