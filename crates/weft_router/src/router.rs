//! Backend selection, fallback orchestration and dispatch.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_stream::stream;
use async_trait::async_trait;
use fancy_regex::Regex;
use futures::StreamExt as _;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::RngExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_adapter::{Backend, Capabilities, ListModelsOptions, ModelListing, ModelSource};
use weft_ir::{
    ChatRequest, ChatResponse, ChunkStream, Error, ErrorCode, Result, StreamChunk, Warning,
    warning,
};

use crate::{
    breaker::{BreakerConfig, CircuitState},
    dispatch::{ParallelDispatchResult, ParallelOptions, ParallelOutcome, ParallelStrategy},
    registry::{BackendEntry, BackendInfo, RegisterOptions},
    stats::{GlobalStatsInner, RouterStats},
    strategy::{FallbackStrategy, RouteContext, RouteStrategy},
    translate::TranslationConfig,
};

#[derive(Clone, Default)]
pub struct RouterConfig {
    /// Router name, stamped into response provenance.
    pub name: String,

    /// Used by the explicit strategy when the caller names no backend.
    pub default_backend: Option<String>,

    pub strategy: RouteStrategy,

    pub fallback: FallbackStrategy,

    /// Exact model → backend routes, consulted before pattern routes.
    pub model_mapping: IndexMap<String, String>,

    /// Regex model routes, highest priority first.
    pub model_patterns: Vec<crate::strategy::ModelPatternMapping>,

    pub translation: TranslationConfig,

    pub breaker: BreakerConfig,

    /// `Some` enables the periodic health-check task.
    pub health_check_interval: Option<Duration>,
}

impl RouterConfig {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() {
            "router".to_owned()
        } else {
            self.name.clone()
        }
    }
}

/// Router lifecycle events, including every circuit-breaker transition.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    BackendSelected {
        request_id: String,
        backend: String,
    },
    Failover {
        request_id: String,
        from: String,
        to: String,
    },
    BreakerTransition {
        backend: String,
        state: CircuitState,
    },
    HealthChanged {
        backend: String,
        healthy: bool,
    },
}

pub type RouterEventListener = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// Per-request routing options.
#[derive(Clone, Default)]
pub struct RouteOptions {
    /// Caller-preferred backend; overrides the strategy.
    pub backend: Option<String>,

    pub signal: Option<CancellationToken>,
}

/// A backend multiplexer.
///
/// Owns its registered backends and their runtime records (health, breaker,
/// stats) in a flat registry keyed by name. The router is itself a
/// [`Backend`], so a bridge can hold either without caring which.
pub struct Router {
    config: RouterConfig,
    name: String,
    backends: RwLock<IndexMap<String, Arc<BackendEntry>>>,
    round_robin: AtomicUsize,
    global: Arc<Mutex<GlobalStatsInner>>,
    listeners: Arc<Mutex<Vec<RouterEventListener>>>,
    health_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Router {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        let name = config.display_name();
        Self {
            config,
            name,
            backends: RwLock::new(IndexMap::new()),
            round_robin: AtomicUsize::new(0),
            global: Arc::new(Mutex::new(GlobalStatsInner::default())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            health_task: Mutex::new(None),
        }
    }

    // ---- registry ----------------------------------------------------

    pub fn register(&self, backend: Arc<dyn Backend>) {
        self.register_with(backend, RegisterOptions::default());
    }

    pub fn register_with(&self, backend: Arc<dyn Backend>, options: RegisterOptions) {
        let name = backend.name().to_owned();
        let entry = Arc::new(BackendEntry::new(
            backend,
            self.config.breaker.clone(),
            options,
        ));

        info!(backend = name, "Registered backend.");
        self.backends.write().insert(name, entry);
    }

    pub fn deregister(&self, name: &str) -> bool {
        self.backends.write().shift_remove(name).is_some()
    }

    #[must_use]
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn backend_info(&self, name: &str) -> Option<BackendInfo> {
        self.backends.read().get(name).map(|entry| entry.info(name))
    }

    #[must_use]
    pub fn backend_infos(&self) -> Vec<BackendInfo> {
        self.backends
            .read()
            .iter()
            .map(|(name, entry)| entry.info(name))
            .collect()
    }

    fn entry(&self, name: &str) -> Result<Arc<BackendEntry>> {
        self.backends
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::no_backend(format!("unknown backend {name}")))
    }

    /// Healthy, non-short-circuited backends in registration order.
    fn available(&self) -> Vec<(String, Arc<BackendEntry>)> {
        self.backends
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_available())
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect()
    }

    // ---- events ------------------------------------------------------

    pub fn on_event(&self, listener: RouterEventListener) {
        self.listeners.lock().push(listener);
    }

    fn emit(&self, event: &RouterEvent) {
        emit_to(&self.listeners, event);
    }

    // ---- circuit breaker surface ------------------------------------

    pub fn open_circuit_breaker(&self, name: &str, timeout: Option<Duration>) {
        if let Ok(entry) = self.entry(name) {
            entry.breaker.force_open(timeout);
            self.emit(&RouterEvent::BreakerTransition {
                backend: name.to_owned(),
                state: CircuitState::Open,
            });
        }
    }

    pub fn close_circuit_breaker(&self, name: &str) {
        if let Ok(entry) = self.entry(name) {
            entry.breaker.force_close();
            self.emit(&RouterEvent::BreakerTransition {
                backend: name.to_owned(),
                state: CircuitState::Closed,
            });
        }
    }

    /// Zero failure counters for one backend, or for all of them.
    pub fn reset_circuit_breaker(&self, name: Option<&str>) {
        match name {
            Some(name) => {
                if let Ok(entry) = self.entry(name) {
                    entry.breaker.reset();
                }
            }
            None => {
                for entry in self.backends.read().values() {
                    entry.breaker.reset();
                }
            }
        }
    }

    #[must_use]
    pub fn is_circuit_breaker_open(&self, name: &str) -> bool {
        self.entry(name).map(|e| e.breaker.is_open()).unwrap_or(false)
    }

    // ---- selection ---------------------------------------------------

    fn select_backend(&self, request: &ChatRequest) -> Result<String> {
        self.select_by_strategy(&self.config.strategy, request)
    }

    fn select_by_strategy(
        &self,
        strategy: &RouteStrategy,
        request: &ChatRequest,
    ) -> Result<String> {
        // Explicit and mapped selections may name a short-circuited backend
        // on purpose (the breaker rejection is the caller-visible signal);
        // only the list-based strategies restrict themselves to available
        // backends.
        let available = self.available();
        let ensure_available = || {
            if available.is_empty() {
                Err(Error::no_backend("no healthy backend available"))
            } else {
                Ok(())
            }
        };

        match strategy {
            RouteStrategy::Explicit => self
                .config
                .default_backend
                .clone()
                .ok_or_else(|| Error::no_backend("no preferred or default backend configured")),

            RouteStrategy::ModelBased { fallthrough } => {
                if let Some(model) = request.model() {
                    if let Some(backend) = self.config.model_mapping.get(model) {
                        return Ok(backend.clone());
                    }

                    let mut patterns = self.config.model_patterns.clone();
                    patterns.sort_by_key(|p| std::cmp::Reverse(p.priority));
                    for pattern in &patterns {
                        let matched = Regex::new(&pattern.pattern)
                            .ok()
                            .and_then(|regex| regex.is_match(model).ok())
                            .unwrap_or(false);
                        if matched {
                            return Ok(pattern.backend.clone());
                        }
                    }
                }

                self.select_by_strategy(fallthrough, request)
            }

            RouteStrategy::RoundRobin => {
                ensure_available()?;
                let index = self.round_robin.fetch_add(1, Ordering::SeqCst) % available.len();
                Ok(available[index].0.clone())
            }

            RouteStrategy::Random => {
                ensure_available()?;
                let index = rand::rng().random_range(0..available.len());
                Ok(available[index].0.clone())
            }

            RouteStrategy::CostOptimized => {
                ensure_available()?;
                let chosen = available
                    .iter()
                    .map(|(name, entry)| {
                        let cost = entry
                            .adapter
                            .estimate_cost(request)
                            .or_else(|| entry.stats.lock().snapshot().avg_cost)
                            .unwrap_or(f64::INFINITY);
                        (name, cost)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(name, _)| name.clone());

                Ok(chosen.unwrap_or_else(|| available[0].0.clone()))
            }

            RouteStrategy::LatencyOptimized => {
                ensure_available()?;
                let chosen = available
                    .iter()
                    .map(|(name, entry)| {
                        let latency = entry
                            .stats
                            .lock()
                            .reservoir
                            .mean()
                            .unwrap_or(f64::INFINITY);
                        (name, latency)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(name, _)| name.clone());

                Ok(chosen.unwrap_or_else(|| available[0].0.clone()))
            }

            RouteStrategy::CapabilityBased { weights } => {
                ensure_available()?;
                if !weights.is_valid() {
                    return Err(Error::validation(
                        "capability routing weights must be non-negative and sum to 1.0",
                    ));
                }

                let chosen = available
                    .iter()
                    .map(|(name, entry)| (name, weights.score(&entry.profile)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(name, _)| name.clone());

                Ok(chosen.unwrap_or_else(|| available[0].0.clone()))
            }

            RouteStrategy::Custom(selector) => {
                ensure_available()?;
                let infos: Vec<BackendInfo> = available
                    .iter()
                    .map(|(name, entry)| entry.info(name))
                    .collect();
                let context = RouteContext { stats: self.stats() };

                selector(request, &infos, &context)
                    .ok_or_else(|| Error::no_backend("custom selector returned no backend"))
            }
        }
    }

    fn next_fallback(
        &self,
        request: &ChatRequest,
        failed: &str,
        error: &Error,
        attempted: &[String],
    ) -> Option<String> {
        let remaining: Vec<String> = match &self.config.fallback {
            FallbackStrategy::None | FallbackStrategy::Parallel => return None,
            FallbackStrategy::Sequential => self
                .available()
                .into_iter()
                .map(|(name, _)| name)
                .filter(|name| !attempted.contains(name))
                .collect(),
            FallbackStrategy::SequentialChain(chain) => chain
                .iter()
                .filter(|name| !attempted.contains(*name))
                .filter(|name| {
                    self.backends
                        .read()
                        .get(*name)
                        .is_some_and(|e| e.is_available())
                })
                .cloned()
                .collect(),
            FallbackStrategy::Custom(delegate) => {
                let available: Vec<String> =
                    self.available().into_iter().map(|(name, _)| name).collect();
                return delegate(request, failed, error, attempted, &available);
            }
        };

        remaining.into_iter().next()
    }

    // ---- unary execution ---------------------------------------------

    pub async fn execute_with_options(
        &self,
        request: ChatRequest,
        options: RouteOptions,
    ) -> Result<ChatResponse> {
        self.global.lock().total_requests += 1;

        let mut attempted: Vec<String> = Vec::new();
        let mut current = match &options.backend {
            Some(backend) => backend.clone(),
            None => self.select_backend(&request)?,
        };

        loop {
            attempted.push(current.clone());
            let entry = self.entry(&current)?;
            self.emit(&RouterEvent::BackendSelected {
                request_id: request.metadata.request_id.clone(),
                backend: current.clone(),
            });

            let outcome = call_entry(
                &current,
                &entry,
                &self.name,
                &self.config.translation,
                &self.listeners,
                request.clone(),
                options.signal.clone(),
            )
            .await;

            let error = match outcome {
                Ok(response) => {
                    self.global.lock().successful_requests += 1;
                    return Ok(response);
                }
                Err(error) => error,
            };

            warn!(
                backend = current,
                error = error.to_string(),
                "Backend call failed."
            );

            // Non-retryable failures short-circuit fallback; a breaker
            // rejection is the one non-retryable case worth moving past.
            let can_fallback =
                error.is_retryable() || error.code == ErrorCode::CircuitOpen;

            if can_fallback && matches!(self.config.fallback, FallbackStrategy::Parallel) {
                let remaining: Vec<String> = self
                    .available()
                    .into_iter()
                    .map(|(name, _)| name)
                    .filter(|name| !attempted.contains(name))
                    .collect();

                if !remaining.is_empty() {
                    self.global.lock().total_fallbacks += 1;
                    let dispatched = self
                        .dispatch_parallel(request, ParallelOptions {
                            backends: Some(remaining),
                            signal: options.signal.clone(),
                            ..ParallelOptions::default()
                        })
                        .await;

                    return match dispatched {
                        Ok(result) => {
                            self.global.lock().successful_requests += 1;
                            Ok(result.response)
                        }
                        Err(error) => {
                            self.global.lock().failed_requests += 1;
                            Err(error)
                        }
                    };
                }
            }

            let next = if can_fallback {
                self.next_fallback(&request, &current, &error, &attempted)
            } else {
                None
            };

            match next {
                Some(next) => {
                    info!(from = current, to = next, "Failing over.");
                    self.emit(&RouterEvent::Failover {
                        request_id: request.metadata.request_id.clone(),
                        from: current.clone(),
                        to: next.clone(),
                    });
                    self.global.lock().total_fallbacks += 1;
                    current = next;
                }
                None => {
                    self.global.lock().failed_requests += 1;
                    return Err(error);
                }
            }
        }
    }

    // ---- streaming execution -----------------------------------------

    /// Open a chunk stream, transparently failing over while nothing has
    /// been delivered.
    ///
    /// Pre-content chunks are buffered: a backend that dies before its first
    /// content chunk leaves no trace, and the replacement backend's `start`
    /// is the one the caller sees. Once content has been observed the stream
    /// is non-idempotent and errors propagate.
    pub async fn execute_stream_with_options(
        &self,
        request: ChatRequest,
        options: RouteOptions,
    ) -> Result<ChunkStream> {
        self.global.lock().total_requests += 1;

        let first = match &options.backend {
            Some(backend) => backend.clone(),
            None => self.select_backend(&request)?,
        };

        let mut candidates: Vec<(String, Arc<BackendEntry>)> = vec![(first.clone(), self.entry(&first)?)];
        if !matches!(self.config.fallback, FallbackStrategy::None) {
            for (name, entry) in self.available() {
                if name != first {
                    candidates.push((name, entry));
                }
            }
        }

        let router_name = self.name.clone();
        let translation = self.config.translation.clone();
        let listeners = Arc::clone(&self.listeners);
        let global = Arc::clone(&self.global);
        let signal = options.signal.clone();

        let candidate_names: Vec<String> =
            candidates.iter().map(|(name, _)| name.clone()).collect();

        Ok(Box::pin(stream! {
            let total = candidates.len();
            let mut delivered_content = false;
            let mut last_error: Option<Error> = None;

            'candidates: for (index, (name, entry)) in candidates.into_iter().enumerate() {
                if entry.breaker.try_acquire(&name).is_err() {
                    last_error = Some(Error::circuit_open(&name));
                    continue;
                }

                let mut request = request.clone();
                let mut pending: Vec<Warning> = Vec::new();
                if let Some(model) = request.model().map(ToOwned::to_owned) {
                    match translation.resolve(&model, &name, &entry.adapter.capabilities()) {
                        Ok(Some(substitution)) => {
                            request.parameters.model = Some(substitution.model.clone());
                            pending.push(substitution.warning);
                        }
                        Ok(None) => {}
                        Err(error) => {
                            last_error = Some(error);
                            continue;
                        }
                    }
                }

                if index > 0 {
                    emit_to(&listeners, &RouterEvent::Failover {
                        request_id: request.metadata.request_id.clone(),
                        from: candidate_names[index - 1].clone(),
                        to: name.clone(),
                    });
                    global.lock().total_fallbacks += 1;
                } else {
                    emit_to(&listeners, &RouterEvent::BackendSelected {
                        request_id: request.metadata.request_id.clone(),
                        backend: name.clone(),
                    });
                }

                let started = Instant::now();
                let mut inner = match entry.adapter.execute_stream(request.clone(), signal.clone()).await {
                    Ok(inner) => inner,
                    Err(error) => {
                        record_stream_failure(&entry, started.elapsed(), &error);
                        if error.is_retryable() && index + 1 < total {
                            last_error = Some(error);
                            continue;
                        }

                        global.lock().failed_requests += 1;
                        yield Err(error);
                        return;
                    }
                };

                let mut buffered: Vec<StreamChunk> = Vec::new();

                while let Some(item) = inner.next().await {
                    match item {
                        Ok(chunk) => {
                            if let StreamChunk::Error { error, .. } = &chunk
                                && !delivered_content
                            {
                                let error = Error::new(error.code, error.message.clone());
                                record_stream_failure(&entry, started.elapsed(), &error);

                                if error.is_retryable() && index + 1 < total {
                                    debug!(backend = name, "Stream failed before content, trying next backend.");
                                    last_error = Some(error);
                                    continue 'candidates;
                                }

                                global.lock().failed_requests += 1;
                                yield Ok(chunk);
                                return;
                            }

                            if chunk.is_content() && !delivered_content {
                                delivered_content = true;
                                for mut held in buffered.drain(..) {
                                    if let StreamChunk::Start { metadata, .. } = &mut held {
                                        metadata.provenance.router.get_or_insert_with(|| router_name.clone());
                                        metadata.warnings = warning::merge(&[&metadata.warnings, &pending]);
                                    }
                                    yield Ok(held);
                                }
                            }

                            if delivered_content {
                                let is_terminal = chunk.is_terminal();
                                let is_done = chunk.is_done();
                                yield Ok(chunk);

                                if is_terminal {
                                    finish_stream(&entry, &global, started.elapsed(), is_done);
                                    return;
                                }
                            } else if chunk.is_done() {
                                // A legitimate empty response.
                                for held in buffered.drain(..) {
                                    yield Ok(held);
                                }
                                yield Ok(chunk);
                                finish_stream(&entry, &global, started.elapsed(), true);
                                return;
                            } else {
                                buffered.push(chunk);
                            }
                        }
                        Err(error) => {
                            record_stream_failure(&entry, started.elapsed(), &error);

                            if !delivered_content && error.is_retryable() && index + 1 < total {
                                last_error = Some(error);
                                continue 'candidates;
                            }

                            global.lock().failed_requests += 1;
                            yield Err(error);
                            return;
                        }
                    }
                }

                // Stream ended without a terminal chunk.
                for held in buffered.drain(..) {
                    yield Ok(held);
                }
                finish_stream(&entry, &global, started.elapsed(), true);
                return;
            }

            global.lock().failed_requests += 1;
            yield Err(last_error.unwrap_or_else(|| Error::no_backend("no healthy backend available")));
        }))
    }

    // ---- parallel dispatch -------------------------------------------

    pub async fn dispatch_parallel(
        &self,
        request: ChatRequest,
        options: ParallelOptions,
    ) -> Result<ParallelDispatchResult> {
        self.global.lock().parallel_requests += 1;

        let names: Vec<String> = match options.backends {
            Some(names) => names,
            None => self.available().into_iter().map(|(name, _)| name).collect(),
        };
        if names.is_empty() {
            return Err(Error::no_backend("no backend to dispatch to"));
        }

        let parent = options.signal.unwrap_or_default();
        let siblings = parent.child_token();

        let mut join = tokio::task::JoinSet::new();
        for name in names {
            let entry = self.entry(&name)?;
            let translation = self.config.translation.clone();
            let listeners = Arc::clone(&self.listeners);
            let router_name = self.name.clone();
            let request = request.clone();
            let signal = siblings.child_token();

            join.spawn(async move {
                let started = Instant::now();
                let result = call_entry(
                    &name,
                    &entry,
                    &router_name,
                    &translation,
                    &listeners,
                    request,
                    Some(signal),
                )
                .await;

                ParallelOutcome {
                    backend: name,
                    latency: started.elapsed(),
                    result,
                }
            });
        }

        let collect = async {
            let mut outcomes: Vec<ParallelOutcome> = Vec::new();
            let mut first_success: Option<usize> = None;

            while let Some(joined) = join.join_next().await {
                let Ok(outcome) = joined else { continue };

                if outcome.result.is_ok() && first_success.is_none() {
                    first_success = Some(outcomes.len());

                    if options.cancel_on_first_success
                        && matches!(options.strategy, ParallelStrategy::First)
                    {
                        debug!(backend = outcome.backend, "First success, cancelling siblings.");
                        siblings.cancel();
                    }
                }

                outcomes.push(outcome);
            }

            (outcomes, first_success)
        };

        let (outcomes, first_success) = match options.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, collect).await {
                Ok(collected) => collected,
                Err(_) => {
                    siblings.cancel();
                    return Err(Error::timeout("parallel dispatch deadline exceeded"));
                }
            },
            None => collect.await,
        };

        let winner = match &options.strategy {
            ParallelStrategy::First | ParallelStrategy::All => first_success,
            ParallelStrategy::Fastest => outcomes
                .iter()
                .enumerate()
                .filter(|(_, o)| o.result.is_ok())
                .min_by_key(|(_, o)| o.latency)
                .map(|(index, _)| index),
            ParallelStrategy::Custom(aggregator) => aggregator(&outcomes),
        };

        let latencies: IndexMap<String, Duration> = outcomes
            .iter()
            .map(|o| (o.backend.clone(), o.latency))
            .collect();
        let successful_backends: Vec<String> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.backend.clone())
            .collect();
        let failed_backends: Vec<(String, Error)> = outcomes
            .iter()
            .filter_map(|o| match &o.result {
                Err(error) if error.code != ErrorCode::Cancelled => {
                    Some((o.backend.clone(), error.clone()))
                }
                _ => None,
            })
            .collect();

        let Some(winner) = winner else {
            let details: serde_json::Value = failed_backends
                .iter()
                .map(|(name, error)| (name.clone(), serde_json::json!(error.code.as_str())))
                .collect::<serde_json::Map<_, _>>()
                .into();

            return Err(Error::provider("all parallel backends failed", false)
                .with_details(details));
        };

        let mut outcomes = outcomes;
        let outcome = outcomes.swap_remove(winner);
        match outcome.result {
            Ok(response) => Ok(ParallelDispatchResult {
                response,
                backend: outcome.backend,
                latencies,
                successful_backends,
                failed_backends,
            }),
            // A custom aggregator picked a failed outcome.
            Err(error) => Err(error),
        }
    }

    // ---- statistics --------------------------------------------------

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let global = self.global.lock().clone();

        RouterStats {
            total_requests: global.total_requests,
            successful_requests: global.successful_requests,
            failed_requests: global.failed_requests,
            total_fallbacks: global.total_fallbacks,
            parallel_requests: global.parallel_requests,
            backends: self
                .backends
                .read()
                .iter()
                .map(|(name, entry)| (name.clone(), entry.stats.lock().snapshot()))
                .collect(),
            since: global.since,
        }
    }

    /// Snapshot the current statistics, then zero everything.
    pub fn reset_stats(&self) -> RouterStats {
        let snapshot = self.stats();

        *self.global.lock() = GlobalStatsInner::default();
        for entry in self.backends.read().values() {
            *entry.stats.lock() = crate::stats::BackendStatsInner::default();
        }

        snapshot
    }

    // ---- health checks -----------------------------------------------

    /// Probe every backend once, updating health flags and breakers.
    pub async fn run_health_checks(&self) {
        let entries: Vec<(String, Arc<BackendEntry>)> = self
            .backends
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        for (name, entry) in entries {
            let healthy = entry.adapter.health_check().await.is_ok();
            *entry.last_health_check.lock() = Some(time::OffsetDateTime::now_utc());

            let was_healthy = entry.is_healthy();
            entry
                .healthy
                .store(healthy, Ordering::SeqCst);

            if !healthy {
                entry.breaker.record_failure();
            }

            if was_healthy != healthy {
                info!(backend = name, healthy, "Backend health changed.");
                self.emit(&RouterEvent::HealthChanged {
                    backend: name,
                    healthy,
                });
            }
        }
    }

    /// Start the periodic health task, if an interval is configured.
    pub fn start_health_checks(self: &Arc<Self>) {
        let Some(interval) = self.config.health_check_interval else {
            return;
        };

        let router = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                router.run_health_checks().await;
            }
        });

        if let Some(previous) = self.health_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_health_checks(&self) {
        if let Some(handle) = self.health_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop_health_checks();
    }
}

/// One guarded backend call: breaker admission, model translation, timing,
/// stats and breaker bookkeeping.
async fn call_entry(
    name: &str,
    entry: &Arc<BackendEntry>,
    router_name: &str,
    translation: &TranslationConfig,
    listeners: &Arc<Mutex<Vec<RouterEventListener>>>,
    mut request: ChatRequest,
    signal: Option<CancellationToken>,
) -> Result<ChatResponse> {
    entry.breaker.try_acquire(name)?;

    let mut pending: Vec<Warning> = Vec::new();
    if let Some(model) = request.model().map(ToOwned::to_owned) {
        if let Some(substitution) =
            translation.resolve(&model, name, &entry.adapter.capabilities())?
        {
            request.parameters.model = Some(substitution.model.clone());
            pending.push(substitution.warning);
        }
    }

    let started = Instant::now();
    let result = entry.adapter.execute(request.clone(), signal).await;
    let latency = started.elapsed();

    match result {
        Ok(mut response) => {
            let cost = entry.adapter.estimate_cost(&request);
            entry.stats.lock().record_success(latency, cost);
            if entry.breaker.record_success() {
                emit_to(listeners, &RouterEvent::BreakerTransition {
                    backend: name.to_owned(),
                    state: CircuitState::Closed,
                });
            }

            response
                .metadata
                .provenance
                .router
                .get_or_insert_with(|| router_name.to_owned());
            if !pending.is_empty() {
                response.metadata.warnings =
                    warning::merge(&[&response.metadata.warnings, &pending]);
            }

            Ok(response)
        }
        Err(error) => {
            if error.code != ErrorCode::Cancelled {
                entry.stats.lock().record_failure(latency);
                if entry.breaker.record_failure() {
                    warn!(backend = name, "Circuit breaker opened.");
                    emit_to(listeners, &RouterEvent::BreakerTransition {
                        backend: name.to_owned(),
                        state: CircuitState::Open,
                    });
                }
            }

            Err(error)
        }
    }
}

fn record_stream_failure(entry: &Arc<BackendEntry>, latency: Duration, error: &Error) {
    if error.code == ErrorCode::Cancelled {
        return;
    }

    entry.stats.lock().record_failure(latency);
    entry.breaker.record_failure();
}

fn finish_stream(
    entry: &Arc<BackendEntry>,
    global: &Arc<Mutex<GlobalStatsInner>>,
    latency: Duration,
    success: bool,
) {
    if success {
        entry.stats.lock().record_success(latency, None);
        entry.breaker.record_success();
        global.lock().successful_requests += 1;
    } else {
        entry.stats.lock().record_failure(latency);
        global.lock().failed_requests += 1;
    }
}

fn emit_to(listeners: &Arc<Mutex<Vec<RouterEventListener>>>, event: &RouterEvent) {
    let listeners = listeners.lock().clone();
    for listener in listeners {
        listener(event);
    }
}

// The router satisfies the backend contract itself, so a bridge can own a
// plain adapter or a whole routing mesh through the same seam.
#[async_trait]
impl Backend for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn execute(
        &self,
        request: ChatRequest,
        signal: Option<CancellationToken>,
    ) -> Result<ChatResponse> {
        self.execute_with_options(request, RouteOptions {
            backend: None,
            signal,
        })
        .await
    }

    async fn execute_stream(
        &self,
        request: ChatRequest,
        signal: Option<CancellationToken>,
    ) -> Result<ChunkStream> {
        self.execute_stream_with_options(request, RouteOptions {
            backend: None,
            signal,
        })
        .await
    }

    async fn health_check(&self) -> Result<()> {
        if self.backends.read().values().any(|e| e.is_healthy()) {
            Ok(())
        } else {
            Err(Error::no_backend("no healthy backend available"))
        }
    }

    /// The union of every registered backend's models.
    async fn list_models(&self, options: ListModelsOptions) -> Result<ModelListing> {
        let entries: Vec<Arc<BackendEntry>> =
            self.backends.read().values().cloned().collect();

        let mut models = Vec::new();
        let mut is_complete = true;
        for entry in entries {
            let listing = entry.adapter.list_models(options.clone()).await?;
            is_complete &= listing.is_complete;
            for model in listing.models {
                if !models.iter().any(|m: &weft_adapter::ModelInfo| m.id == model.id) {
                    models.push(model);
                }
            }
        }

        Ok(ModelListing {
            models,
            source: ModelSource::Remote,
            fetched_at: time::OffsetDateTime::now_utc(),
            is_complete,
        })
    }

    fn invalidate_model_cache(&self) {
        for entry in self.backends.read().values() {
            entry.adapter.invalidate_model_cache();
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
