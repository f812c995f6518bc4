//! Backend routing: selection strategies, sequential and parallel fallback,
//! per-backend circuit breaking, model translation, latency statistics and
//! health checking.
//!
//! The [`Router`] multiplexes IR requests across registered backends and is
//! itself a [`weft_adapter::Backend`], so everything above it (bridges,
//! middleware) treats a single adapter and a routing mesh identically.

pub mod breaker;
pub mod dispatch;
pub mod registry;
pub mod router;
pub mod stats;
pub mod strategy;
pub mod translate;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use dispatch::{
    ParallelDispatchResult, ParallelOptions, ParallelOutcome, ParallelStrategy,
};
pub use registry::{BackendInfo, RegisterOptions};
pub use router::{RouteOptions, Router, RouterConfig, RouterEvent, RouterEventListener};
pub use stats::{BackendStats, RouterStats};
pub use strategy::{
    CapabilityProfile, FallbackStrategy, ModelPatternMapping, RouteStrategy, ScoreWeights,
};
pub use translate::{Substitution, TranslationConfig, TranslationStrategy};
