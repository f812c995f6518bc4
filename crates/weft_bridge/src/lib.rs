//! The caller-facing entry point of the fabric.
//!
//! A [`Bridge`] binds one frontend adapter to one backend — a single
//! provider adapter or a whole [`weft_router::Router`] — with an owned
//! middleware stack, an event bus and aggregate statistics. The guard
//! module carries the transport-side helpers HTTP surfaces share: a
//! windowed rate limiter and timing-safe credential validators.

pub mod bridge;
pub mod event;
pub mod guard;
pub mod stats;

pub use bridge::{Bridge, BridgeBackend, BridgeConfig, RequestOptions};
pub use event::{BridgeEvent, EventBus, EventKind, Subscription};
pub use guard::{
    RateLimiter, api_key_validator, basic_auth_validator, bearer_token_validator,
    timing_safe_eq,
};
pub use stats::BridgeStats;
