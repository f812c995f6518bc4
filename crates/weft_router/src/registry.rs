use std::sync::{Arc, atomic::AtomicBool};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use time::OffsetDateTime;
use weft_adapter::Backend;

use crate::{
    breaker::{BreakerConfig, CircuitBreaker, CircuitState},
    stats::{BackendStats, BackendStatsInner},
    strategy::CapabilityProfile,
};

/// Registration-time extras for a backend.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Declared cost/speed/quality scores used by capability-based routing.
    pub profile: CapabilityProfile,

    /// Opaque caller metadata surfaced on [`BackendInfo`].
    pub metadata: IndexMap<String, Value>,
}

/// The router's internal record for one backend. Lives in a flat registry
/// keyed by name; cross-references resolve by lookup, never by pointer.
pub struct BackendEntry {
    pub adapter: Arc<dyn Backend>,
    pub breaker: CircuitBreaker,
    pub stats: Mutex<BackendStatsInner>,
    pub profile: CapabilityProfile,
    pub metadata: IndexMap<String, Value>,
    pub healthy: AtomicBool,
    pub last_health_check: Mutex<Option<OffsetDateTime>>,
}

impl BackendEntry {
    pub fn new(
        adapter: Arc<dyn Backend>,
        breaker_config: BreakerConfig,
        options: RegisterOptions,
    ) -> Self {
        Self {
            adapter,
            breaker: CircuitBreaker::new(breaker_config),
            stats: Mutex::new(BackendStatsInner::default()),
            profile: options.profile,
            metadata: options.metadata,
            healthy: AtomicBool::new(true),
            last_health_check: Mutex::new(None),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Healthy and not short-circuited: eligible for selection.
    pub fn is_available(&self) -> bool {
        self.is_healthy() && !self.breaker.is_open()
    }

    pub fn info(&self, name: &str) -> BackendInfo {
        BackendInfo {
            name: name.to_owned(),
            metadata: self.metadata.clone(),
            is_healthy: self.is_healthy(),
            last_health_check: *self.last_health_check.lock(),
            circuit_breaker_state: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
            profile: self.profile,
            stats: self.stats.lock().snapshot(),
        }
    }
}

/// Read-only snapshot of a registered backend's runtime state.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: String,
    pub metadata: IndexMap<String, Value>,
    pub is_healthy: bool,
    pub last_health_check: Option<OffsetDateTime>,
    pub circuit_breaker_state: CircuitState,
    pub consecutive_failures: u32,
    pub profile: CapabilityProfile,
    pub stats: BackendStats,
}
