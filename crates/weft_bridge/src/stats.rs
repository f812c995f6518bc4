use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use weft_ir::ErrorCode;
use weft_router::stats::LatencyReservoir;

/// Aggregate bridge statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub streaming_requests: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p50_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p99_latency_ms: Option<f64>,

    /// Requests per backend, keyed by provenance backend name.
    pub backend_usage: IndexMap<String, u64>,

    /// Failures keyed by taxonomy code.
    pub errors_by_code: IndexMap<String, u64>,

    #[serde(with = "time::serde::rfc3339")]
    pub since: OffsetDateTime,
}

/// Mutable counters behind the bridge's lock.
pub(crate) struct BridgeStatsInner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    streaming_requests: u64,
    reservoir: LatencyReservoir,
    backend_usage: IndexMap<String, u64>,
    errors_by_code: IndexMap<String, u64>,
    since: OffsetDateTime,
}

impl Default for BridgeStatsInner {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            streaming_requests: 0,
            reservoir: LatencyReservoir::default(),
            backend_usage: IndexMap::new(),
            errors_by_code: IndexMap::new(),
            since: OffsetDateTime::now_utc(),
        }
    }
}

impl BridgeStatsInner {
    pub(crate) fn record_success(&mut self, latency: std::time::Duration, backend: Option<&str>) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.reservoir.record(latency);
        if let Some(backend) = backend {
            *self.backend_usage.entry(backend.to_owned()).or_default() += 1;
        }
    }

    pub(crate) fn record_failure(&mut self, code: ErrorCode) {
        self.total_requests += 1;
        self.failed_requests += 1;
        *self
            .errors_by_code
            .entry(code.as_str().to_owned())
            .or_default() += 1;
    }

    pub(crate) fn record_stream(&mut self) {
        self.streaming_requests += 1;
    }

    pub(crate) fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            streaming_requests: self.streaming_requests,
            avg_latency_ms: self.reservoir.mean(),
            p50_latency_ms: self.reservoir.percentile(50.0),
            p95_latency_ms: self.reservoir.percentile(95.0),
            p99_latency_ms: self.reservoir.percentile(99.0),
            backend_usage: self.backend_usage.clone(),
            errors_by_code: self.errors_by_code.clone(),
            since: self.since,
        }
    }
}
