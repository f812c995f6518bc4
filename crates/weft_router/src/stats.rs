//! Per-backend and router-wide request statistics.
//!
//! Latency percentiles come from a bounded ring reservoir: the last
//! [`RESERVOIR_SIZE`] samples, sorted on demand. Good enough for routing
//! decisions, bounded in memory.

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Samples kept per backend.
pub const RESERVOIR_SIZE: usize = 256;

/// A windowed ring of latency samples.
#[derive(Debug, Clone)]
pub struct LatencyReservoir {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyReservoir {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency.as_secs_f64() * 1000.0);
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Nearest-rank percentile, `p` in [0, 100].
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        sorted.get(rank.min(sorted.len() - 1)).copied()
    }
}

impl Default for LatencyReservoir {
    fn default() -> Self {
        Self::new(RESERVOIR_SIZE)
    }
}

/// Mutable per-backend counters, kept behind the registry lock.
#[derive(Debug, Clone, Default)]
pub struct BackendStatsInner {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub reservoir: LatencyReservoir,
    pub total_cost: f64,
    pub cost_samples: u64,
}

impl BackendStatsInner {
    pub fn record_success(&mut self, latency: Duration, cost: Option<f64>) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.reservoir.record(latency);
        if let Some(cost) = cost {
            self.total_cost += cost;
            self.cost_samples += 1;
        }
    }

    pub fn record_failure(&mut self, latency: Duration) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.reservoir.record(latency);
    }

    #[must_use]
    pub fn snapshot(&self) -> BackendStats {
        BackendStats {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            success_rate: if self.total_requests == 0 {
                1.0
            } else {
                self.successful_requests as f64 / self.total_requests as f64
            },
            avg_latency_ms: self.reservoir.mean(),
            p50_latency_ms: self.reservoir.percentile(50.0),
            p95_latency_ms: self.reservoir.percentile(95.0),
            p99_latency_ms: self.reservoir.percentile(99.0),
            total_cost: (self.cost_samples > 0).then_some(self.total_cost),
            avg_cost: (self.cost_samples > 0)
                .then(|| self.total_cost / self.cost_samples as f64),
        }
    }
}

/// Read-only per-backend statistics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p50_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p99_latency_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_cost: Option<f64>,
}

/// Router-wide statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_fallbacks: u64,
    pub parallel_requests: u64,
    pub backends: indexmap::IndexMap<String, BackendStats>,

    #[serde(with = "time::serde::rfc3339")]
    pub since: OffsetDateTime,
}

/// Mutable router-wide counters.
#[derive(Debug, Clone)]
pub struct GlobalStatsInner {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_fallbacks: u64,
    pub parallel_requests: u64,
    pub since: OffsetDateTime,
}

impl Default for GlobalStatsInner {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_fallbacks: 0,
            parallel_requests: 0,
            since: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservoir_is_bounded_and_windowed() {
        let mut reservoir = LatencyReservoir::new(4);
        for ms in [10, 20, 30, 40, 50] {
            reservoir.record(Duration::from_millis(ms));
        }

        // The oldest sample (10ms) fell out of the window.
        assert_eq!(reservoir.mean(), Some(35.0));
        assert_eq!(reservoir.percentile(0.0), Some(20.0));
        assert_eq!(reservoir.percentile(100.0), Some(50.0));
    }

    #[test]
    fn percentiles_on_empty_reservoir_are_none() {
        let reservoir = LatencyReservoir::default();
        assert_eq!(reservoir.mean(), None);
        assert_eq!(reservoir.percentile(99.0), None);
    }

    #[test]
    fn snapshot_computes_success_rate_and_costs() {
        let mut inner = BackendStatsInner::default();
        inner.record_success(Duration::from_millis(100), Some(0.02));
        inner.record_success(Duration::from_millis(200), Some(0.04));
        inner.record_failure(Duration::from_millis(50));

        let stats = inner.snapshot();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.total_cost.unwrap() - 0.06).abs() < 1e-9);
        assert!((stats.avg_cost.unwrap() - 0.03).abs() < 1e-9);
    }
}
