use std::sync::Arc;

use serde::{Deserialize, Serialize};
use weft_ir::ChatRequest;

use crate::registry::BackendInfo;

/// How the router picks a backend for a request.
#[derive(Clone, Default)]
pub enum RouteStrategy {
    /// The caller's preferred backend, or the configured default.
    Explicit,

    /// Exact model mapping, then priority-ordered pattern mappings; an
    /// unresolved model falls through to the inner strategy.
    ModelBased {
        fallthrough: Box<RouteStrategy>,
    },

    /// Monotonic counter modulo the healthy backends.
    #[default]
    RoundRobin,

    /// Uniform over the healthy backends.
    Random,

    /// Minimum estimated (or observed average) cost.
    CostOptimized,

    /// Minimum observed average latency.
    LatencyOptimized,

    /// Weighted capability-profile score, highest wins.
    CapabilityBased { weights: ScoreWeights },

    /// Caller-supplied selection over the available backends.
    Custom(CustomSelector),
}

/// Selection delegate: the request, the available backends, and a context
/// with their stats; returns the chosen backend name.
pub type CustomSelector =
    Arc<dyn Fn(&ChatRequest, &[BackendInfo], &RouteContext) -> Option<String> + Send + Sync>;

/// Extra inputs handed to a custom selector.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub stats: crate::stats::RouterStats,
}

/// Weights over the declared capability profile; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub cost: f64,
    pub speed: f64,
    pub quality: f64,
}

impl ScoreWeights {
    /// Preset leaning on cheap backends.
    #[must_use]
    pub fn cost() -> Self {
        Self {
            cost: 0.6,
            speed: 0.2,
            quality: 0.2,
        }
    }

    /// Preset leaning on fast backends.
    #[must_use]
    pub fn speed() -> Self {
        Self {
            cost: 0.2,
            speed: 0.6,
            quality: 0.2,
        }
    }

    /// Preset leaning on high-quality backends.
    #[must_use]
    pub fn quality() -> Self {
        Self {
            cost: 0.2,
            speed: 0.2,
            quality: 0.6,
        }
    }

    #[must_use]
    pub fn balanced() -> Self {
        Self {
            cost: 1.0 / 3.0,
            speed: 1.0 / 3.0,
            quality: 1.0 / 3.0,
        }
    }

    /// Caller-supplied weights must sum to 1.0 (within rounding).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let sum = self.cost + self.speed + self.quality;
        (sum - 1.0).abs() < 1e-6
            && self.cost >= 0.0
            && self.speed >= 0.0
            && self.quality >= 0.0
    }

    /// Weighted score of a profile; higher is better.
    #[must_use]
    pub fn score(&self, profile: &CapabilityProfile) -> f64 {
        self.cost * profile.cost + self.speed * profile.speed + self.quality * profile.quality
    }
}

/// Declared backend scores, each in [0, 1] with higher meaning better: a
/// cheap backend has `cost` near 1, a fast one `speed` near 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityProfile {
    pub cost: f64,
    pub speed: f64,
    pub quality: f64,
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self {
            cost: 0.5,
            speed: 0.5,
            quality: 0.5,
        }
    }
}

/// One regex-based model route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPatternMapping {
    /// Regex matched against the requested model id.
    pub pattern: String,

    pub backend: String,

    /// Higher priority patterns are consulted first.
    #[serde(default)]
    pub priority: i32,
}

/// What the router does after a backend fails.
#[derive(Clone, Default)]
pub enum FallbackStrategy {
    /// Surface the first failure.
    None,

    /// Try the next backend; the chain defaults to registration order minus
    /// the backends already tried.
    #[default]
    Sequential,

    /// Like sequential, with an explicit chain.
    SequentialChain(Vec<String>),

    /// Fire the remaining backends at once and take the first success.
    Parallel,

    /// Caller-supplied: `(request, failed_backend, error, attempted,
    /// available) -> next`.
    Custom(CustomFallback),
}

pub type CustomFallback = Arc<
    dyn Fn(&ChatRequest, &str, &weft_ir::Error, &[String], &[String]) -> Option<String>
        + Send
        + Sync,
>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for weights in [
            ScoreWeights::cost(),
            ScoreWeights::speed(),
            ScoreWeights::quality(),
            ScoreWeights::balanced(),
        ] {
            assert!(weights.is_valid(), "{weights:?}");
        }

        assert!(!ScoreWeights {
            cost: 0.5,
            speed: 0.5,
            quality: 0.5,
        }
        .is_valid());
    }

    #[test]
    fn score_is_a_weighted_sum() {
        let profile = CapabilityProfile {
            cost: 1.0,
            speed: 0.0,
            quality: 0.5,
        };
        let score = ScoreWeights::cost().score(&profile);
        assert!((score - (0.6 + 0.1)).abs() < 1e-9);
    }
}
