//! Retry as middleware.
//!
//! The policy is the sole controller of attempt count: the predicate only
//! classifies errors, it never bounds attempts by itself. Delays follow
//! exponential backoff capped at `max_delay`, with an optional symmetric
//! multiplicative jitter, and a provider-supplied `Retry-After` takes
//! precedence over the computed delay.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::RngExt as _;
use tracing::{debug, warn};
use weft_ir::{ChatResponse, Error, ErrorCode, Result};

use crate::{
    context::Context,
    stack::{Middleware, Next},
};

/// Which failures are worth another attempt.
#[derive(Clone, Default)]
pub enum RetryPredicate {
    /// Whatever the error itself claims via `is_retryable`.
    #[default]
    Retryable,

    /// Only rate-limit errors.
    RateLimit,

    /// Only transport errors.
    Network,

    /// Server-side provider errors the adapter marked retryable.
    Server,

    /// Caller-supplied classification; receives the error and the attempt
    /// number just performed.
    Custom(Arc<dyn Fn(&Error, u32) -> bool + Send + Sync>),
}

impl RetryPredicate {
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        match self {
            Self::Retryable => error.is_retryable(),
            Self::RateLimit => error.code == ErrorCode::RateLimit,
            Self::Network => error.code == ErrorCode::Network,
            Self::Server => error.code == ErrorCode::Provider && error.is_retryable(),
            Self::Custom(predicate) => predicate(error, attempt),
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    pub initial_delay: Duration,

    pub max_delay: Duration,

    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in `[1 - J, 1 + J]`.
    pub use_jitter: bool,

    pub predicate: RetryPredicate,
}

/// Jitter half-width.
const JITTER: f64 = 0.25;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
            predicate: RetryPredicate::Retryable,
        }
    }
}

impl RetryPolicy {
    /// The delay before the attempt after `attempt` (1-based), jitter
    /// excluded.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let factor = self.backoff_multiplier.powi(exponent as i32);
        let delay = self.initial_delay.mul_f64(factor.max(0.0));

        delay.min(self.max_delay)
    }

    fn delay_for(&self, error: &Error, attempt: u32) -> Duration {
        let delay = match error.retry_after {
            Some(retry_after) => retry_after.min(self.max_delay),
            None => self.backoff_delay(attempt),
        };

        if self.use_jitter {
            let factor = rand::rng().random_range(1.0 - JITTER..=1.0 + JITTER);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

/// The retry layer of the unary onion.
pub struct RetryMiddleware {
    name: String,
    policy: RetryPolicy,
}

impl RetryMiddleware {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            name: "retry".to_owned(),
            policy,
        }
    }
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: Context, next: Next) -> Result<ChatResponse> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match next.run(ctx.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if attempt >= self.policy.max_attempts
                || !self.policy.predicate.should_retry(&error, attempt)
            {
                warn!(
                    attempt,
                    max = self.policy.max_attempts,
                    error = error.to_string(),
                    "Giving up on request."
                );
                return Err(error);
            }

            let delay = self.policy.delay_for(&error, attempt);
            debug!(
                attempt,
                max = self.policy.max_attempts,
                delay_ms = delay.as_millis(),
                error = error.to_string(),
                "Retryable error, backing off."
            );

            // A cancelled request performs no further attempts.
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.signal.cancelled() => {
                    debug!(attempt, "Cancelled during retry backoff.");
                    return Err(Error::cancelled());
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
