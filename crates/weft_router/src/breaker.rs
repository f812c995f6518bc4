//! Per-backend circuit breaker.
//!
//! Closed: requests flow, consecutive failures count up. Open: requests are
//! rejected outright until the timeout elapses. Half-open: exactly one probe
//! is admitted; its outcome decides between closed and another open period.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weft_ir::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub threshold: u32,

    /// How long the circuit stays open before admitting a probe.
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { probing: bool },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Ask to perform a call for `backend`.
    ///
    /// Open circuits reject with a `circuit_open` error until the timeout
    /// elapses, at which point the circuit half-opens and admits exactly one
    /// probe.
    pub fn try_acquire(&self, backend: &str) -> Result<()> {
        let mut state = self.state.lock();

        match &mut *state {
            State::Closed { .. } => Ok(()),
            State::Open { until } => {
                if Instant::now() < *until {
                    return Err(Error::circuit_open(backend));
                }

                debug!(backend, "Circuit timeout elapsed, admitting half-open probe.");
                *state = State::HalfOpen { probing: true };
                Ok(())
            }
            State::HalfOpen { probing } => {
                if *probing {
                    return Err(Error::circuit_open(backend));
                }

                *probing = true;
                Ok(())
            }
        }
    }

    /// Record a successful call. Returns `true` when this closed the
    /// circuit.
    pub fn record_success(&self) -> bool {
        let mut state = self.state.lock();
        let was_recovering = !matches!(*state, State::Closed { .. });

        *state = State::Closed {
            consecutive_failures: 0,
        };
        was_recovering
    }

    /// Record a failed call. Returns `true` when this opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut state = self.state.lock();

        match &mut *state {
            State::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures < self.config.threshold {
                    return false;
                }

                *state = State::Open {
                    until: Instant::now() + self.config.timeout,
                };
                true
            }
            State::HalfOpen { .. } => {
                *state = State::Open {
                    until: Instant::now() + self.config.timeout,
                };
                true
            }
            State::Open { until } => {
                *until = Instant::now() + self.config.timeout;
                false
            }
        }
    }

    /// Manually open the circuit, optionally overriding the timeout.
    pub fn force_open(&self, timeout: Option<Duration>) {
        info!("Circuit breaker forced open.");
        *self.state.lock() = State::Open {
            until: Instant::now() + timeout.unwrap_or(self.config.timeout),
        };
    }

    pub fn force_close(&self) {
        info!("Circuit breaker forced closed.");
        *self.state.lock() = State::Closed {
            consecutive_failures: 0,
        };
    }

    /// Zero the failure counter without changing an open circuit's timer.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if let State::Closed {
            consecutive_failures,
        } = &mut *state
        {
            *consecutive_failures = 0;
        }
    }

    /// Whether calls would currently be rejected.
    #[must_use]
    pub fn is_open(&self) -> bool {
        match &*self.state.lock() {
            State::Open { until } => Instant::now() < *until,
            State::Closed { .. } => false,
            State::HalfOpen { probing } => *probing,
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        match &*self.state.lock() {
            State::Closed { .. } => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        match &*self.state.lock() {
            State::Closed {
                consecutive_failures,
            } => *consecutive_failures,
            _ => 0,
        }
    }
}
