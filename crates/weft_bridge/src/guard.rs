//! Transport-side guards shared by HTTP surfaces.
//!
//! A windowed in-memory rate limiter and credential validators built on a
//! constant-time byte comparison, so a string comparison's early exit never
//! leaks how much of a secret matched.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use parking_lot::Mutex;
use tracing::debug;

/// Fixed-window request limiter keyed by caller identity.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    store: Mutex<HashMap<String, Window>>,
    disposed: AtomicBool,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            store: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Count one request for `key`. Returns `true` when the request was
    /// limited. A disposed limiter admits everything.
    pub fn check(&self, key: &str) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }

        let now = Instant::now();
        let mut store = self.store.lock();

        // Lazy pruning keeps the store bounded without a timer task.
        store.retain(|_, window| now.duration_since(window.started) < self.window);

        let window = store.entry(key.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });

        if window.count >= self.max {
            debug!(key, "Rate limit exceeded.");
            return true;
        }

        window.count += 1;
        false
    }

    /// Drop the in-memory store. Safe to call multiple times.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.store.lock().clear();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Constant-time byte comparison.
///
/// Always walks the longer of the two inputs and folds differences into an
/// accumulator, so the running time does not depend on the position of the
/// first differing byte.
#[must_use]
pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }

    diff == 0
}

/// A validator over a raw credential string (header value, key, …).
pub type CredentialValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Validates `Authorization: Bearer <token>` header values.
pub fn bearer_token_validator(expected: impl Into<String>) -> CredentialValidator {
    let expected = expected.into();

    Arc::new(move |header: &str| {
        header
            .strip_prefix("Bearer ")
            .is_some_and(|token| timing_safe_eq(token.as_bytes(), expected.as_bytes()))
    })
}

/// Validates a bare API key against an allow-list. Every candidate is
/// compared; there is no early exit on a match.
pub fn api_key_validator(keys: Vec<String>) -> CredentialValidator {
    Arc::new(move |candidate: &str| {
        let mut matched = false;
        for key in &keys {
            matched |= timing_safe_eq(candidate.as_bytes(), key.as_bytes());
        }
        matched
    })
}

/// Validates `Authorization: Basic <base64(user:pass)>` header values.
pub fn basic_auth_validator(
    username: impl Into<String>,
    password: impl Into<String>,
) -> CredentialValidator {
    let expected = format!("{}:{}", username.into(), password.into());

    Arc::new(move |header: &str| {
        let Some(encoded) = header.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };

        timing_safe_eq(&decoded, expected.as_bytes())
    })
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
