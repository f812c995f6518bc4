use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classification shared by every layer of the fabric.
///
/// Codes, not type names: adapters, the router and the bridge all speak this
/// taxonomy, and retry/fallback decisions key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request or parameter shape invalid.
    Validation,

    /// Transport failure.
    Network,

    /// Provider signalled a 429-equivalent.
    RateLimit,

    /// Server-side provider failure.
    Provider,

    /// Request or inter-chunk deadline exceeded.
    Timeout,

    /// Cooperative cancellation.
    Cancelled,

    /// The router refused the call because the breaker is open.
    CircuitOpen,

    /// Routing produced no candidate backend.
    NoBackend,

    /// A middleware failed with an error outside the taxonomy.
    Middleware,

    /// Capability, content type or parameter not supported by the backend.
    Unsupported,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Provider => "provider",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::CircuitOpen => "circuit_open",
            Self::NoBackend => "no_backend",
            Self::Middleware => "middleware",
            Self::Unsupported => "unsupported",
        }
    }

    /// Whether errors with this code are retryable absent an adapter
    /// override. `provider` errors default to non-retryable; adapters opt in
    /// via [`Error::with_retryable`].
    #[must_use]
    pub fn default_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type produced by adapters and every layer above them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    /// Taxonomy code.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Whether a retry of the same request may succeed.
    pub retryable: bool,

    /// Provider-suggested delay before retrying (`Retry-After`).
    pub retry_after: Option<Duration>,

    /// The adapter or layer the error originated from.
    pub provenance: Option<String>,

    /// Opaque extra context.
    pub details: Option<Value>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.default_retryable(),
            retry_after: None,
            provenance: None,
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    #[must_use]
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ErrorCode::RateLimit, "rate limited by provider")
        }
    }

    /// A server-side provider failure. Retryability is whatever the adapter
    /// observed, not a property of the code.
    pub fn provider(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            retryable,
            ..Self::new(ErrorCode::Provider, message)
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "request cancelled")
    }

    pub fn circuit_open(backend: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CircuitOpen,
            format!("circuit breaker open for backend {backend}"),
        )
    }

    pub fn no_backend(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoBackend, message)
    }

    pub fn middleware(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Middleware, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = Some(provenance.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
