use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::warning::{self, Warning};

/// The adapters and layers a value passed through.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontend: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
}

/// Request/response correlation metadata.
///
/// The `request_id` is generated by the frontend or bridge and stays stable
/// across retries and fallbacks; it is the correlation key throughout the
/// fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub request_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response_id: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    #[serde(default)]
    pub provenance: Provenance,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom: IndexMap<String, Value>,
}

impl Metadata {
    /// Fresh metadata with a generated request id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(Uuid::new_v4().to_string())
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            provider_response_id: None,
            timestamp: OffsetDateTime::now_utc(),
            provenance: Provenance::default(),
            warnings: Vec::new(),
            custom: IndexMap::new(),
        }
    }

    pub fn push_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    /// Fold another metadata into this one, this one winning on conflicts.
    ///
    /// Warnings are merged with first-writer-wins dedup; custom keys already
    /// present are kept; provenance fields fill in only where unset.
    #[must_use]
    pub fn merged_over(mut self, other: &Metadata) -> Self {
        self.warnings = warning::merge(&[&self.warnings, &other.warnings]);

        for (key, value) in &other.custom {
            self.custom.entry(key.clone()).or_insert_with(|| value.clone());
        }

        if self.provider_response_id.is_none() {
            self.provider_response_id = other.provider_response_id.clone();
        }

        let Provenance {
            frontend,
            backend,
            router,
            middleware,
        } = &other.provenance;

        if self.provenance.frontend.is_none() {
            self.provenance.frontend = frontend.clone();
        }
        if self.provenance.backend.is_none() {
            self.provenance.backend = backend.clone();
        }
        if self.provenance.router.is_none() {
            self.provenance.router = router.clone();
        }
        for name in middleware {
            if !self.provenance.middleware.contains(name) {
                self.provenance.middleware.push(name.clone());
            }
        }

        self
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
