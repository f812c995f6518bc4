//! Structured drift capture.
//!
//! Every lossy or substitutive transformation anywhere in the fabric appends
//! a [`Warning`] instead of silently changing the request. Warnings ride on
//! response and stream metadata, merge across layers with first-writer-wins
//! deduplication, and format into the log lines the integration tests assert
//! against.

use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Every kind of drift the fabric records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningCategory {
    ParameterNormalized,
    ParameterClamped,
    ParameterUnsupported,
    CapabilityUnsupported,
    TokenLimitExceeded,
    StopSequencesTruncated,
    SystemMessageTransformed,
    ContentTypeUnsupported,
    ToolUnsupported,
    ModelSubstituted,
}

impl WarningCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParameterNormalized => "parameter-normalized",
            Self::ParameterClamped => "parameter-clamped",
            Self::ParameterUnsupported => "parameter-unsupported",
            Self::CapabilityUnsupported => "capability-unsupported",
            Self::TokenLimitExceeded => "token-limit-exceeded",
            Self::StopSequencesTruncated => "stop-sequences-truncated",
            Self::SystemMessageTransformed => "system-message-transformed",
            Self::ContentTypeUnsupported => "content-type-unsupported",
            Self::ToolUnsupported => "tool-unsupported",
            Self::ModelSubstituted => "model-substituted",
        }
    }
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub category: WarningCategory,

    pub severity: Severity,

    pub message: String,

    /// The request field the drift applies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_value: Option<Value>,

    /// The layer or adapter that recorded the drift.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Warning {
    pub fn new(category: WarningCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            field: None,
            original_value: None,
            transformed_value: None,
            source: None,
            details: None,
        }
    }

    pub fn info(category: WarningCategory, message: impl Into<String>) -> Self {
        Self::new(category, Severity::Info, message)
    }

    pub fn warning(category: WarningCategory, message: impl Into<String>) -> Self {
        Self::new(category, Severity::Warning, message)
    }

    pub fn error(category: WarningCategory, message: impl Into<String>) -> Self {
        Self::new(category, Severity::Error, message)
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_values(mut self, original: Value, transformed: Value) -> Self {
        self.original_value = Some(original);
        self.transformed_value = Some(transformed);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Dedup identity: two warnings are the same drift when category, field
    /// and message all match.
    #[must_use]
    pub fn dedup_key(&self) -> (WarningCategory, Option<&str>, &str) {
        (self.category, self.field.as_deref(), &self.message)
    }

    /// `[SEVERITY] message (source)` plus an indented details block.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = format!(
            "[{}] {}",
            self.severity.as_str().to_uppercase(),
            self.message
        );

        if let Some(source) = &self.source {
            let _ = write!(out, " ({source})");
        }

        if let Some(details) = &self.details {
            let _ = write!(out, "\n  details: {details}");
        }

        out
    }
}

/// Merge warning lists from multiple layers.
///
/// Order within each list and across lists is preserved; duplicates (same
/// [`Warning::dedup_key`]) keep the first-written value and drop the rest.
#[must_use]
pub fn merge(lists: &[&[Warning]]) -> Vec<Warning> {
    let mut merged: Vec<Warning> = Vec::new();

    for list in lists {
        for warning in *list {
            if !merged.iter().any(|w| w.dedup_key() == warning.dedup_key()) {
                merged.push(warning.clone());
            }
        }
    }

    merged
}

/// Warnings at or above the given severity.
#[must_use]
pub fn filter_by_severity(warnings: &[Warning], min: Severity) -> Vec<Warning> {
    warnings
        .iter()
        .filter(|w| w.severity >= min)
        .cloned()
        .collect()
}

/// Warnings whose category is in the given subset.
#[must_use]
pub fn filter_by_categories(warnings: &[Warning], categories: &[WarningCategory]) -> Vec<Warning> {
    warnings
        .iter()
        .filter(|w| categories.contains(&w.category))
        .cloned()
        .collect()
}

/// Group warnings by category, preserving encounter order.
#[must_use]
pub fn group_by_category(warnings: &[Warning]) -> IndexMap<WarningCategory, Vec<Warning>> {
    let mut groups: IndexMap<WarningCategory, Vec<Warning>> = IndexMap::new();

    for warning in warnings {
        groups
            .entry(warning.category)
            .or_default()
            .push(warning.clone());
    }

    groups
}

/// One formatted line per warning.
#[must_use]
pub fn format_all(warnings: &[Warning]) -> String {
    warnings
        .iter()
        .map(Warning::format)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "warning_tests.rs"]
mod tests;
