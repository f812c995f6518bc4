use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Where a [`ModelListing`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Hard-coded in the adapter.
    Static,

    /// Fetched from the provider on this call.
    Remote,

    /// Served from the model cache.
    Cache,
}

/// What an adapter knows about one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            context_window: None,
            max_output_tokens: None,
        }
    }
}

/// The result schema of `list_models`, part of the boundary contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelListing {
    pub models: Vec<ModelInfo>,

    pub source: ModelSource,

    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,

    /// Whether `models` is the full catalogue or a truncated page.
    pub is_complete: bool,
}

impl ModelListing {
    /// A static listing built from declared model ids.
    #[must_use]
    pub fn from_ids(ids: &[String]) -> Self {
        Self {
            models: ids.iter().map(ModelInfo::new).collect(),
            source: ModelSource::Static,
            fetched_at: OffsetDateTime::now_utc(),
            is_complete: true,
        }
    }

    #[must_use]
    pub fn filtered(mut self, filter: &ModelFilter) -> Self {
        self.models.retain(|model| filter.matches(model));
        self
    }
}

/// Options for `list_models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListModelsOptions {
    /// Bypass and refresh the cache.
    pub force_refresh: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<ModelFilter>,
}

/// Client-side filtering of a model listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelFilter {
    /// Keep models whose id contains this substring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_contains: Option<String>,
}

impl ModelFilter {
    #[must_use]
    pub fn matches(&self, model: &ModelInfo) -> bool {
        self.id_contains
            .as_deref()
            .is_none_or(|needle| model.id.contains(needle))
    }
}
