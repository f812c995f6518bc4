use serde::{Deserialize, Serialize};

/// What an adapter can and cannot do.
///
/// Normalizers consult this descriptor at the frontend→backend boundary;
/// every mismatch between a request and the descriptor becomes a drift
/// warning rather than a silent change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub streaming: bool,
    pub multi_modal: bool,
    pub tools: bool,
    pub json_output: bool,

    pub seed: bool,
    pub temperature: bool,
    pub top_p: bool,
    pub top_k: bool,
    pub frequency_penalty: bool,
    pub presence_penalty: bool,
    pub max_tokens: bool,
    pub stop_sequences: bool,

    /// Native temperature range. `None` means the canonical [0, 2]; a
    /// narrower range makes the normalizer scale and record drift.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_range: Option<(f64, f64)>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u32>,

    /// Models the adapter accepts. Empty means unconstrained (the adapter
    /// did not declare a list, not that it supports nothing).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_models: Vec<String>,

    pub system_message_strategy: SystemMessageStrategy,

    pub supports_multiple_system_messages: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stop_sequences: Option<usize>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            multi_modal: true,
            tools: true,
            json_output: true,
            seed: true,
            temperature: true,
            top_p: true,
            top_k: true,
            frequency_penalty: true,
            presence_penalty: true,
            max_tokens: true,
            stop_sequences: true,
            temperature_range: None,
            max_context_tokens: None,
            supported_models: Vec::new(),
            system_message_strategy: SystemMessageStrategy::InMessages,
            supports_multiple_system_messages: true,
            max_stop_sequences: None,
        }
    }
}

impl Capabilities {
    /// Whether the adapter accepts the given model id. An undeclared model
    /// list constrains nothing.
    #[must_use]
    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.is_empty() || self.supported_models.iter().any(|m| m == model)
    }
}

/// How a backend wants system messages projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemMessageStrategy {
    /// System content travels out-of-band, as a dedicated request field.
    SeparateParameter,

    /// System messages stay in the message list.
    InMessages,

    /// System content is prepended to the first user message.
    PrependUser,

    /// The backend has no system-message concept at all.
    NotSupported,
}
