use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Canonical temperature range. Backends with a narrower native range scale
/// at their `from_ir` boundary and record a drift warning.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// Canonical nucleus-sampling range.
pub const TOP_P_RANGE: (f64, f64) = (0.0, 1.0);

/// Canonical frequency-penalty range.
pub const FREQUENCY_PENALTY_RANGE: (f64, f64) = (-2.0, 2.0);

/// Canonical presence-penalty range.
pub const PRESENCE_PENALTY_RANGE: (f64, f64) = (-2.0, 2.0);

/// Sampling and routing parameters, all optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Provider-specific parameters passed through opaquely.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub custom: IndexMap<String, Value>,
}

impl Parameters {
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Check every present scalar against its canonical bounds, without
    /// mutating anything.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Like [`Parameters::is_valid`], but naming the offending field.
    pub fn validate(&self) -> Result<()> {
        fn in_range(value: f64, (low, high): (f64, f64)) -> bool {
            value >= low && value <= high
        }

        if let Some(temperature) = self.temperature
            && !in_range(temperature, TEMPERATURE_RANGE)
        {
            return Err(out_of_range("temperature", temperature, TEMPERATURE_RANGE));
        }

        if let Some(top_p) = self.top_p
            && !in_range(top_p, TOP_P_RANGE)
        {
            return Err(out_of_range("top_p", top_p, TOP_P_RANGE));
        }

        if let Some(penalty) = self.frequency_penalty
            && !in_range(penalty, FREQUENCY_PENALTY_RANGE)
        {
            return Err(out_of_range(
                "frequency_penalty",
                penalty,
                FREQUENCY_PENALTY_RANGE,
            ));
        }

        if let Some(penalty) = self.presence_penalty
            && !in_range(penalty, PRESENCE_PENALTY_RANGE)
        {
            return Err(out_of_range(
                "presence_penalty",
                penalty,
                PRESENCE_PENALTY_RANGE,
            ));
        }

        if self.max_tokens == Some(0) {
            return Err(Error::validation("max_tokens must be at least 1"));
        }

        if self.top_k == Some(0) {
            return Err(Error::validation("top_k must be at least 1"));
        }

        Ok(())
    }
}

fn out_of_range(field: &str, value: f64, (low, high): (f64, f64)) -> Error {
    Error::validation(format!("{field} {value} outside [{low}, {high}]"))
}
