//! Model translation across backends.
//!
//! When a request routed for model *M* lands on a backend that does not
//! serve *M* — usually after a failover — the router substitutes a target
//! model from the configured maps. Every substitution is drift and emits a
//! `model-substituted` warning.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use weft_adapter::Capabilities;
use weft_ir::{Error, Result, Severity, Warning, WarningCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStrategy {
    /// Exact map lookup, then a family-wise match against the backend's
    /// declared models.
    #[default]
    Hybrid,

    /// Exact map lookup only; anything else is an error.
    Strict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub strategy: TranslationStrategy,

    /// Escalate family-wise (defaulted) substitutions from info to warning.
    pub warn_on_default: bool,

    /// Model → model, applied for every backend.
    pub global: IndexMap<String, String>,

    /// Backend name → (model → model); consulted before the global map.
    pub per_backend: IndexMap<String, IndexMap<String, String>>,
}

/// The outcome of a substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub model: String,
    pub warning: Warning,
}

impl TranslationConfig {
    /// Resolve `model` for `backend`. `Ok(None)` means the backend serves
    /// the model as-is.
    pub fn resolve(
        &self,
        model: &str,
        backend: &str,
        capabilities: &Capabilities,
    ) -> Result<Option<Substitution>> {
        if capabilities.supports_model(model) {
            return Ok(None);
        }

        let mapped = self
            .per_backend
            .get(backend)
            .and_then(|map| map.get(model))
            .or_else(|| self.global.get(model));

        if let Some(target) = mapped {
            debug!(model, target, backend, "Translating model via configured map.");
            return Ok(Some(Substitution {
                model: target.clone(),
                warning: substitution_warning(model, target, backend, Severity::Info),
            }));
        }

        match self.strategy {
            TranslationStrategy::Strict => Err(Error::unsupported(format!(
                "backend {backend} does not serve model {model} and no translation is configured"
            ))),
            TranslationStrategy::Hybrid => {
                let family = model_family(model);
                let target = capabilities
                    .supported_models
                    .iter()
                    .find(|candidate| model_family(candidate) == family)
                    .cloned();

                match target {
                    Some(target) => {
                        let severity = if self.warn_on_default {
                            Severity::Warning
                        } else {
                            Severity::Info
                        };

                        debug!(model, target, backend, "Translating model by family.");
                        Ok(Some(Substitution {
                            warning: substitution_warning(model, &target, backend, severity),
                            model: target,
                        }))
                    }
                    None => Err(Error::unsupported(format!(
                        "backend {backend} has no substitute for model {model}"
                    ))),
                }
            }
        }
    }
}

fn substitution_warning(from: &str, to: &str, backend: &str, severity: Severity) -> Warning {
    Warning::new(
        WarningCategory::ModelSubstituted,
        severity,
        format!("model {from} substituted with {to}"),
    )
    .with_field("model")
    .with_values(json!(from), json!(to))
    .with_source(backend.to_owned())
}

/// The family of a model id: the leading segments up to the first
/// version-like part. `gpt-4` → `gpt`, `claude-3-opus` → `claude`.
#[must_use]
pub fn model_family(model: &str) -> &str {
    model
        .split(['-', ':', '/'])
        .next()
        .unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(models: &[&str]) -> Capabilities {
        Capabilities {
            supported_models: models.iter().map(ToString::to_string).collect(),
            ..Capabilities::default()
        }
    }

    #[test]
    fn supported_models_pass_untranslated() {
        let config = TranslationConfig::default();
        let result = config
            .resolve("gpt-4", "b1", &caps(&["gpt-4", "gpt-4o"]))
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn undeclared_model_lists_constrain_nothing() {
        let config = TranslationConfig::default();
        assert_eq!(
            config.resolve("anything", "b1", &Capabilities::default()).unwrap(),
            None
        );
    }

    #[test]
    fn per_backend_map_wins_over_global() {
        let mut config = TranslationConfig::default();
        config.global.insert("gpt-4".into(), "claude-3-haiku".into());
        config.per_backend.insert(
            "b2".into(),
            IndexMap::from_iter([("gpt-4".to_owned(), "claude-3-opus".to_owned())]),
        );

        let result = config
            .resolve("gpt-4", "b2", &caps(&["claude-3-opus", "claude-3-haiku"]))
            .unwrap()
            .unwrap();
        assert_eq!(result.model, "claude-3-opus");
        assert_eq!(result.warning.category, WarningCategory::ModelSubstituted);
    }

    #[test]
    fn hybrid_falls_back_to_family_match() {
        let config = TranslationConfig::default();
        let result = config
            .resolve("claude-2", "b1", &caps(&["gpt-4", "claude-3-opus"]))
            .unwrap()
            .unwrap();
        assert_eq!(result.model, "claude-3-opus");
        assert_eq!(result.warning.severity, Severity::Info);
    }

    #[test]
    fn warn_on_default_escalates_family_matches() {
        let config = TranslationConfig {
            warn_on_default: true,
            ..TranslationConfig::default()
        };
        let result = config
            .resolve("claude-2", "b1", &caps(&["claude-3-opus"]))
            .unwrap()
            .unwrap();
        assert_eq!(result.warning.severity, Severity::Warning);
    }

    #[test]
    fn strict_refuses_unmapped_models() {
        let config = TranslationConfig {
            strategy: TranslationStrategy::Strict,
            ..TranslationConfig::default()
        };
        let err = config
            .resolve("claude-2", "b1", &caps(&["claude-3-opus"]))
            .unwrap_err();
        assert_eq!(err.code, weft_ir::ErrorCode::Unsupported);
    }

    #[test]
    fn hybrid_errors_when_no_family_matches() {
        let config = TranslationConfig::default();
        assert!(config.resolve("mistral-large", "b1", &caps(&["gpt-4"])).is_err());
    }

    #[test]
    fn family_extraction() {
        assert_eq!(model_family("gpt-4"), "gpt");
        assert_eq!(model_family("claude-3-opus"), "claude");
        assert_eq!(model_family("llama3:8b"), "llama3");
        assert_eq!(model_family("plain"), "plain");
    }
}
