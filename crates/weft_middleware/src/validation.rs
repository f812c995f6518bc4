//! Request validation middleware.
//!
//! Three families of checks: content hygiene (PII detection with block or
//! redact handling, prompt-injection patterns, text sanitization) and
//! structural limits (message count, estimated token budget, parameter
//! ranges). `production()` blocks and fails fast; `development()` redacts
//! and aggregates.

use async_trait::async_trait;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use weft_ir::{ChatResponse, Content, ContentBlock, Error, Message, Result, token};

use crate::{
    context::Context,
    stack::{Middleware, Next},
};

/// What to do when PII is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    /// Fail the request.
    Block,

    /// Replace each match with `[REDACTED_<KIND>]` and continue.
    Redact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub detect_pii: bool,
    pub pii_action: PiiAction,
    pub detect_prompt_injection: bool,
    pub sanitize: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,

    /// Budget over the 4-chars-per-token estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_tokens: Option<u32>,

    pub validate_parameters: bool,

    /// Fail on the first violation instead of aggregating all of them into
    /// the context state.
    pub throw_on_error: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl ValidationConfig {
    /// Block PII, fail fast.
    #[must_use]
    pub fn production() -> Self {
        Self {
            detect_pii: true,
            pii_action: PiiAction::Block,
            detect_prompt_injection: true,
            sanitize: true,
            max_messages: None,
            max_total_tokens: None,
            validate_parameters: true,
            throw_on_error: true,
        }
    }

    /// Redact PII, aggregate findings, never fail the request for content.
    #[must_use]
    pub fn development() -> Self {
        Self {
            pii_action: PiiAction::Redact,
            throw_on_error: false,
            ..Self::production()
        }
    }
}

struct PiiPattern {
    kind: &'static str,
    regex: Regex,
}

struct Patterns {
    pii: Vec<PiiPattern>,
    injection: Vec<Regex>,
}

impl Patterns {
    fn compile() -> Self {
        let pii = [
            ("EMAIL", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            ("PHONE", r"\+?\d{1,3}[-. (]*\d{3}[-. )]*\d{3}[-. ]*\d{4}"),
            ("SSN", r"\b\d{3}-\d{2}-\d{4}\b"),
            ("CREDIT_CARD", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b"),
        ];

        let injection = [
            r"(?i)ignore\s+(?:all\s+|any\s+)?previous\s+instructions",
            r"(?i)disregard\s+(?:all\s+|any\s+)?(?:previous|prior)\s+(?:instructions|context)",
            r"(?i)^\s*system\s*:",
            r"(?i)you\s+are\s+now\s+in\s+developer\s+mode",
        ];

        Self {
            pii: pii
                .into_iter()
                .map(|(kind, pattern)| PiiPattern {
                    kind,
                    regex: Regex::new(pattern).expect("static pattern compiles"),
                })
                .collect(),
            injection: injection
                .into_iter()
                .map(|pattern| Regex::new(pattern).expect("static pattern compiles"))
                .collect(),
        }
    }
}

/// The validation layer of the unary onion.
pub struct ValidationMiddleware {
    config: ValidationConfig,
    patterns: Patterns,
}

impl ValidationMiddleware {
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            patterns: Patterns::compile(),
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self::new(ValidationConfig::production())
    }

    #[must_use]
    pub fn development() -> Self {
        Self::new(ValidationConfig::development())
    }

    /// Remove null bytes and normalize CRLF to LF.
    fn sanitize(text: &str) -> String {
        text.replace("\r\n", "\n").replace('\0', "")
    }

    fn scan_text(&self, text: &mut String, violations: &mut Vec<String>) -> Result<()> {
        if self.config.sanitize {
            let cleaned = Self::sanitize(text);
            if cleaned != *text {
                *text = cleaned;
            }
        }

        if self.config.detect_pii {
            for pattern in &self.patterns.pii {
                if !pattern.regex.is_match(text).unwrap_or(false) {
                    continue;
                }

                match self.config.pii_action {
                    PiiAction::Block => {
                        let violation = format!("PII detected: {}", pattern.kind);
                        if self.config.throw_on_error {
                            return Err(Error::validation(violation));
                        }
                        violations.push(violation);
                    }
                    PiiAction::Redact => {
                        let replacement = format!("[REDACTED_{}]", pattern.kind);
                        *text = pattern
                            .regex
                            .replace_all(text, replacement.as_str())
                            .into_owned();
                        violations.push(format!("PII redacted: {}", pattern.kind));
                    }
                }
            }
        }

        if self.config.detect_prompt_injection {
            for regex in &self.patterns.injection {
                if regex.is_match(text).unwrap_or(false) {
                    let violation = format!("prompt injection pattern: {regex}");
                    if self.config.throw_on_error {
                        return Err(Error::validation(violation));
                    }
                    violations.push(violation);
                }
            }
        }

        Ok(())
    }

    fn scan_message(&self, message: &mut Message, violations: &mut Vec<String>) -> Result<()> {
        match &mut message.content {
            Content::Text(text) => self.scan_text(text, violations),
            Content::Blocks(blocks) => {
                for block in blocks {
                    if let ContentBlock::Text { text } = block {
                        self.scan_text(text, violations)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn handle(&self, mut ctx: Context, next: Next) -> Result<ChatResponse> {
        if let Some(max) = self.config.max_messages
            && ctx.request.messages.len() > max
        {
            return Err(Error::validation(format!(
                "too many messages: {} > {max}",
                ctx.request.messages.len()
            )));
        }

        if let Some(budget) = self.config.max_total_tokens {
            let estimated = token::estimate_request_tokens(&ctx.request);
            if estimated > budget {
                return Err(Error::validation(format!(
                    "estimated {estimated} tokens exceed the budget of {budget}"
                )));
            }
        }

        if self.config.validate_parameters {
            ctx.request.parameters.validate()?;
        }

        let mut violations = Vec::new();
        for message in &mut ctx.request.messages {
            self.scan_message(message, &mut violations)?;
        }

        if !violations.is_empty() {
            warn!(count = violations.len(), "Content violations recorded.");
            ctx.set_state("validation_violations", json!(violations));
        }

        next.run(ctx).await
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
