//! System-message re-projection.
//!
//! Backends disagree on where system content lives: a dedicated request
//! field, the message list, the first user message, or nowhere at all. The
//! normalizer re-projects system messages according to the backend's
//! declared strategy and records a `system-message-transformed` warning for
//! every lossy move.

use tracing::debug;
use weft_ir::{Content, ContentBlock, Message, Role, Warning, WarningCategory};

use crate::capabilities::{Capabilities, SystemMessageStrategy};

/// Separator used whenever multiple system contents are joined, and between
/// prepended system content and the original user text.
pub const SYSTEM_JOIN_SEPARATOR: &str = "\n\n";

/// The output of system-message normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessages {
    pub messages: Vec<Message>,

    /// System content extracted for backends with a dedicated parameter.
    pub system_parameter: Option<String>,
}

/// Re-project system messages for a backend with `capabilities`.
#[must_use]
pub fn normalize_system_messages(
    messages: &[Message],
    capabilities: &Capabilities,
    warnings: &mut Vec<Warning>,
) -> NormalizedMessages {
    let system_count = messages.iter().filter(|m| m.role == Role::System).count();
    if system_count == 0 {
        return NormalizedMessages {
            messages: messages.to_vec(),
            system_parameter: None,
        };
    }

    match capabilities.system_message_strategy {
        SystemMessageStrategy::SeparateParameter => {
            extract_to_parameter(messages, capabilities, warnings)
        }
        SystemMessageStrategy::InMessages => {
            if capabilities.supports_multiple_system_messages || system_count == 1 {
                NormalizedMessages {
                    messages: messages.to_vec(),
                    system_parameter: None,
                }
            } else {
                collapse_in_place(messages, warnings)
            }
        }
        SystemMessageStrategy::PrependUser => prepend_to_user(messages, warnings),
        SystemMessageStrategy::NotSupported => drop_all(messages, warnings),
    }
}

fn system_texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text)
        .collect()
}

fn extract_to_parameter(
    messages: &[Message],
    capabilities: &Capabilities,
    warnings: &mut Vec<Warning>,
) -> NormalizedMessages {
    let texts = system_texts(messages);

    let system_parameter = if capabilities.supports_multiple_system_messages {
        if texts.len() > 1 {
            warnings.push(Warning::info(
                WarningCategory::SystemMessageTransformed,
                format!("{} system messages joined into one parameter", texts.len()),
            ));
        }

        texts.join(SYSTEM_JOIN_SEPARATOR)
    } else {
        if texts.len() > 1 {
            warnings.push(Warning::warning(
                WarningCategory::SystemMessageTransformed,
                format!("backend accepts one system message, dropped {}", texts.len() - 1),
            ));
        }

        texts.into_iter().next().unwrap_or_default()
    };

    NormalizedMessages {
        messages: messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect(),
        system_parameter: Some(system_parameter),
    }
}

fn collapse_in_place(messages: &[Message], warnings: &mut Vec<Warning>) -> NormalizedMessages {
    let texts = system_texts(messages);
    let joined = texts.join(SYSTEM_JOIN_SEPARATOR);

    warnings.push(Warning::info(
        WarningCategory::SystemMessageTransformed,
        format!("{} system messages collapsed into one", texts.len()),
    ));

    let mut out = Vec::with_capacity(messages.len());
    let mut emitted = false;
    for message in messages {
        if message.role == Role::System {
            if !emitted {
                out.push(Message::system(joined.clone()));
                emitted = true;
            }
        } else {
            out.push(message.clone());
        }
    }

    NormalizedMessages {
        messages: out,
        system_parameter: None,
    }
}

fn prepend_to_user(messages: &[Message], warnings: &mut Vec<Warning>) -> NormalizedMessages {
    let Some(first_user) = messages.iter().position(|m| m.role == Role::User) else {
        // No user message to carry the content; pass through unchanged.
        debug!("No user message to prepend system content to; leaving messages untouched.");
        return NormalizedMessages {
            messages: messages.to_vec(),
            system_parameter: None,
        };
    };

    let joined = system_texts(messages).join(SYSTEM_JOIN_SEPARATOR);
    let mut out: Vec<Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    // Positions shift once system messages are gone; find the user message
    // again in the filtered list.
    let target = out
        .iter()
        .position(|m| m.role == Role::User)
        .unwrap_or(first_user);
    prepend_text(&mut out[target], &joined);

    warnings.push(Warning::info(
        WarningCategory::SystemMessageTransformed,
        "system content prepended to the first user message",
    ));

    NormalizedMessages {
        messages: out,
        system_parameter: None,
    }
}

fn prepend_text(message: &mut Message, prefix: &str) {
    match &mut message.content {
        Content::Text(text) => {
            *text = format!("{prefix}{SYSTEM_JOIN_SEPARATOR}{text}");
        }
        Content::Blocks(blocks) => {
            blocks.insert(
                0,
                ContentBlock::text(format!("{prefix}{SYSTEM_JOIN_SEPARATOR}")),
            );
        }
    }
}

fn drop_all(messages: &[Message], warnings: &mut Vec<Warning>) -> NormalizedMessages {
    let dropped = messages.iter().filter(|m| m.role == Role::System).count();

    warnings.push(Warning::warning(
        WarningCategory::SystemMessageTransformed,
        format!("backend does not support system messages, dropped {dropped}"),
    ));

    NormalizedMessages {
        messages: messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect(),
        system_parameter: None,
    }
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
