//! Rough token budgeting. The fabric never tokenizes precisely; four
//! characters per token is the estimate used for limits everywhere.

use crate::{message::Message, request::ChatRequest};

pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count for a piece of text, rounding up.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count().div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}

#[must_use]
pub fn estimate_message_tokens(message: &Message) -> u32 {
    estimate_tokens(&message.text())
}

/// Estimated prompt size of a request: all messages, text content only.
#[must_use]
pub fn estimate_request_tokens(request: &ChatRequest) -> u32 {
    request
        .messages
        .iter()
        .map(estimate_message_tokens)
        .fold(0, u32::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_chars_per_token_rounding_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("12345678"), 2);
    }

    #[test]
    fn request_estimate_sums_messages() {
        let request = ChatRequest::new(vec![
            Message::system("abcd"),     // 1
            Message::user("abcdefgh"),   // 2
        ]);
        assert_eq!(estimate_request_tokens(&request), 3);
    }
}
