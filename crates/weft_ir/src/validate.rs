//! Structural checks on requests and messages.
//!
//! These are shape checks only; capability-dependent validation (supported
//! parameters, content types, tool support) happens at the adapter boundary
//! where the capabilities descriptor is known.

use crate::{
    error::{Error, Result},
    message::{Content, Message},
    request::ChatRequest,
    tool::Tool,
};

/// Validate a whole request: at least one message, every message valid,
/// correlation metadata present, tools well-formed.
pub fn validate_request(request: &ChatRequest) -> Result<()> {
    if request.messages.is_empty() {
        return Err(Error::validation("request has no messages"));
    }

    for (index, message) in request.messages.iter().enumerate() {
        validate_message(message)
            .map_err(|err| Error::validation(format!("message {index}: {}", err.message)))?;
    }

    if request.metadata.request_id.is_empty() {
        return Err(Error::validation("metadata.request_id is empty"));
    }

    for tool in &request.tools {
        validate_tool(tool)?;
    }

    request.parameters.validate()
}

/// A message must have non-empty content: the empty string is not a valid
/// whole-message content, and block sequences are non-empty by invariant.
pub fn validate_message(message: &Message) -> Result<()> {
    match &message.content {
        Content::Text(text) if text.is_empty() => {
            Err(Error::validation("content is an empty string"))
        }
        Content::Blocks(blocks) if blocks.is_empty() => {
            Err(Error::validation("content has no blocks"))
        }
        _ => Ok(()),
    }
}

pub fn validate_tool(tool: &Tool) -> Result<()> {
    if tool.name.is_empty() {
        return Err(Error::validation("tool has an empty name"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, JsonSchema, message::ContentBlock};

    #[test]
    fn empty_message_list_is_invalid() {
        let request = ChatRequest::new(vec![]);
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn empty_string_content_is_invalid_as_a_whole_message() {
        assert!(validate_message(&Message::user("")).is_err());
        assert!(validate_message(&Message::user("x")).is_ok());
    }

    #[test]
    fn empty_block_sequence_is_invalid() {
        let message = Message::user(Vec::<ContentBlock>::new());
        assert!(validate_message(&message).is_err());
    }

    #[test]
    fn message_index_is_reported() {
        let request = ChatRequest::new(vec![Message::user("hi"), Message::assistant("")]);
        let err = validate_request(&request).unwrap_err();
        assert!(err.message.contains("message 1"));
    }

    #[test]
    fn nameless_tools_are_rejected() {
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.tools = vec![Tool::new("", "does nothing", JsonSchema::default())];
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn invalid_parameters_fail_request_validation() {
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.parameters.temperature = Some(5.0);
        assert!(validate_request(&request).is_err());
    }
}
