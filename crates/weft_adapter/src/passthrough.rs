use std::pin::Pin;

use futures::Stream;
use weft_ir::{ChatRequest, ChatResponse, ChunkStream, Result, StreamChunk, validate};

use crate::{capabilities::Capabilities, frontend::Frontend};

/// The zero-translation frontend: callers that already speak IR.
///
/// `to_ir` stamps provenance and returns the request unchanged; the return
/// path is the identity. With [`PassthroughFrontend::validating`], requests
/// are structurally validated before they enter the fabric.
#[derive(Debug, Clone)]
pub struct PassthroughFrontend {
    name: String,
    validate: bool,
}

impl PassthroughFrontend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "passthrough".to_owned(),
            validate: false,
        }
    }

    /// A passthrough that enforces the IR structural invariants on entry.
    #[must_use]
    pub fn validating() -> Self {
        Self {
            validate: true,
            ..Self::new()
        }
    }
}

impl Default for PassthroughFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend for PassthroughFrontend {
    type Request = ChatRequest;
    type Response = ChatResponse;
    type StreamItem = StreamChunk;

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn to_ir(&self, mut request: ChatRequest) -> Result<ChatRequest> {
        if self.validate {
            validate::validate_request(&request)?;
        }

        request
            .metadata
            .provenance
            .frontend
            .get_or_insert_with(|| self.name.clone());

        Ok(request)
    }

    fn from_ir(&self, response: ChatResponse) -> Result<ChatResponse> {
        Ok(response)
    }

    fn from_ir_stream(
        &self,
        stream: ChunkStream,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>> {
        stream
    }
}

#[cfg(test)]
mod tests {
    use weft_ir::Message;

    use super::*;

    #[test]
    fn to_ir_stamps_provenance_and_keeps_the_rest() {
        let frontend = PassthroughFrontend::new();
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let messages = request.messages.clone();

        let ir = frontend.to_ir(request).unwrap();
        assert_eq!(ir.metadata.provenance.frontend.as_deref(), Some("passthrough"));
        assert_eq!(ir.messages, messages);
    }

    #[test]
    fn existing_provenance_is_not_overwritten() {
        let frontend = PassthroughFrontend::new();
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.metadata.provenance.frontend = Some("openai".to_owned());

        let ir = frontend.to_ir(request).unwrap();
        assert_eq!(ir.metadata.provenance.frontend.as_deref(), Some("openai"));
    }

    #[test]
    fn validating_passthrough_rejects_structurally_invalid_requests() {
        let frontend = PassthroughFrontend::validating();
        let request = ChatRequest::new(vec![Message::user("")]);
        assert!(frontend.to_ir(request).is_err());

        let frontend = PassthroughFrontend::new();
        let request = ChatRequest::new(vec![Message::user("")]);
        assert!(frontend.to_ir(request).is_ok());
    }
}
