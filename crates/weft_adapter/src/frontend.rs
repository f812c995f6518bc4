use std::pin::Pin;

use futures::Stream;
use weft_ir::{ChatRequest, ChatResponse, ChunkStream, Result};

use crate::capabilities::Capabilities;

/// A caller-facing adapter.
///
/// Converts between the caller's request/response/chunk shapes and the IR.
/// The associated types let a frontend speak any wire dialect while the
/// bridge stays generic.
pub trait Frontend: Send + Sync {
    /// The caller-shaped request.
    type Request;

    /// The caller-shaped response.
    type Response;

    /// The caller-shaped streaming chunk.
    type StreamItem;

    /// Stable adapter name, stamped into provenance.
    fn name(&self) -> &str;

    /// The shapes this frontend accepts.
    fn capabilities(&self) -> Capabilities;

    fn to_ir(&self, request: Self::Request) -> Result<ChatRequest>;

    fn from_ir(&self, response: ChatResponse) -> Result<Self::Response>;

    /// Translate an IR chunk stream into caller-shaped chunks.
    fn from_ir_stream(
        &self,
        stream: ChunkStream,
    ) -> Pin<Box<dyn Stream<Item = Result<Self::StreamItem>> + Send>>;

    /// Optional caller-side validation, before translation.
    fn validate(&self, _request: &Self::Request) -> Result<()> {
        Ok(())
    }
}
