use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use weft_ir::{ChatRequest, ChatResponse, ChunkStream, Result, Warning};

use crate::{
    capabilities::Capabilities,
    models::{ListModelsOptions, ModelListing},
};

/// A provider-facing adapter.
///
/// Object safe so routers and bridges can hold heterogeneous backends; the
/// wire half of the contract lives in [`WireCodec`], whose associated types
/// cannot cross a trait object.
///
/// All operations fail with [`weft_ir::Error`], carrying a taxonomy code and
/// the adapter's provenance.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable adapter name, used as the registry key and in provenance.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Perform a unary chat completion.
    async fn execute(
        &self,
        request: ChatRequest,
        signal: Option<CancellationToken>,
    ) -> Result<ChatResponse>;

    /// Open a streaming chat completion.
    ///
    /// The returned stream is lazy, one-shot and forward-only; restarting is
    /// not supported.
    async fn execute_stream(
        &self,
        request: ChatRequest,
        signal: Option<CancellationToken>,
    ) -> Result<ChunkStream>;

    /// Cheap liveness probe. The default assumes health.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Estimated cost of the request in dollars, if the adapter has pricing.
    fn estimate_cost(&self, _request: &ChatRequest) -> Option<f64> {
        None
    }

    /// The models this backend serves. The default derives a static listing
    /// from the capability descriptor.
    async fn list_models(&self, options: ListModelsOptions) -> Result<ModelListing> {
        let mut listing = ModelListing::from_ids(&self.capabilities().supported_models);
        if let Some(filter) = &options.filter {
            listing = listing.filtered(filter);
        }

        Ok(listing)
    }

    /// Drop any cached model listings. The default is a no-op for adapters
    /// without a cache.
    fn invalidate_model_cache(&self) {}
}

/// The translation half of a backend: IR to provider wire format and back.
///
/// Concrete vendor codecs implement this next to their [`Backend`]; the
/// fabric itself never constructs wire values.
pub trait WireCodec {
    type WireRequest;
    type WireResponse;

    /// Translate an IR request into the provider's wire request, reporting
    /// every lossy adjustment as a drift warning.
    fn from_ir(&self, request: &ChatRequest) -> Result<(Self::WireRequest, Vec<Warning>)>;

    /// Translate a provider wire response back into the IR.
    fn to_ir(&self, response: Self::WireResponse) -> Result<ChatResponse>;
}
