//! Adapter contracts: the seams between the fabric and the outside world.
//!
//! A frontend adapter translates a caller-shaped request into the IR and
//! back; a backend adapter translates the IR into a provider's wire format
//! and performs the call. Everything between those two seams — middleware,
//! routing, stream shaping — only ever sees IR types.

pub mod backend;
pub mod cache;
pub mod capabilities;
pub mod frontend;
pub mod mock;
pub mod models;
pub mod params;
pub mod passthrough;
pub mod system;

pub use backend::{Backend, WireCodec};
pub use cache::{CacheScope, ModelCache};
pub use capabilities::{Capabilities, SystemMessageStrategy};
pub use frontend::Frontend;
pub use mock::{MockBackend, MockOutcome};
pub use models::{ListModelsOptions, ModelFilter, ModelInfo, ModelListing, ModelSource};
pub use passthrough::PassthroughFrontend;
pub use system::NormalizedMessages;
