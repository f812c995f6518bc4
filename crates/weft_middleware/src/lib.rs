//! Onion middleware around unary and streaming calls.
//!
//! A stack composes middleware so that the first one added runs outermost:
//! `A.before → B.before → handler → B.after → A.after`. Short-circuiting is
//! legal, the stack locks at first execution, and the per-request [`Context`]
//! carries the scratch state middleware share instead of closures over
//! caller-private variables.

pub mod context;
pub mod retry;
pub mod stack;
pub mod transform;
pub mod validation;

pub use context::Context;
pub use retry::{RetryMiddleware, RetryPolicy, RetryPredicate};
pub use stack::{Handler, Middleware, Next, Stack, StreamHandler, StreamMiddleware, StreamNext};
pub use transform::TransformMiddleware;
pub use validation::{PiiAction, ValidationConfig, ValidationMiddleware};
