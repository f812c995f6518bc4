use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::trace;
use weft_ir::{ChatResponse, ChunkStream, Error, Result};

use crate::context::Context;

/// The innermost operation of the unary onion.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<ChatResponse>> + Send + Sync>;

/// The innermost operation of the streaming onion.
pub type StreamHandler =
    Arc<dyn Fn(Context) -> BoxFuture<'static, Result<ChunkStream>> + Send + Sync>;

/// A unary interceptor.
///
/// `handle` may transform the context before delegating to `next`, transform
/// the response on the way back, or return without calling `next` at all
/// (short-circuit), skipping inner middleware and the handler.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used for provenance and removal.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: Context, next: Next) -> Result<ChatResponse>;
}

/// A streaming interceptor: same shape, `next` resolves to a chunk stream
/// the middleware may transform, tap or replace.
#[async_trait]
pub trait StreamMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, ctx: Context, next: StreamNext) -> Result<ChunkStream>;
}

/// Continuation into the rest of the unary onion.
///
/// Re-runnable: retry middleware invokes the same continuation once per
/// attempt.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    handler: Handler,
}

impl Next {
    pub async fn run(&self, ctx: Context) -> Result<ChatResponse> {
        match self.chain.get(self.index) {
            None => (self.handler)(ctx).await,
            Some(middleware) => {
                trace!(name = middleware.name(), "Entering middleware.");
                ctx.executed.lock().push(middleware.name().to_owned());

                let next = Self {
                    chain: Arc::clone(&self.chain),
                    index: self.index + 1,
                    handler: Arc::clone(&self.handler),
                };
                middleware.handle(ctx, next).await
            }
        }
    }
}

/// Continuation into the rest of the streaming onion.
#[derive(Clone)]
pub struct StreamNext {
    chain: Arc<[Arc<dyn StreamMiddleware>]>,
    index: usize,
    handler: StreamHandler,
}

impl StreamNext {
    pub async fn run(&self, ctx: Context) -> Result<ChunkStream> {
        match self.chain.get(self.index) {
            None => (self.handler)(ctx).await,
            Some(middleware) => {
                trace!(name = middleware.name(), "Entering stream middleware.");
                ctx.executed.lock().push(middleware.name().to_owned());

                let next = Self {
                    chain: Arc::clone(&self.chain),
                    index: self.index + 1,
                    handler: Arc::clone(&self.handler),
                };
                middleware.handle(ctx, next).await
            }
        }
    }
}

/// The two middleware registries of a bridge, locked together at first
/// execution.
///
/// Mutation after lock is a configuration error: the pipeline a request sees
/// must not depend on when the request arrived.
#[derive(Default)]
pub struct Stack {
    unary: Vec<Arc<dyn Middleware>>,
    streaming: Vec<Arc<dyn StreamMiddleware>>,
    locked: AtomicBool,
}

impl Stack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unary middleware; first added runs outermost.
    pub fn with(&mut self, middleware: Arc<dyn Middleware>) -> Result<&mut Self> {
        self.ensure_unlocked("use")?;
        self.unary.push(middleware);
        Ok(self)
    }

    /// Append a streaming middleware; first added runs outermost.
    pub fn with_streaming(&mut self, middleware: Arc<dyn StreamMiddleware>) -> Result<&mut Self> {
        self.ensure_unlocked("use")?;
        self.streaming.push(middleware);
        Ok(self)
    }

    /// Remove middleware by name from both registries.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        self.ensure_unlocked("remove")?;
        let before = self.unary.len() + self.streaming.len();
        self.unary.retain(|m| m.name() != name);
        self.streaming.retain(|m| m.name() != name);
        Ok(before != self.unary.len() + self.streaming.len())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ensure_unlocked("clear")?;
        self.unary.clear();
        self.streaming.clear();
        Ok(())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.unary.len() + self.streaming.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the unary onion around `handler`. Locks the stack.
    pub async fn execute(&self, ctx: Context, handler: Handler) -> Result<ChatResponse> {
        self.locked.store(true, Ordering::SeqCst);

        let next = Next {
            chain: self.unary.clone().into(),
            index: 0,
            handler,
        };
        next.run(ctx).await
    }

    /// Run the streaming onion around `handler`. Locks the stack.
    pub async fn execute_stream(&self, ctx: Context, handler: StreamHandler) -> Result<ChunkStream> {
        self.locked.store(true, Ordering::SeqCst);

        let next = StreamNext {
            chain: self.streaming.clone().into(),
            index: 0,
            handler,
        };
        next.run(ctx).await
    }

    fn ensure_unlocked(&self, operation: &str) -> Result<()> {
        if self.is_locked() {
            return Err(Error::middleware(format!(
                "cannot {operation} middleware: stack locked after first execution"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "stack_tests.rs"]
mod tests;
