use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use weft_ir::{ChatResponse, Error, Message, Result};

use crate::{
    context::Context,
    stack::{Middleware, Next},
};

/// Errors produced by caller-supplied transformers, outside the taxonomy
/// until wrapped.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type MessagesFn = Arc<
    dyn Fn(Vec<Message>) -> BoxFuture<'static, std::result::Result<Vec<Message>, BoxError>>
        + Send
        + Sync,
>;
type RequestFn = Arc<
    dyn Fn(weft_ir::ChatRequest)
            -> BoxFuture<'static, std::result::Result<weft_ir::ChatRequest, BoxError>>
        + Send
        + Sync,
>;
type ResponseFn = Arc<
    dyn Fn(ChatResponse) -> BoxFuture<'static, std::result::Result<ChatResponse, BoxError>>
        + Send
        + Sync,
>;

/// Caller-supplied transforms in fixed order: messages, then the whole
/// request, then (after the inner layers return) the response.
///
/// Each transformer may be asynchronous; any failure aborts before `next`
/// is called and surfaces as a `middleware` error.
#[derive(Default, Clone)]
pub struct TransformMiddleware {
    messages: Option<MessagesFn>,
    request: Option<RequestFn>,
    response: Option<ResponseFn>,
}

impl TransformMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Vec<Message>, BoxError>> + Send + 'static,
    {
        self.messages = Some(Arc::new(move |messages| Box::pin(f(messages))));
        self
    }

    #[must_use]
    pub fn request<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(weft_ir::ChatRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<weft_ir::ChatRequest, BoxError>> + Send + 'static,
    {
        self.request = Some(Arc::new(move |request| Box::pin(f(request))));
        self
    }

    #[must_use]
    pub fn response<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ChatResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<ChatResponse, BoxError>> + Send + 'static,
    {
        self.response = Some(Arc::new(move |response| Box::pin(f(response))));
        self
    }
}

fn wrap(stage: &str, error: BoxError) -> Error {
    Error::middleware(format!("{stage} transform failed: {error}"))
}

#[async_trait]
impl Middleware for TransformMiddleware {
    fn name(&self) -> &str {
        "transform"
    }

    async fn handle(&self, mut ctx: Context, next: Next) -> Result<ChatResponse> {
        if let Some(transform) = &self.messages {
            let messages = std::mem::take(&mut ctx.request.messages);
            ctx.request.messages = transform(messages)
                .await
                .map_err(|e| wrap("messages", e))?;
        }

        if let Some(transform) = &self.request {
            ctx.request = transform(ctx.request.clone())
                .await
                .map_err(|e| wrap("request", e))?;
        }

        let response = next.run(ctx).await?;

        match &self.response {
            Some(transform) => transform(response).await.map_err(|e| wrap("response", e)),
            None => Ok(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use weft_ir::{ChatRequest, FinishReason, Metadata};

    use super::*;
    use crate::stack::{Handler, Stack};

    fn echo_handler() -> Handler {
        Arc::new(|ctx| {
            Box::pin(async move {
                Ok(ChatResponse::new(
                    Message::assistant(ctx.request.messages[0].text()),
                    FinishReason::Stop,
                    Metadata::with_request_id("req-1"),
                ))
            })
        })
    }

    fn ctx(text: &str) -> Context {
        Context::unary(ChatRequest::new(vec![Message::user(text)]))
    }

    #[tokio::test]
    async fn transforms_apply_in_messages_request_response_order() {
        let middleware = TransformMiddleware::new()
            .messages(|mut messages: Vec<Message>| async move {
                messages[0] = Message::user(format!("[m]{}", messages[0].text()));
                Ok(messages)
            })
            .request(|mut request: ChatRequest| async move {
                request.messages[0] = Message::user(format!("[r]{}", request.messages[0].text()));
                Ok(request)
            })
            .response(|mut response: ChatResponse| async move {
                response.message = Message::assistant(format!("{}[p]", response.text()));
                Ok(response)
            });

        let mut stack = Stack::new();
        stack.with(Arc::new(middleware)).unwrap();

        let response = stack.execute(ctx("x"), echo_handler()).await.unwrap();
        // messages ran before request, response last.
        assert_eq!(response.text(), "[r][m]x[p]");
    }

    #[tokio::test]
    async fn failing_transform_aborts_before_the_handler() {
        let middleware = TransformMiddleware::new()
            .messages(|_| async { Err::<Vec<Message>, _>("nope".into()) });

        let mut stack = Stack::new();
        stack.with(Arc::new(middleware)).unwrap();

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = Arc::clone(&called);
        let handler: Handler = Arc::new(move |_| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.store(true, std::sync::atomic::Ordering::SeqCst);
                unreachable!("handler must not run")
            })
        });

        let err = stack.execute(ctx("x"), handler).await.unwrap_err();
        assert_eq!(err.code, weft_ir::ErrorCode::Middleware);
        assert!(err.message.contains("messages transform failed"));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }
}
