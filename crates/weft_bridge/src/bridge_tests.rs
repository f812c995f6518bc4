use futures::TryStreamExt as _;
use weft_adapter::{MockBackend, MockOutcome, PassthroughFrontend};
use weft_ir::Message;
use weft_middleware::{Middleware, Next};
use weft_router::{FallbackStrategy, RouteStrategy, RouterConfig};

use super::*;
use crate::event::EventKind;

fn request() -> ChatRequest {
    ChatRequest::new(vec![Message::user("Hi")])
}

fn bridge_over(backend: Arc<MockBackend>) -> Bridge<PassthroughFrontend> {
    Bridge::new(PassthroughFrontend::new(), backend)
}

fn record_kinds(bridge: &Bridge<PassthroughFrontend>) -> Arc<Mutex<Vec<&'static str>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    bridge.events().on_any(Arc::new(move |event: &BridgeEvent| {
        sink.lock().push(event.kind().as_str());
    }));
    log
}

#[test_log::test(tokio::test)]
async fn unary_round_trip_through_the_passthrough_frontend() {
    let backend = Arc::new(MockBackend::with_message("b1", "hello"));
    let bridge = bridge_over(Arc::clone(&backend));
    let log = record_kinds(&bridge);

    let request = request();
    let id = request.metadata.request_id.clone();
    let response = bridge.chat(request).await.unwrap();

    assert_eq!(response.text(), "hello");
    assert_eq!(response.metadata.request_id, id);
    assert_eq!(response.metadata.provenance.backend.as_deref(), Some("b1"));

    let stats = bridge.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.backend_usage["b1"], 1);

    assert_eq!(*log.lock(), vec!["request:start", "request:success"]);
}

#[test_log::test(tokio::test)]
async fn request_id_is_generated_when_missing() {
    let backend = Arc::new(MockBackend::with_message("b1", "hello"));
    let bridge = bridge_over(backend);

    let mut request = request();
    request.metadata.request_id = String::new();

    let response = bridge.chat(request).await.unwrap();
    assert!(!response.metadata.request_id.is_empty());
}

struct Tag;

#[async_trait::async_trait]
impl Middleware for Tag {
    fn name(&self) -> &str {
        "tag"
    }

    async fn handle(&self, ctx: Context, next: Next) -> Result<ChatResponse> {
        next.run(ctx).await
    }
}

#[test_log::test(tokio::test)]
async fn middleware_runs_and_lands_in_provenance() {
    let backend = Arc::new(MockBackend::with_message("b1", "hello"));
    let mut bridge = bridge_over(backend);
    bridge.stack_mut().with(Arc::new(Tag)).unwrap();
    let log = record_kinds(&bridge);

    let response = bridge.chat(request()).await.unwrap();
    assert_eq!(response.metadata.provenance.middleware, vec!["tag"]);
    assert!(log.lock().contains(&"middleware:executed"));
}

#[test_log::test(tokio::test)]
async fn skip_middleware_bypasses_the_stack() {
    let backend = Arc::new(MockBackend::with_message("b1", "hello"));
    let mut bridge = bridge_over(backend);
    bridge.stack_mut().with(Arc::new(Tag)).unwrap();

    let response = bridge
        .chat_with(request(), RequestOptions {
            skip_middleware: true,
            ..RequestOptions::default()
        })
        .await
        .unwrap();
    assert!(response.metadata.provenance.middleware.is_empty());
}

#[tokio::test(start_paused = true)]
async fn request_timeout_fails_and_cancels_the_backend() {
    let backend = Arc::new(
        MockBackend::with_message("b1", "late").with_delay(Duration::from_secs(600)),
    );
    let bridge = bridge_over(Arc::clone(&backend));
    let log = record_kinds(&bridge);

    let err = bridge
        .chat_with(request(), RequestOptions {
            timeout: Some(Duration::from_millis(50)),
            ..RequestOptions::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Timeout);
    assert_eq!(bridge.stats().errors_by_code["timeout"], 1);
    assert!(log.lock().contains(&"request:error"));
}

#[tokio::test(start_paused = true)]
async fn bridge_level_retry_is_disabled_at_zero_and_counted_otherwise() {
    let flaky = || {
        Arc::new(MockBackend::with_script("b1", vec![
            MockOutcome::Fail(weft_ir::Error::network("blip")),
            MockOutcome::Respond("recovered".into()),
        ]))
    };

    // retries = 0: the first failure surfaces.
    let backend = flaky();
    let bridge = bridge_over(Arc::clone(&backend));
    assert!(bridge.chat(request()).await.is_err());
    assert_eq!(backend.calls(), 1);

    // retries = 1: the second attempt succeeds.
    let backend = flaky();
    let bridge = bridge_over(Arc::clone(&backend)).with_config(BridgeConfig {
        retries: 1,
        ..BridgeConfig::default()
    });
    let response = bridge.chat(request()).await.unwrap();
    assert_eq!(response.text(), "recovered");
    assert_eq!(backend.calls(), 2);
}

#[test_log::test(tokio::test)]
async fn cancellation_surfaces_as_a_cancelled_request() {
    let backend = Arc::new(
        MockBackend::with_message("b1", "never").with_delay(Duration::from_secs(600)),
    );
    let bridge = bridge_over(Arc::clone(&backend));
    let log = record_kinds(&bridge);

    let signal = CancellationToken::new();
    signal.cancel();

    let err = bridge
        .chat_with(request(), RequestOptions {
            signal: Some(signal),
            ..RequestOptions::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Cancelled);
    assert!(backend.was_cancelled());
    assert!(log.lock().contains(&"request:cancelled"));
}

#[test_log::test(tokio::test)]
async fn streaming_emits_lifecycle_events_and_counts() {
    let backend = Arc::new(MockBackend::with_message("b1", "hello"));
    let bridge = bridge_over(backend);
    let log = record_kinds(&bridge);

    let stream = bridge.chat_stream(request()).await.unwrap();
    let chunks: Vec<_> = stream.try_collect().await.unwrap();

    // start + content + done from the mock.
    assert_eq!(chunks.len(), 3);
    assert!(chunks[2].is_done());

    let kinds = log.lock().clone();
    assert_eq!(kinds[0], "stream:start");
    assert_eq!(kinds.iter().filter(|k| **k == "stream:chunk").count(), 3);
    assert_eq!(*kinds.last().unwrap(), "stream:complete");

    assert_eq!(bridge.stats().streaming_requests, 1);
}

#[test_log::test(tokio::test)]
async fn stream_open_failure_emits_stream_error() {
    let backend = Arc::new(MockBackend::failing("b1", weft_ir::Error::network("down")));
    let bridge = bridge_over(backend);
    let log = record_kinds(&bridge);

    assert!(bridge.chat_stream(request()).await.is_err());
    assert_eq!(*log.lock(), vec!["stream:start", "stream:error"]);
}

#[test_log::test(tokio::test)]
async fn router_backed_bridge_forwards_selection_and_failover_events() {
    let router = Arc::new(weft_router::Router::new(RouterConfig {
        strategy: RouteStrategy::RoundRobin,
        fallback: FallbackStrategy::Sequential,
        ..RouterConfig::default()
    }));
    router.register(Arc::new(MockBackend::failing(
        "b1",
        weft_ir::Error::network("down"),
    )));
    router.register(Arc::new(MockBackend::with_message("b2", "rescued")));

    let bridge = Bridge::with_router(PassthroughFrontend::new(), Arc::clone(&router));
    let log = record_kinds(&bridge);

    let response = bridge.chat(request()).await.unwrap();
    assert_eq!(response.text(), "rescued");

    let kinds = log.lock().clone();
    assert!(kinds.contains(&"backend:selected"));
    assert!(kinds.contains(&"backend:failover"));
    assert!(bridge.router().is_some());
}

#[test_log::test(tokio::test)]
async fn backend_override_reaches_the_router() {
    let router = Arc::new(weft_router::Router::new(RouterConfig::default()));
    router.register(Arc::new(MockBackend::with_message("b1", "one")));
    router.register(Arc::new(MockBackend::with_message("b2", "two")));

    let bridge = Bridge::with_router(PassthroughFrontend::new(), router);
    let response = bridge
        .chat_with(request(), RequestOptions {
            backend: Some("b2".into()),
            ..RequestOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(response.text(), "two");
}

#[test_log::test(tokio::test)]
async fn once_listener_observes_a_single_request() {
    let backend = Arc::new(MockBackend::with_message("b1", "hello"));
    let bridge = bridge_over(backend);

    let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    bridge.events().once(
        EventKind::RequestSuccess,
        Arc::new(move |_| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }),
    );

    bridge.chat(request()).await.unwrap();
    bridge.chat(request()).await.unwrap();
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
}
