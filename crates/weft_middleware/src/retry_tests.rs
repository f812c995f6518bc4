use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;
use weft_ir::{ChatRequest, FinishReason, Message, Metadata};

use super::*;
use crate::stack::{Handler, Stack};

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(1),
        backoff_multiplier: 2.0,
        use_jitter: false,
        predicate: RetryPredicate::Retryable,
    }
}

/// A handler failing `failures` times before succeeding, counting calls.
fn flaky_handler(failures: u32, error: Error, calls: &Arc<AtomicU32>) -> Handler {
    let calls = Arc::clone(calls);
    Arc::new(move |_ctx| {
        let calls = Arc::clone(&calls);
        let error = error.clone();
        Box::pin(async move {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                Err(error)
            } else {
                Ok(ChatResponse::new(
                    Message::assistant("ok"),
                    FinishReason::Stop,
                    Metadata::with_request_id("req-1"),
                ))
            }
        })
    })
}

fn ctx() -> Context {
    Context::unary(ChatRequest::new(vec![Message::user("hi")]))
}

async fn run(
    policy: RetryPolicy,
    failures: u32,
    error: Error,
) -> (Result<ChatResponse>, u32) {
    let calls = Arc::new(AtomicU32::new(0));
    let mut stack = Stack::new();
    stack
        .with(Arc::new(RetryMiddleware::new(policy)))
        .unwrap();

    let result = stack
        .execute(ctx(), flaky_handler(failures, error, &calls))
        .await;
    (result, calls.load(Ordering::SeqCst))
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let (result, calls) = run(policy(3), 2, Error::network("flaky")).await;
    assert_eq!(result.unwrap().text(), "ok");
    assert_eq!(calls, 3);
}

#[tokio::test(start_paused = true)]
async fn max_attempts_is_exact_when_everything_is_retryable() {
    let (result, calls) = run(policy(3), u32::MAX, Error::network("always down")).await;
    assert!(result.is_err());
    assert_eq!(calls, 3);
}

#[tokio::test(start_paused = true)]
async fn predicate_does_not_cap_attempts_on_its_own() {
    // A predicate that always says yes: the policy alone bounds attempts.
    let mut policy = policy(5);
    policy.predicate = RetryPredicate::Custom(Arc::new(|_, _| true));

    let (result, calls) = run(policy, u32::MAX, Error::validation("still retried")).await;
    assert!(result.is_err());
    assert_eq!(calls, 5);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_errors_fail_fast() {
    let (result, calls) = run(policy(5), u32::MAX, Error::validation("bad request")).await;
    assert_eq!(result.unwrap_err().code, ErrorCode::Validation);
    assert_eq!(calls, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_after_overrides_computed_backoff() {
    let started = tokio::time::Instant::now();
    let error = Error::rate_limit(Some(Duration::from_secs(7)));
    let (result, calls) = run(policy(2), 1, error).await;

    assert!(result.is_ok());
    assert_eq!(calls, 2);
    assert!(started.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_and_is_capped() {
    let policy = policy(10);
    assert_eq!(policy.backoff_delay(1), Duration::from_millis(10));
    assert_eq!(policy.backoff_delay(2), Duration::from_millis(20));
    assert_eq!(policy.backoff_delay(3), Duration::from_millis(40));
    assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_remaining_attempts() {
    let signal = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));

    let mut stack = Stack::new();
    let mut long_policy = policy(5);
    long_policy.initial_delay = Duration::from_secs(60);
    stack
        .with(Arc::new(RetryMiddleware::new(long_policy)))
        .unwrap();

    let cancel = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let result = stack
        .execute(
            ctx().with_signal(signal),
            flaky_handler(u32::MAX, Error::network("down"), &calls),
        )
        .await;

    assert_eq!(result.unwrap_err().code, ErrorCode::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
