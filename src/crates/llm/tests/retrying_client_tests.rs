//! Behaviour of the rate-limited retrying client

mod common;

use common::SequenceBackend;
use llm::{ChatMessage, ChatRequest, ChatResponse, ClientOptions, RetryingClient, ServiceError, ServiceErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tooling::{RateLimiter, RetryPolicy};

fn request() -> ChatRequest {
    ChatRequest::new("chapter-1", vec![ChatMessage::system("Write."), ChatMessage::user("go")])
}

#[tokio::test(start_paused = true)]
async fn test_always_transient_is_attempted_max_attempts_times() {
    let backend = Arc::new(SequenceBackend::always(ServiceError::from_status(503, "busy")));
    let client = RetryingClient::new(backend.clone(), RateLimiter::per_minute(100), RetryPolicy::new(4));

    let err = client.invoke(request()).await.unwrap_err();

    assert_eq!(err.kind, ServiceErrorKind::Transient);
    assert_eq!(err.attempts, 4);
    assert_eq!(backend.call_count(), 4);

    let times = backend.call_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_is_attempted_once() {
    let backend = Arc::new(SequenceBackend::always(ServiceError::from_status(403, "forbidden")));
    let client = RetryingClient::new(backend.clone(), RateLimiter::per_minute(100), RetryPolicy::new(3));

    let err = client.invoke(request()).await.unwrap_err();

    assert_eq!(err.kind, ServiceErrorKind::Permanent);
    assert_eq!(err.status, Some(403));
    assert_eq!(err.attempts, 1);
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_rate_limit_response() {
    let backend = Arc::new(SequenceBackend::new(vec![
        Err(ServiceError::from_status(429, "too many")),
        Ok(ChatResponse::text("<think>hmm</think>\nThe storm broke.")),
    ]));
    let client = RetryingClient::new(backend.clone(), RateLimiter::per_minute(100), RetryPolicy::new(3));

    let response = client.invoke(request()).await.unwrap();

    assert_eq!(response.text, "The storm broke.");
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_keep_reasoning_leaves_text_untouched() {
    let backend = Arc::new(SequenceBackend::new(vec![Ok(ChatResponse::text("<think>a</think>b"))]));
    let client = RetryingClient::new(backend, RateLimiter::per_minute(100), RetryPolicy::new(1))
        .with_options(ClientOptions {
            keep_reasoning: true,
            ..ClientOptions::default()
        });

    assert_eq!(client.invoke(request()).await.unwrap().text, "<think>a</think>b");
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_consumes_a_limiter_slot() {
    let backend = Arc::new(SequenceBackend::always(ServiceError::transient("reset")));
    let limiter = RateLimiter::per_minute(100);
    let client = RetryingClient::new(backend, limiter.clone(), RetryPolicy::new(3));

    let _ = client.invoke(request()).await;

    assert_eq!(limiter.count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_times_out_as_transient() {
    struct Hang;

    #[async_trait::async_trait]
    impl llm::ChatBackend for Hang {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ServiceError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "hang"
        }
    }

    let client = RetryingClient::new(Arc::new(Hang), RateLimiter::per_minute(100), RetryPolicy::new(2))
        .with_options(ClientOptions {
            attempt_timeout: Duration::from_secs(5),
            keep_reasoning: false,
        });

    let err = client.invoke(request()).await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Transient);
    assert_eq!(err.attempts, 2);
    assert!(err.detail.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_request_reaches_backend_with_citation_instruction() {
    let backend = Arc::new(SequenceBackend::new(vec![Ok(ChatResponse::text("ok"))]));
    let client = RetryingClient::new(backend.clone(), RateLimiter::per_minute(100), RetryPolicy::new(1));

    client.invoke(request()).await.unwrap();

    let calls = backend.calls.lock().unwrap();
    let system = &calls[0].1.messages[0].content;
    assert!(system.ends_with(llm::client::NO_CITATIONS));
}
