//! Integration tests for MappingRetryWorker against a mocked mapping service
//!
//! **Coverage:**
//! - Transient failure: 503 → requeue → redelivery → 201
//! - Permanent failure: 400 → dead-lettered without redelivery
//! - Exhaustion: repeated 503 → dead-lettered after the attempt limit
//! - Worker lifecycle: restart keeps the queue attached
//! - Shutdown: a redelivery still waiting out its delay goes back into the queue
//!
//! **Infrastructure:**
//! - WireMock HTTP server (simulates the mapping service)
//! - Real orchestrator, retry processor, queue and dead-letter store

use std::sync::Arc;
use std::time::Duration;

use syncbridge_core::{
    DeadLetterStore, MappingRetryProcessor, MappingRetryQueue, RetryableCaller, SyncDependencies,
    SyncOrchestrator,
};
use syncbridge_domain::{CallRetryConfig, FieldsConfig, Mapping, MappingRetryMessage, TargetId};
use syncbridge_infra::errors::WorkerError;
use syncbridge_infra::{
    ConfiguredEntityMapper, HttpClient, InMemoryDeadLetterStore, InMemoryRetryQueue,
    MappingRetryWorker, MappingRetryWorkerConfig, MappingServiceClient, SourceApiClient,
    TargetApiClient, TracingTelemetry,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Unreachable endpoint for the collaborators a mapping retry never calls.
const UNUSED_BASE: &str = "http://127.0.0.1:1";

struct Fixture {
    queue: InMemoryRetryQueue,
    dead_letters: Arc<InMemoryDeadLetterStore>,
    worker: MappingRetryWorker,
}

fn fixture(server: &MockServer, max_attempts: u32) -> Fixture {
    fixture_with_delay(server, max_attempts, Duration::from_millis(20))
}

fn fixture_with_delay(server: &MockServer, max_attempts: u32, redelivery_delay: Duration) -> Fixture {
    let http = HttpClient::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("http client");
    let mappings = MappingServiceClient::new(http.clone(), &server.uri()).expect("mapping client");
    let source = SourceApiClient::new(http.clone(), UNUSED_BASE, "alerts").expect("source client");
    let target = TargetApiClient::new(http, UNUSED_BASE, "alerts").expect("target client");

    let (queue, receiver) = InMemoryRetryQueue::channel(16);
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
    let telemetry = Arc::new(TracingTelemetry::new());

    let deps = SyncDependencies {
        mappings: Arc::new(mappings),
        source: Arc::new(source),
        target: Arc::new(target),
        mapper: Arc::new(ConfiguredEntityMapper::new(FieldsConfig::default())),
        retry_queue: Arc::new(queue.clone()),
        dead_letters: dead_letters.clone(),
        telemetry: telemetry.clone(),
    };
    let caller = RetryableCaller::from_config(&CallRetryConfig {
        initial_delay_ms: 1,
        max_delay_ms: 5,
        ..CallRetryConfig::default()
    })
    .expect("caller");
    let orchestrator = Arc::new(SyncOrchestrator::new(deps, caller, "NOMIS"));
    let processor = Arc::new(MappingRetryProcessor::new(
        orchestrator,
        dead_letters.clone(),
        telemetry,
        max_attempts,
    ));

    let worker = MappingRetryWorker::new(
        processor,
        queue.clone(),
        receiver,
        MappingRetryWorkerConfig {
            redelivery_delay,
            join_timeout: Duration::from_secs(2),
        },
    );

    Fixture { queue, dead_letters, worker }
}

fn message() -> MappingRetryMessage {
    MappingRetryMessage::new(Mapping::source_created("a-1", TargetId::Numeric(42)))
        .with_error("503 mapping service unavailable")
}

async fn wait_for_requests(server: &MockServer, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let received = server.received_requests().await.map_or(0, |r| r.len());
            if received >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("mapping service should receive the expected requests");
}

async fn wait_for_dead_letters(store: &InMemoryDeadLetterStore, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.len() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message should be dead-lettered");
}

/// Validates a transient mapping failure is redelivered and then succeeds.
///
/// Assertions:
/// - The mapping service sees exactly two POSTs
/// - Nothing is dead-lettered
#[tokio::test]
async fn transient_failure_is_redelivered_until_written() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut fx = fixture(&server, 3);
    fx.worker.start().expect("worker starts");
    fx.queue.enqueue(message()).await.expect("enqueue");

    wait_for_requests(&server, 2).await;
    // Allow the second delivery to be processed
    tokio::time::sleep(Duration::from_millis(50)).await;

    fx.worker.stop().await.expect("worker stops");
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 2);
    assert!(fx.dead_letters.is_empty());
}

#[tokio::test]
async fn permanent_failure_is_dead_lettered_without_redelivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let mut fx = fixture(&server, 3);
    fx.worker.start().expect("worker starts");
    fx.queue.enqueue(message()).await.expect("enqueue");

    wait_for_dead_letters(&fx.dead_letters, 1).await;
    fx.worker.stop().await.expect("worker stops");

    let letters = fx.dead_letters.list().await.expect("list");
    assert_eq!(letters[0].message.mapping.source_id, "a-1");
    assert!(letters[0].reason.contains("permanent"));
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 1);
}

/// Validates a message that keeps failing is dead-lettered at the limit.
///
/// Assertions:
/// - Exactly `max_attempts` deliveries reach the mapping service
/// - The dead letter records the final attempt number
#[tokio::test]
async fn repeated_transient_failure_is_dead_lettered_at_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut fx = fixture(&server, 3);
    fx.worker.start().expect("worker starts");
    fx.queue.enqueue(message()).await.expect("enqueue");

    wait_for_dead_letters(&fx.dead_letters, 1).await;
    fx.worker.stop().await.expect("worker stops");

    let letters = fx.dead_letters.list().await.expect("list");
    assert_eq!(letters[0].message.attempt, 3);
    assert!(letters[0].reason.contains("exhausted"));
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 3);
}

#[tokio::test]
async fn worker_restarts_with_the_same_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut fx = fixture(&server, 3);
    fx.worker.start().expect("first start");
    assert!(matches!(fx.worker.start(), Err(WorkerError::AlreadyRunning)));
    fx.worker.stop().await.expect("first stop");
    assert!(!fx.worker.is_running());
    assert!(matches!(fx.worker.stop().await, Err(WorkerError::NotRunning)));

    fx.queue.enqueue(message()).await.expect("enqueue while stopped");
    fx.worker.start().expect("restart");

    wait_for_requests(&server, 1).await;
    fx.worker.stop().await.expect("second stop");
    assert!(fx.dead_letters.is_empty());
}

/// Validates that stopping the worker keeps a message whose redelivery is
/// still waiting out its delay.
///
/// Assertions:
/// - After stop the message is back in the queue and nothing is dead-lettered
/// - A restarted worker delivers it without waiting for the original delay
#[tokio::test]
async fn stop_returns_pending_redelivery_to_the_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut fx = fixture_with_delay(&server, 3, Duration::from_secs(60));
    fx.worker.start().expect("worker starts");
    fx.queue.enqueue(message()).await.expect("enqueue");

    wait_for_requests(&server, 1).await;
    fx.worker.stop().await.expect("worker stops");

    assert_eq!(fx.queue.len(), 1);
    assert!(fx.dead_letters.is_empty());

    fx.worker.start().expect("restart");
    wait_for_requests(&server, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.worker.stop().await.expect("second stop");

    assert!(fx.queue.is_empty());
    assert!(fx.dead_letters.is_empty());
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 2);
}
