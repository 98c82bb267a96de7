//! Integration tests for QueueRunner.
//!
//! This test suite validates:
//! - Single pops via run_once (empty queue, job, numeric id, malformed payload)
//! - Runner lifecycle events (started, per-job outcome, stopped)
//! - A failing job cycles through the queue until dead-lettered

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fintrack_jobs::{
    Error, FnExtractor, MemoryStore, OcrJob, OcrProcessor, QueueRunner, RetryStore,
    RunnerConfig, RunnerEvent, TextExtractor,
};

fn runner(store: &MemoryStore, extractor: Arc<dyn TextExtractor>) -> QueueRunner {
    let processor = OcrProcessor::builder(Arc::new(store.clone()))
        .with_extractor(extractor)
        .build()
        .expect("processor builds");
    QueueRunner::new(
        processor,
        RunnerConfig::default()
            .with_pop_timeout(1)
            .with_error_backoff(10),
    )
}

fn receipt_text() -> Arc<dyn TextExtractor> {
    Arc::new(FnExtractor::new("fixed", |_job: &OcrJob| {
        Ok("TOTAL 12.50".to_string())
    }))
}

fn always_failing() -> Arc<dyn TextExtractor> {
    Arc::new(FnExtractor::new("failing", |_job: &OcrJob| {
        Err(Error::Extraction("unreadable receipt".to_string()))
    }))
}

async fn webhook(server: &MockServer) -> String {
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    format!("{}/hook", server.uri())
}

async fn next_event(events: &mut broadcast::Receiver<RunnerEvent>) -> RunnerEvent {
    timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

// ============================================================================
// RUN ONCE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_once_empty_queue_times_out() {
    let store = MemoryStore::new();
    let runner = runner(&store, receipt_text());

    assert_eq!(runner.run_once().await.unwrap(), None);
}

#[tokio::test]
async fn test_run_once_processes_job() {
    let server = MockServer::start().await;
    let url = webhook(&server).await;

    let store = MemoryStore::new();
    let job = OcrJob::new(url, "k").with_id("r-1");
    store
        .rpush("ocr", &serde_json::to_string(&job).unwrap())
        .await
        .unwrap();

    let runner = runner(&store, receipt_text());
    let mut events = runner.events();

    let event = runner.run_once().await.unwrap();
    assert_eq!(
        event,
        Some(RunnerEvent::JobCompleted {
            job_id: "r-1".to_string()
        })
    );
    assert_eq!(next_event(&mut events).await, event.unwrap());
    assert_eq!(store.len("ocr").await, 0);
}

#[tokio::test]
async fn test_run_once_dead_letters_malformed_payload() {
    let store = MemoryStore::new();
    store.rpush("ocr", "{not json").await.unwrap();

    let runner = runner(&store, receipt_text());
    let event = runner.run_once().await.unwrap();

    assert!(matches!(event, Some(RunnerEvent::PayloadRejected { .. })));
    assert_eq!(store.list("ocr_dead").await, vec!["{not json".to_string()]);
    assert_eq!(store.len("ocr").await, 0);
}

#[tokio::test]
async fn test_run_once_processes_numeric_id() {
    let store = MemoryStore::new();
    let payload = r#"{"id":42,"webhook_url":"http://127.0.0.1:1/hook","webhook_secret":"s"}"#;
    store.rpush("ocr", payload).await.unwrap();

    let runner = runner(&store, always_failing());
    let event = runner.run_once().await.unwrap();

    assert!(matches!(
        event,
        Some(RunnerEvent::JobRequeued { ref job_id, attempt: 1, .. }) if job_id == "42"
    ));
    assert_eq!(store.get("retries:42").await.unwrap().as_deref(), Some("1"));
    assert_eq!(store.len("ocr_dead").await, 0);

    // Requeued in the producer's form, id still a number.
    let requeued: serde_json::Value =
        serde_json::from_str(&store.list("ocr").await[0]).unwrap();
    let original: serde_json::Value = serde_json::from_str(payload).unwrap();
    assert_eq!(requeued, original);
}

#[tokio::test]
async fn test_run_once_completes_job_without_id() {
    let server = MockServer::start().await;
    let url = webhook(&server).await;

    let store = MemoryStore::new();
    let job = OcrJob::new(url, "k");
    store
        .rpush("ocr", &serde_json::to_string(&job).unwrap())
        .await
        .unwrap();

    let runner = runner(&store, receipt_text());
    match runner.run_once().await.unwrap() {
        Some(RunnerEvent::JobCompleted { job_id }) => {
            assert!(uuid::Uuid::parse_str(&job_id).is_ok());
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_run_once_reports_requeue() {
    let store = MemoryStore::new();
    let job = OcrJob::new("http://127.0.0.1:1/hook", "k").with_id("f-1");
    store
        .rpush("ocr", &serde_json::to_string(&job).unwrap())
        .await
        .unwrap();

    let runner = runner(&store, always_failing());
    let event = runner.run_once().await.unwrap();

    assert_eq!(
        event,
        Some(RunnerEvent::JobRequeued {
            job_id: "f-1".to_string(),
            attempt: 1,
            error: "Extraction error: unreadable receipt".to_string(),
        })
    );
    assert_eq!(store.len("ocr").await, 1);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_runner_lifecycle() {
    let server = MockServer::start().await;
    let url = webhook(&server).await;

    let store = MemoryStore::new();
    let handle = runner(&store, receipt_text()).start();
    let mut events = handle.events();

    assert_eq!(next_event(&mut events).await, RunnerEvent::RunnerStarted);

    let job = OcrJob::new(url, "k").with_id("l-1");
    store
        .rpush("ocr", &serde_json::to_string(&job).unwrap())
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        RunnerEvent::JobCompleted {
            job_id: "l-1".to_string()
        }
    );

    handle.shutdown().await.unwrap();
    assert_eq!(next_event(&mut events).await, RunnerEvent::RunnerStopped);
}

#[tokio::test]
async fn test_failing_job_cycles_until_dead_lettered() {
    let store = MemoryStore::new();
    let job = OcrJob::new("http://127.0.0.1:1/hook", "k")
        .with_id("c-1")
        .with_max_retries(2);
    store
        .rpush("ocr", &serde_json::to_string(&job).unwrap())
        .await
        .unwrap();

    let handle = runner(&store, always_failing()).start();
    let mut events = handle.events();

    assert_eq!(next_event(&mut events).await, RunnerEvent::RunnerStarted);
    assert!(matches!(
        next_event(&mut events).await,
        RunnerEvent::JobRequeued { attempt: 1, .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        RunnerEvent::JobDeadLettered { attempts: 2, .. }
    ));

    handle.shutdown().await.unwrap();
    assert_eq!(next_event(&mut events).await, RunnerEvent::RunnerStopped);

    assert_eq!(store.len("ocr").await, 0);
    assert_eq!(store.len("ocr_dead").await, 1);
    assert_eq!(store.get("retries:c-1").await.unwrap(), None);
}
