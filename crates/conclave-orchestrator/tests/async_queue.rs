//! Async submission service: priority scheduling, backpressure and the
//! worker pool lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conclave_backend::{BackendClient, InvokeRequest, InvokeResponse, ModelRouter, RouteTable};
use conclave_core::{AgentType, ConclaveError, ConclaveResult};
use conclave_orchestrator::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Records prompts in call order; fails prompts starting with `fail` and
/// panics on prompts starting with `crash`.
struct Recorder {
    delay: Duration,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl BackendClient for Recorder {
    fn id(&self) -> &str {
        "general-8b"
    }

    async fn invoke(&self, request: &InvokeRequest) -> ConclaveResult<InvokeResponse> {
        self.seen.lock().push(request.prompt.clone());
        tokio::time::sleep(self.delay).await;
        if request.prompt.starts_with("crash") {
            panic!("backend crashed mid-call");
        }
        if request.prompt.starts_with("fail") {
            return Err(ConclaveError::Backend {
                backend: "general-8b".into(),
                status: Some(500),
                message: "boom".into(),
            });
        }
        Ok(InvokeResponse {
            content: format!("done: {}", request.prompt).into(),
            tokens: 3,
        })
    }

    async fn health(&self) -> bool {
        true
    }
}

fn service(workers: usize, capacity: usize) -> (AsyncTaskService, Arc<Recorder>) {
    let recorder = Arc::new(Recorder {
        delay: Duration::from_millis(250),
        seen: Mutex::new(Vec::new()),
    });
    let router =
        ModelRouter::new(RouteTable::uniform("general-8b", None), vec![recorder.clone()]).unwrap();
    let dispatcher = Arc::new(TaskDispatcher::new(Arc::new(router)));
    let config = QueueConfig {
        capacity,
        workers,
        aging_interval: 8,
        result_ttl_secs: 600,
    };
    (AsyncTaskService::new(dispatcher, config), recorder)
}

fn request(agent: &str, prompt: &str, priority: Priority) -> SubmitRequest {
    SubmitRequest {
        agent_type: agent.into(),
        prompt: Some(prompt.into()),
        priority,
        ..SubmitRequest::default()
    }
}

async fn wait_terminal(svc: &AsyncTaskService, id: Uuid) -> QueueEntry {
    for _ in 0..200 {
        let entry = svc.status(id).unwrap();
        if entry.status.is_terminal() {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("task {id} never finished");
}

// ---------------------------------------------------------------------------
// Submit → Running → Done, result kept for polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn submitted_task_completes() {
    let (svc, _) = service(2, 16);
    svc.start().await;

    let id = svc
        .submit(request("clinical", "fever and rash", Priority::Normal))
        .unwrap();
    let entry = wait_terminal(&svc, id).await;

    assert_eq!(entry.status, QueueStatus::Done);
    assert!(entry.started_at.is_some());
    let result = entry.result.unwrap();
    assert!(result.success);
    assert_eq!(result.agent_type, AgentType::Clinical);
    assert_eq!(result.content.to_text(), "done: fever and rash");
    assert_eq!(result.model_used.as_deref(), Some("general-8b"));

    // Still queryable after completion.
    assert_eq!(svc.status(id).unwrap().status, QueueStatus::Done);
    let stats = svc.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.running, 0);

    svc.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn backend_failure_marks_entry_failed() {
    let (svc, _) = service(1, 16);
    svc.start().await;

    let id = svc
        .submit(request("billing", "fail this one", Priority::High))
        .unwrap();
    let entry = wait_terminal(&svc, id).await;

    assert_eq!(entry.status, QueueStatus::Failed);
    let result = entry.result.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("all backends exhausted"));
    assert_eq!(svc.stats().failed, 1);

    svc.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_backend_fails_entry_and_keeps_worker() {
    let (svc, recorder) = service(1, 16);
    let crashed = svc
        .submit(request("clinical", "crash now", Priority::High))
        .unwrap();
    let after = svc
        .submit(request("clinical", "next patient", Priority::Normal))
        .unwrap();
    svc.start().await;

    let entry = wait_terminal(&svc, crashed).await;
    assert_eq!(entry.status, QueueStatus::Failed);
    let result = entry.result.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("dispatch aborted"));

    // The only worker is still alive to serve the next entry.
    assert_eq!(wait_terminal(&svc, after).await.status, QueueStatus::Done);
    assert_eq!(recorder.seen.lock().as_slice(), ["crash now", "next patient"]);

    let state = svc
        .dispatcher()
        .monitor()
        .get_state(AgentType::Clinical)
        .await
        .unwrap();
    assert_eq!(state.metrics.in_flight, 0);
    assert_eq!(state.metrics.errors, 1);
    assert_eq!(svc.stats().failed, 1);

    svc.shutdown().await;
}

// ---------------------------------------------------------------------------
// Higher priority first, FIFO within a priority
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn single_worker_serves_by_priority() {
    let (svc, recorder) = service(1, 16);

    let ids: Vec<Uuid> = [
        ("low-1", Priority::Low),
        ("normal-1", Priority::Normal),
        ("critical-1", Priority::Critical),
        ("normal-2", Priority::Normal),
        ("high-1", Priority::High),
    ]
    .into_iter()
    .map(|(p, prio)| svc.submit(request("triage", p, prio)).unwrap())
    .collect();
    assert_eq!(svc.stats().depth, 5);

    svc.start().await;
    for id in &ids {
        wait_terminal(&svc, *id).await;
    }

    let order = recorder.seen.lock().clone();
    assert_eq!(order, vec!["critical-1", "high-1", "normal-1", "normal-2", "low-1"]);
    assert!(svc.stats().avg_wait_ms > 0.0);

    svc.shutdown().await;
}

// ---------------------------------------------------------------------------
// Backpressure: saturated queue rejects immediately and does not grow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn saturated_queue_rejects_submissions() {
    let (svc, _) = service(1, 3);
    for i in 0..3 {
        svc.submit(request("triage", &format!("t{i}"), Priority::Low))
            .unwrap();
    }

    let err = svc
        .submit(request("triage", "one too many", Priority::Critical))
        .unwrap_err();
    assert!(matches!(err, ConclaveError::QueueSaturated { capacity: 3 }));

    let stats = svc.stats();
    assert_eq!(stats.depth, 3);
    assert_eq!(stats.by_priority[&Priority::Low], 3);
    assert_eq!(stats.by_priority[&Priority::Critical], 0);
}

#[tokio::test]
async fn invalid_submission_is_rejected() {
    let (svc, _) = service(1, 3);
    let err = svc
        .submit(request("cardiology", "ecg", Priority::Normal))
        .unwrap_err();
    assert!(matches!(err, ConclaveError::UnknownAgentType(_)));
    assert_eq!(svc.stats().depth, 0);
}

// ---------------------------------------------------------------------------
// Cancellation and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancelled_entry_is_never_dispatched() {
    let (svc, recorder) = service(1, 8);
    let keep = svc
        .submit(request("triage", "keep", Priority::Normal))
        .unwrap();
    let drop_me = svc
        .submit(request("triage", "drop", Priority::Critical))
        .unwrap();

    assert_eq!(svc.cancel(drop_me).unwrap(), QueueStatus::Cancelled);
    svc.start().await;
    wait_terminal(&svc, keep).await;

    assert_eq!(recorder.seen.lock().as_slice(), ["keep"]);
    assert_eq!(svc.status(drop_me).unwrap().status, QueueStatus::Cancelled);
    assert_eq!(svc.cancel(keep).unwrap(), QueueStatus::Done);
    assert!(matches!(
        svc.status(Uuid::new_v4()),
        Err(ConclaveError::TaskNotFound(_))
    ));

    svc.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_leaves_pending_work_queued() {
    let (svc, recorder) = service(2, 8);
    svc.start().await;
    assert!(svc.is_running().await);
    svc.shutdown().await;
    assert!(!svc.is_running().await);

    let id = svc
        .submit(request("documentation", "later", Priority::Normal))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(svc.status(id).unwrap().status, QueueStatus::Pending);
    assert!(recorder.seen.lock().is_empty());

    svc.start().await;
    assert_eq!(wait_terminal(&svc, id).await.status, QueueStatus::Done);
    svc.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn workers_share_the_monitor() {
    let (svc, _) = service(3, 8);
    svc.start().await;
    let ids: Vec<Uuid> = (0..3)
        .map(|i| {
            svc.submit(request("radiology", &format!("film {i}"), Priority::Normal))
                .unwrap()
        })
        .collect();
    for id in ids {
        wait_terminal(&svc, id).await;
    }

    let state = svc
        .dispatcher()
        .monitor()
        .get_state(AgentType::Radiology)
        .await
        .unwrap();
    assert_eq!(state.metrics.calls, 3);
    assert_eq!(state.metrics.succeeded, 3);
    assert_eq!(state.metrics.in_flight, 0);
    svc.shutdown().await;
}
