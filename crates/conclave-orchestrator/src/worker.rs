use crate::dispatch::TaskDispatcher;
use crate::task_queue::QueueHandle;
use crate::types::{AgentTask, TaskResult};
use conclave_core::ConclaveError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Fixed set of tokio tasks draining a [`QueueHandle`].
///
/// Each worker claims one entry at a time, runs it through the shared
/// [`TaskDispatcher`] and stores the result back in the queue. Only the
/// worker that claimed an entry completes it.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    queue: QueueHandle,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current runtime.
    pub fn spawn(size: usize, queue: QueueHandle, dispatcher: Arc<TaskDispatcher>) -> Self {
        let size = size.max(1);
        let (shutdown, rx) = watch::channel(false);
        let handles = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue.clone(),
                    dispatcher.clone(),
                    rx.clone(),
                ))
            })
            .collect();
        info!(workers = size, "Worker pool started");
        Self {
            handles,
            shutdown,
            queue,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop claiming new work and wait for in-flight tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.queue.wake_all();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: QueueHandle,
    dispatcher: Arc<TaskDispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some((task_id, task)) = queue.claim_next() else {
            tokio::select! {
                _ = queue.notified() => continue,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        };

        debug!(worker_id, %task_id, agent = %task.agent_type, "Task claimed");
        let result = dispatch_isolated(&dispatcher, task).await;
        if let Err(e) = queue.complete(task_id, result) {
            warn!(worker_id, %task_id, error = %e, "Could not store task result");
        }
    }
    debug!(worker_id, "Worker stopped");
}

/// Run one dispatch on its own tokio task so a panicking backend fails the
/// entry instead of killing the worker.
async fn dispatch_isolated(dispatcher: &Arc<TaskDispatcher>, task: AgentTask) -> TaskResult {
    let started = Instant::now();
    let handle = {
        let dispatcher = dispatcher.clone();
        let task = task.clone();
        tokio::spawn(async move {
            let prompt = task.prompt.clone();
            dispatcher.dispatch(&task, prompt).await
        })
    };

    match handle.await {
        Ok(result) => result,
        Err(join_err) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            error!(task = %task.id, agent = %task.agent_type, error = %join_err, "Dispatch aborted");
            dispatcher
                .monitor()
                .abandon_call(task.agent_type, latency_ms)
                .await;
            let err = ConclaveError::BackendUnavailable {
                agent_type: task.agent_type.to_string(),
                last_error: format!("dispatch aborted: {join_err}"),
            };
            TaskResult::failed(&task, &err, latency_ms)
        }
    }
}
