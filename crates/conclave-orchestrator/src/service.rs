use crate::dispatch::TaskDispatcher;
use crate::task_queue::{Priority, QueueConfig, QueueEntry, QueueHandle, QueueStats, QueueStatus};
use crate::types::AgentTask;
use crate::worker::WorkerPool;
use conclave_core::{AgentType, ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One chat message of an async submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of `POST /v1/async/submit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub agent_type: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl SubmitRequest {
    /// Build the task. `system` messages replace the profile's system prompt;
    /// the rest are rendered as `role: content` lines. An explicit `prompt`
    /// takes precedence over non-system messages.
    fn into_task(self, id: String) -> ConclaveResult<(AgentTask, Priority)> {
        let agent_type: AgentType = self.agent_type.parse()?;

        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role.eq_ignore_ascii_case("system"))
            .map(|m| m.content.as_str())
            .collect();
        let prompt = match self.prompt.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => self
                .messages
                .iter()
                .filter(|m| !m.role.eq_ignore_ascii_case("system"))
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if prompt.trim().is_empty() {
            return Err(ConclaveError::InvalidContext(
                "either a prompt or at least one non-system message is required".into(),
            ));
        }

        let mut task = AgentTask::new(id, agent_type, prompt)
            .with_limits(self.max_tokens, self.temperature);
        if !system.is_empty() {
            task.system_prompt = Some(system.join("\n"));
        }
        Ok((task, self.priority))
    }
}

/// Fire-and-forget submission: the priority queue, its worker pool and the
/// result store behind one value.
///
/// Created stopped; call [`start`](Self::start) inside a tokio runtime to
/// spawn the workers.
pub struct AsyncTaskService {
    queue: QueueHandle,
    dispatcher: Arc<TaskDispatcher>,
    workers: usize,
    pool: tokio::sync::Mutex<Option<WorkerPool>>,
    seq: AtomicU64,
}

impl AsyncTaskService {
    pub fn new(dispatcher: Arc<TaskDispatcher>, config: QueueConfig) -> Self {
        Self {
            workers: config.workers,
            queue: QueueHandle::new(config),
            dispatcher,
            pool: tokio::sync::Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Spawn the worker pool. No-op when already running.
    pub async fn start(&self) {
        let mut pool = self.pool.lock().await;
        if pool.is_none() {
            *pool = Some(WorkerPool::spawn(
                self.workers,
                self.queue.clone(),
                self.dispatcher.clone(),
            ));
        }
    }

    /// Stop the workers after their current task. Pending entries stay queued.
    pub async fn shutdown(&self) {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub async fn is_running(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    pub fn submit(&self, request: SubmitRequest) -> ConclaveResult<Uuid> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("async_{}_{}", request.agent_type.trim().to_ascii_lowercase(), n);
        let (task, priority) = request.into_task(id)?;
        self.submit_task(task, priority)
    }

    pub fn submit_task(&self, task: AgentTask, priority: Priority) -> ConclaveResult<Uuid> {
        let agent = task.agent_type;
        let task_id = self.queue.submit(task, priority)?;
        info!(%task_id, agent = %agent, ?priority, "Async task submitted");
        Ok(task_id)
    }

    pub fn status(&self, task_id: Uuid) -> ConclaveResult<QueueEntry> {
        self.queue.status(task_id)
    }

    pub fn cancel(&self, task_id: Uuid) -> ConclaveResult<QueueStatus> {
        self.queue.cancel(task_id)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}
