use crate::types::{AgentTask, TaskResult};
use chrono::{DateTime, Utc};
use conclave_core::{ConclaveError, ConclaveResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Submission priority, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Base scheduling level.
    pub fn level(self) -> u64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

/// Lifecycle of a queue entry. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    fn can_transition_to(self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Done)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Running => "running",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// `[queue]` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of Pending entries.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Worker pool size.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Dequeue cycles it takes to raise a waiting entry by one level.
    #[serde(default = "default_aging_interval")]
    pub aging_interval: u64,
    /// How long terminal entries stay queryable.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
}

fn default_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

fn default_aging_interval() -> u64 {
    8
}

fn default_result_ttl_secs() -> u64 {
    3600
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            workers: default_workers(),
            aging_interval: default_aging_interval(),
            result_ttl_secs: default_result_ttl_secs(),
        }
    }
}

impl QueueConfig {
    fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

/// One submitted task and its lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub task_id: Uuid,
    pub task: AgentTask,
    pub priority: Priority,
    pub status: QueueStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    #[serde(skip)]
    seq: u64,
    #[serde(skip)]
    enqueued_cycle: u64,
    #[serde(skip)]
    submitted_instant: Instant,
    #[serde(skip)]
    finished_instant: Option<Instant>,
}

impl QueueEntry {
    fn transition(&mut self, next: QueueStatus) -> ConclaveResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ConclaveError::InvalidTransition {
                task_id: self.task_id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Queue statistics served at `GET /v1/async/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Pending entries.
    pub depth: usize,
    pub running: usize,
    pub capacity: usize,
    /// Pending entries per priority.
    pub by_priority: BTreeMap<Priority, usize>,
    /// Mean time from submission to claim.
    pub avg_wait_ms: f64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Terminal entries still held in the result store.
    pub retained: usize,
}

/// Bounded priority queue with aging, plus the result store for
/// finished entries.
///
/// Effective priority is `level + cycles_waited / aging_interval`, where a
/// cycle is one successful claim. Equal effective priorities are served in
/// submission order. A Pending entry is therefore claimed within
/// `(critical - level) * aging_interval + capacity` cycles.
pub struct PriorityTaskQueue {
    config: QueueConfig,
    entries: HashMap<Uuid, QueueEntry>,
    /// Pending ids in submission order.
    pending: Vec<Uuid>,
    running: usize,
    cycle: u64,
    next_seq: u64,
    wait_total_ms: u64,
    wait_samples: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

impl PriorityTaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            pending: Vec::new(),
            running: 0,
            cycle: 0,
            next_seq: 0,
            wait_total_ms: 0,
            wait_samples: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a task. Fails immediately with `QueueSaturated` at capacity.
    pub fn submit(&mut self, task: AgentTask, priority: Priority) -> ConclaveResult<Uuid> {
        self.purge_expired(Instant::now());
        if self.pending.len() >= self.config.capacity {
            return Err(ConclaveError::QueueSaturated {
                capacity: self.config.capacity,
            });
        }

        let task_id = Uuid::new_v4();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            task_id,
            QueueEntry {
                task_id,
                task,
                priority,
                status: QueueStatus::Pending,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
                result: None,
                seq,
                enqueued_cycle: self.cycle,
                submitted_instant: Instant::now(),
                finished_instant: None,
            },
        );
        self.pending.push(task_id);
        debug!(%task_id, ?priority, depth = self.pending.len(), "Task enqueued");
        Ok(task_id)
    }

    fn effective_priority(&self, entry: &QueueEntry) -> u64 {
        let waited = self.cycle.saturating_sub(entry.enqueued_cycle);
        entry.priority.level() + waited / self.config.aging_interval.max(1)
    }

    /// Claim the next entry (Pending → Running).
    pub fn claim_next(&mut self) -> Option<(Uuid, AgentTask)> {
        let mut best: Option<(usize, u64, u64)> = None;
        for (pos, id) in self.pending.iter().enumerate() {
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            let eff = self.effective_priority(entry);
            let better = match best {
                None => true,
                Some((_, best_eff, best_seq)) => {
                    eff > best_eff || (eff == best_eff && entry.seq < best_seq)
                }
            };
            if better {
                best = Some((pos, eff, entry.seq));
            }
        }

        let (pos, _, _) = best?;
        let task_id = self.pending.remove(pos);
        let entry = self.entries.get_mut(&task_id)?;
        entry.transition(QueueStatus::Running).ok()?;
        entry.started_at = Some(Utc::now());

        let waited_ms = entry.submitted_instant.elapsed().as_millis() as u64;
        self.wait_total_ms += waited_ms;
        self.wait_samples += 1;
        self.running += 1;
        self.cycle += 1;
        Some((task_id, entry.task.clone()))
    }

    /// Store the result of a Running entry (Running → Done/Failed).
    pub fn complete(&mut self, task_id: Uuid, result: TaskResult) -> ConclaveResult<QueueStatus> {
        let entry = self
            .entries
            .get_mut(&task_id)
            .ok_or_else(|| ConclaveError::TaskNotFound(task_id.to_string()))?;
        let next = if result.success {
            QueueStatus::Done
        } else {
            QueueStatus::Failed
        };
        entry.transition(next)?;
        entry.result = Some(result);
        entry.finished_at = Some(Utc::now());
        entry.finished_instant = Some(Instant::now());

        self.running = self.running.saturating_sub(1);
        match next {
            QueueStatus::Done => self.completed += 1,
            _ => self.failed += 1,
        }
        Ok(next)
    }

    /// Cancel a Pending entry. Running and terminal entries are left as they
    /// are; the current status is returned either way.
    pub fn cancel(&mut self, task_id: Uuid) -> ConclaveResult<QueueStatus> {
        let entry = self
            .entries
            .get_mut(&task_id)
            .ok_or_else(|| ConclaveError::TaskNotFound(task_id.to_string()))?;
        if entry.status != QueueStatus::Pending {
            return Ok(entry.status);
        }
        entry.transition(QueueStatus::Cancelled)?;
        entry.finished_at = Some(Utc::now());
        entry.finished_instant = Some(Instant::now());
        self.pending.retain(|id| *id != task_id);
        self.cancelled += 1;
        Ok(QueueStatus::Cancelled)
    }

    /// Snapshot of one entry.
    pub fn status(&mut self, task_id: Uuid) -> ConclaveResult<QueueEntry> {
        self.purge_expired(Instant::now());
        self.entries
            .get(&task_id)
            .cloned()
            .ok_or_else(|| ConclaveError::TaskNotFound(task_id.to_string()))
    }

    pub fn stats(&mut self) -> QueueStats {
        self.purge_expired(Instant::now());
        let mut by_priority: BTreeMap<Priority, usize> =
            Priority::ALL.into_iter().map(|p| (p, 0)).collect();
        for id in &self.pending {
            if let Some(entry) = self.entries.get(id) {
                *by_priority.entry(entry.priority).or_insert(0) += 1;
            }
        }
        let retained = self
            .entries
            .values()
            .filter(|e| e.status.is_terminal())
            .count();

        QueueStats {
            depth: self.pending.len(),
            running: self.running,
            capacity: self.config.capacity,
            by_priority,
            avg_wait_ms: if self.wait_samples == 0 {
                0.0
            } else {
                self.wait_total_ms as f64 / self.wait_samples as f64
            },
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            retained,
        }
    }

    pub fn depth(&self) -> usize {
        self.pending.len()
    }

    /// Drop terminal entries older than the result TTL.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.config.result_ttl();
        let before = self.entries.len();
        self.entries.retain(|_, e| match e.finished_instant {
            Some(done) if e.status.is_terminal() => now.duration_since(done) < ttl,
            _ => true,
        });
        let purged = before - self.entries.len();
        if purged > 0 {
            debug!(purged, "Expired queue results purged");
        }
        purged
    }
}

/// Shared handle to a [`PriorityTaskQueue`]: the queue behind a mutex plus
/// the wake-up signal for idle workers.
#[derive(Clone)]
pub struct QueueHandle {
    inner: Arc<Mutex<PriorityTaskQueue>>,
    notify: Arc<Notify>,
}

impl QueueHandle {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PriorityTaskQueue::new(config))),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn submit(&self, task: AgentTask, priority: Priority) -> ConclaveResult<Uuid> {
        let id = self.inner.lock().submit(task, priority)?;
        self.notify.notify_one();
        Ok(id)
    }

    /// Claim the next entry; wakes another worker if more are pending.
    pub fn claim_next(&self) -> Option<(Uuid, AgentTask)> {
        let mut queue = self.inner.lock();
        let claimed = queue.claim_next();
        if claimed.is_some() && queue.depth() > 0 {
            self.notify.notify_one();
        }
        claimed
    }

    pub fn complete(&self, task_id: Uuid, result: TaskResult) -> ConclaveResult<QueueStatus> {
        self.inner.lock().complete(task_id, result)
    }

    pub fn cancel(&self, task_id: Uuid) -> ConclaveResult<QueueStatus> {
        self.inner.lock().cancel(task_id)
    }

    pub fn status(&self, task_id: Uuid) -> ConclaveResult<QueueEntry> {
        self.inner.lock().status(task_id)
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats()
    }

    /// Resolves once work may be available.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Wake every idle worker (used on shutdown).
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}
