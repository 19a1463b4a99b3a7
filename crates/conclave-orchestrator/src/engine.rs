use crate::aggregator::{ExecutionOutcome, ResultAggregator};
use crate::dispatch::TaskDispatcher;
use crate::graph::{DependencyGraphBuilder, GraphSource, TaskGraph};
use crate::monitor::AgentMonitor;
use crate::templates::WorkflowTemplateRegistry;
use crate::types::{TaskResult, TaskState, WorkflowRequest, WorkflowResult};
use chrono::Utc;
use conclave_core::{ConclaveError, ConclaveResult};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// When a workflow counts as successful.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// At least one task succeeded.
    #[default]
    AnySucceeded,
    /// Every task succeeded.
    AllSucceeded,
    /// At least this fraction (0.0..=1.0) of tasks succeeded.
    MinFraction(f64),
}

impl SuccessPolicy {
    /// `total` counts failed and skipped tasks as well.
    pub fn is_satisfied(&self, succeeded: usize, total: usize) -> bool {
        match self {
            SuccessPolicy::AnySucceeded => succeeded > 0,
            SuccessPolicy::AllSucceeded => total > 0 && succeeded == total,
            SuccessPolicy::MinFraction(min) => {
                total > 0 && succeeded as f64 / total as f64 >= *min
            }
        }
    }

    /// Rejects a `MinFraction` outside `0.0..=1.0` (NaN included).
    pub fn validate(&self) -> ConclaveResult<()> {
        match self {
            SuccessPolicy::MinFraction(min) if !(0.0..=1.0).contains(min) => {
                Err(ConclaveError::Config(format!(
                    "success_policy min_fraction must be within 0.0..=1.0, got {min}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Tunables of the execution coordinator (`[workflow]` config section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Whole-workflow deadline in milliseconds; `0` disables it.
    #[serde(default = "default_workflow_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub success_policy: SuccessPolicy,
    /// Append predecessors' outputs to a dependent task's prompt.
    #[serde(default = "default_true")]
    pub forward_dependency_output: bool,
}

fn default_workflow_timeout_ms() -> u64 {
    120_000
}

fn default_true() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_workflow_timeout_ms(),
            success_policy: SuccessPolicy::default(),
            forward_dependency_output: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> ConclaveResult<()> {
        self.success_policy.validate()
    }

    fn deadline(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Runs a validated [`TaskGraph`] frontier by frontier.
///
/// Each round launches every Ready task concurrently and waits for the whole
/// frontier before computing the next one. A failed task never aborts its
/// siblings; its dependents are Skipped.
pub struct ExecutionCoordinator {
    dispatcher: Arc<TaskDispatcher>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    pub fn new(dispatcher: Arc<TaskDispatcher>, config: CoordinatorConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        self.dispatcher.monitor()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Validate a request into a graph and execute it.
    ///
    /// Validation errors are returned before any backend is called; backend
    /// failures only show up inside the returned [`WorkflowResult`].
    pub async fn run(
        &self,
        registry: &WorkflowTemplateRegistry,
        request: WorkflowRequest,
    ) -> ConclaveResult<WorkflowResult> {
        let graph = match &request.custom_tasks {
            Some(tasks) => {
                let name = if request.workflow_type.is_empty() {
                    "custom"
                } else {
                    request.workflow_type.as_str()
                };
                DependencyGraphBuilder::build(GraphSource::Custom(tasks), name, &request.context)?
            }
            None => {
                let template = registry.resolve(&request.workflow_type)?;
                DependencyGraphBuilder::build(
                    GraphSource::Template(template),
                    &request.workflow_type,
                    &request.context,
                )?
            }
        };

        let mut result = self.execute(&graph).await;
        result.metadata.requested_by = request.requested_by;
        Ok(result)
    }

    /// Execute every task of `graph`, returning partial results on failure
    /// or timeout.
    pub async fn execute(&self, graph: &TaskGraph) -> WorkflowResult {
        let started = Instant::now();
        let started_at = Utc::now();
        let deadline = self.config.deadline().map(|d| started + d);
        let tasks = graph.tasks();

        let mut states = vec![TaskState::Waiting; tasks.len()];
        let mut results: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        let mut completed_order: Vec<usize> = Vec::with_capacity(tasks.len());
        let mut frontier_sizes = Vec::new();
        let mut last_completion: Option<Instant> = None;
        let mut timed_out = false;

        info!(
            workflow = %graph.workflow_type(),
            tasks = tasks.len(),
            "Workflow started"
        );

        loop {
            propagate_skips(graph, &mut states);

            let frontier: Vec<usize> = (0..tasks.len())
                .filter(|&i| {
                    states[i] == TaskState::Waiting
                        && graph
                            .predecessors(i)
                            .iter()
                            .all(|&p| states[p] == TaskState::Succeeded)
                })
                .collect();
            if frontier.is_empty() {
                break;
            }
            for &i in &frontier {
                states[i] = TaskState::Ready;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                break;
            }

            frontier_sizes.push(frontier.len());
            info!(
                workflow = %graph.workflow_type(),
                step = frontier_sizes.len(),
                size = frontier.len(),
                "Dispatching frontier"
            );

            let mut dispatched_at = Vec::with_capacity(frontier.len());
            let mut in_flight = FuturesUnordered::new();
            for &i in &frontier {
                states[i] = TaskState::Running;
                let prompt = self.compose_prompt(graph, i, &results);
                let task = &tasks[i];
                dispatched_at.push((i, Instant::now()));
                in_flight.push(async move { (i, self.dispatcher.dispatch(task, prompt).await) });
            }

            loop {
                let next = match deadline {
                    Some(d) => match tokio::time::timeout_at(d, in_flight.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            timed_out = true;
                            break;
                        }
                    },
                    None => in_flight.next().await,
                };
                let Some((i, result)) = next else {
                    break;
                };
                states[i] = if result.success {
                    TaskState::Succeeded
                } else {
                    TaskState::Failed
                };
                results[i] = Some(result);
                completed_order.push(i);
                last_completion = Some(Instant::now());
            }

            if timed_out {
                drop(in_flight);
                let now = Instant::now();
                let err = ConclaveError::WorkflowTimeout(self.config.timeout_ms);
                for (i, at) in dispatched_at {
                    if states[i] != TaskState::Running {
                        continue;
                    }
                    let latency_ms = now.duration_since(at).as_millis() as u64;
                    self.monitor().abandon_call(tasks[i].agent_type, latency_ms).await;
                    states[i] = TaskState::Failed;
                    results[i] = Some(TaskResult::failed(&tasks[i], &err, latency_ms));
                    completed_order.push(i);
                }
                last_completion = Some(now);
                break;
            }
        }

        let mut skipped = Vec::new();
        for (i, state) in states.iter_mut().enumerate() {
            if !state.is_terminal() {
                *state = TaskState::Skipped;
            }
            if *state == TaskState::Skipped {
                skipped.push(tasks[i].id.clone());
            }
        }
        if timed_out {
            warn!(
                workflow = %graph.workflow_type(),
                timeout_ms = self.config.timeout_ms,
                skipped = skipped.len(),
                "Workflow deadline passed, returning partial result"
            );
        }

        let total_latency_ms = last_completion
            .map(|t| t.duration_since(started).as_millis() as u64)
            .unwrap_or(0);
        let outcome = ExecutionOutcome {
            results: completed_order
                .into_iter()
                .filter_map(|i| results[i].take())
                .collect(),
            skipped,
            frontier_sizes,
            total_latency_ms,
            timed_out,
            started_at: Some(started_at),
        };

        let result = ResultAggregator::new(self.config.success_policy).aggregate(graph, outcome);
        info!(
            workflow = %result.workflow_type,
            success = result.success,
            succeeded = result.metadata.succeeded,
            failed = result.metadata.failed,
            total_latency_ms = result.total_latency_ms,
            parallel_efficiency = result.parallel_efficiency,
            "Workflow finished"
        );
        result
    }

    /// The task's own prompt followed by each successful predecessor's output.
    fn compose_prompt(
        &self,
        graph: &TaskGraph,
        idx: usize,
        results: &[Option<TaskResult>],
    ) -> String {
        let task = &graph.tasks()[idx];
        if !self.config.forward_dependency_output {
            return task.prompt.clone();
        }

        let mut prompt = task.prompt.clone();
        for &p in graph.predecessors(idx) {
            let Some(upstream) = results[p].as_ref().filter(|r| r.success) else {
                continue;
            };
            prompt.push_str("\n\n## ");
            prompt.push_str(upstream.agent_type.section_title());
            prompt.push_str(" (");
            prompt.push_str(&upstream.task_id);
            prompt.push_str(")\n");
            for fragment in upstream.content.iter() {
                prompt.push_str(fragment);
            }
        }
        prompt
    }
}

/// Mark Waiting tasks with a Failed or Skipped predecessor as Skipped,
/// transitively. Graph order is not topological, so iterate to a fixpoint.
fn propagate_skips(graph: &TaskGraph, states: &mut [TaskState]) {
    loop {
        let mut changed = false;
        for i in 0..states.len() {
            if states[i] != TaskState::Waiting {
                continue;
            }
            let blocked = graph
                .predecessors(i)
                .iter()
                .any(|&p| matches!(states[p], TaskState::Failed | TaskState::Skipped));
            if blocked {
                states[i] = TaskState::Skipped;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}
