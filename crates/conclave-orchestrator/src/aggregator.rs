use crate::engine::SuccessPolicy;
use crate::graph::TaskGraph;
use crate::types::{TaskResult, WorkflowMetadata, WorkflowResult};
use chrono::{DateTime, Utc};
use conclave_core::AgentType;
use std::collections::HashMap;

/// Raw record of one workflow run, as produced by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// Results in completion order.
    pub results: Vec<TaskResult>,
    /// Ids of tasks that were never dispatched.
    pub skipped: Vec<String>,
    /// Size of every dispatched frontier, in dispatch order.
    pub frontier_sizes: Vec<usize>,
    /// Workflow start to last completion.
    pub total_latency_ms: u64,
    pub timed_out: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Folds task results into a [`WorkflowResult`].
///
/// Output depends only on the graph and the set of results, never on the
/// order results arrived in.
pub struct ResultAggregator {
    policy: SuccessPolicy,
}

impl ResultAggregator {
    pub fn new(policy: SuccessPolicy) -> Self {
        Self { policy }
    }

    pub fn aggregate(&self, graph: &TaskGraph, outcome: ExecutionOutcome) -> WorkflowResult {
        let mut results = outcome.results;
        results.sort_by_key(|r| graph.position(&r.task_id).unwrap_or(usize::MAX));

        let mut skipped = outcome.skipped;
        skipped.sort_by_key(|id| graph.position(id).unwrap_or(usize::MAX));

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded + skipped.len();
        let total_tasks = succeeded + failed;

        let latency_sum: u64 = results.iter().map(|r| r.latency_ms).sum();
        let parallel_efficiency = if outcome.total_latency_ms > 0 {
            latency_sum as f64 / outcome.total_latency_ms as f64
        } else {
            0.0
        };

        let parallel_tasks = outcome.frontier_sizes.iter().filter(|&&n| n > 1).sum();
        let sequential_tasks = outcome.frontier_sizes.iter().filter(|&&n| n == 1).count();

        WorkflowResult {
            workflow_type: graph.workflow_type().to_string(),
            success: self.policy.is_satisfied(succeeded, total_tasks),
            aggregated_content: compose_sections(&results),
            results,
            total_latency_ms: outcome.total_latency_ms,
            parallel_efficiency,
            metadata: WorkflowMetadata {
                parallel_tasks,
                sequential_tasks,
                steps: outcome.frontier_sizes.len(),
                succeeded,
                failed,
                skipped,
                timed_out: outcome.timed_out,
                requested_by: None,
                started_at: outcome.started_at,
            },
        }
    }
}

/// `## {section title}` per successful, non-empty result, in the given order.
/// The task id is appended to the title when an agent type appears twice.
fn compose_sections(results: &[TaskResult]) -> String {
    let mut per_agent: HashMap<AgentType, usize> = HashMap::new();
    for r in results {
        *per_agent.entry(r.agent_type).or_insert(0) += 1;
    }

    let mut out = String::new();
    for r in results.iter().filter(|r| r.success && !r.content.is_empty()) {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("## ");
        out.push_str(r.agent_type.section_title());
        if per_agent.get(&r.agent_type).copied().unwrap_or(0) > 1 {
            out.push_str(" (");
            out.push_str(&r.task_id);
            out.push(')');
        }
        out.push('\n');
        for fragment in r.content.iter() {
            out.push_str(fragment);
        }
    }
    out
}
