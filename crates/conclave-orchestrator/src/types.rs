use crate::graph::CustomTask;
use crate::profiles::profile_for;
use chrono::{DateTime, Utc};
use conclave_backend::{ContentFragments, InvokeRequest, Invocation};
use conclave_core::{AgentType, ConclaveError, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One unit of work: a prompt for a single agent type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub agent_type: AgentType,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl AgentTask {
    /// A task with the agent type's profile defaults.
    pub fn new(id: impl Into<String>, agent_type: AgentType, prompt: impl Into<String>) -> Self {
        let profile = profile_for(agent_type);
        Self {
            id: id.into(),
            agent_type,
            prompt: prompt.into(),
            system_prompt: Some(profile.system_prompt.to_string()),
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limits(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        if let Some(max_tokens) = max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = temperature {
            self.temperature = temperature;
        }
        self
    }

    /// Backend request for this task with the given (possibly augmented) prompt.
    pub fn invoke_request(&self, prompt: String) -> InvokeRequest {
        InvokeRequest {
            system_prompt: self.system_prompt.clone(),
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Execution state of a task inside one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Waiting,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Outcome of one dispatched task. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub agent_type: AgentType,
    pub tier: Tier,
    pub success: bool,
    pub content: ContentFragments,
    #[serde(rename = "model")]
    pub model_used: Option<String>,
    pub latency_ms: u64,
    pub tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TaskResult {
    pub fn succeeded(task: &AgentTask, invocation: Invocation, latency_ms: u64) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("attempts".into(), invocation.attempts.into());
        metadata.insert(
            "fragments".into(),
            invocation.content.fragment_count().into(),
        );
        Self {
            task_id: task.id.clone(),
            agent_type: task.agent_type,
            tier: invocation.tier,
            success: true,
            content: invocation.content,
            model_used: Some(invocation.model_used),
            latency_ms,
            tokens: invocation.tokens,
            error: None,
            metadata,
        }
    }

    pub fn failed(task: &AgentTask, error: &ConclaveError, latency_ms: u64) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("error_kind".into(), error.kind().into());
        Self {
            task_id: task.id.clone(),
            agent_type: task.agent_type,
            tier: task.agent_type.tier(),
            success: false,
            content: ContentFragments::default(),
            model_used: None,
            latency_ms,
            tokens: 0,
            error: Some(error.to_string()),
            metadata,
        }
    }
}

/// Body of `POST /v1/workflows/execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRequest {
    #[serde(default)]
    pub workflow_type: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_tasks: Option<Vec<CustomTask>>,
    /// Caller identity, filled in by the gateway.
    #[serde(skip)]
    pub requested_by: Option<String>,
}

impl WorkflowRequest {
    pub fn template(workflow_type: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            context,
            ..Self::default()
        }
    }

    pub fn custom(tasks: Vec<CustomTask>, context: serde_json::Value) -> Self {
        Self {
            workflow_type: "custom".into(),
            context,
            custom_tasks: Some(tasks),
            requested_by: None,
        }
    }
}

/// Execution accounting attached to a [`WorkflowResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Tasks that ran in a frontier of more than one task.
    pub parallel_tasks: usize,
    /// Frontiers that held a single task.
    pub sequential_tasks: usize,
    /// Number of frontiers dispatched.
    pub steps: usize,
    pub succeeded: usize,
    /// Failed plus skipped tasks.
    pub failed: usize,
    pub skipped: Vec<String>,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Final answer of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_type: String,
    pub success: bool,
    /// Task results in graph order.
    pub results: Vec<TaskResult>,
    pub aggregated_content: String,
    pub total_latency_ms: u64,
    pub parallel_efficiency: f64,
    pub metadata: WorkflowMetadata,
}

impl WorkflowResult {
    pub fn result_for(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_uses_profile_defaults() {
        let task = AgentTask::new("billing_1", AgentType::Billing, "code this visit");
        let profile = profile_for(AgentType::Billing);
        assert_eq!(task.max_tokens, profile.max_tokens);
        assert_eq!(task.system_prompt.as_deref(), Some(profile.system_prompt));
        assert!(task.depends_on.is_empty());
    }

    #[test]
    fn test_task_overrides() {
        let task = AgentTask::new("t", AgentType::Clinical, "p").with_limits(Some(64), None);
        assert_eq!(task.max_tokens, 64);
        assert_eq!(task.temperature, profile_for(AgentType::Clinical).temperature);
    }

    #[test]
    fn test_failed_result_has_kind() {
        let task = AgentTask::new("triage_1", AgentType::Triage, "p");
        let err = ConclaveError::WorkflowTimeout(5_000);
        let result = TaskResult::failed(&task, &err, 12);
        assert!(!result.success);
        assert!(result.content.is_empty());
        assert_eq!(result.metadata["error_kind"], "workflow_timeout");
        assert_eq!(result.tier, Tier::RealTime);
    }

    #[test]
    fn test_result_serializes_model_field() {
        let task = AgentTask::new("billing_1", AgentType::Billing, "p");
        let inv = Invocation {
            content: "99213".into(),
            tokens: 2,
            model_used: "billing-8b".into(),
            tier: Tier::RealTime,
            attempts: 1,
        };
        let json = serde_json::to_value(TaskResult::succeeded(&task, inv, 40)).unwrap();
        assert_eq!(json["model"], "billing-8b");
        assert_eq!(json["content"], "99213");
        assert!(json.get("model_used").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_state_terminal() {
        assert!(TaskState::Skipped.is_terminal());
        assert!(!TaskState::Ready.is_terminal());
    }

    #[test]
    fn test_request_deserializes_without_custom_tasks() {
        let req: WorkflowRequest = serde_json::from_str(
            r#"{"workflow_type":"clinical_billing","context":{"patient_summary":"x"}}"#,
        )
        .unwrap();
        assert_eq!(req.workflow_type, "clinical_billing");
        assert!(req.custom_tasks.is_none());
        assert!(req.requested_by.is_none());
    }
}
