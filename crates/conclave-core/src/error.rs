use thiserror::Error;

/// A convenience `Result` alias using [`ConclaveError`].
pub type ConclaveResult<T> = Result<T, ConclaveError>;

/// Top-level error type for Conclave.
///
/// Validation variants (`UnknownWorkflowType`, `UnknownAgentType`,
/// `UnknownDependency`, `DependencyCycle`, `InvalidContext`) are raised before
/// any backend is called. Backend variants are normally captured into a task
/// result rather than propagated.
#[derive(Error, Debug)]
pub enum ConclaveError {
    /// No workflow template is registered under the requested name.
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// The requested agent type is not part of the closed agent set.
    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),

    /// A task references a dependency that is not part of the same graph.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Task declaring the dependency.
        task: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The task graph contains a cycle.
    #[error("dependency cycle detected involving task '{0}'")]
    DependencyCycle(String),

    /// The supplied context is missing a required field or is malformed.
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// A backend did not answer within its configured timeout.
    #[error("backend '{backend}' timed out after {timeout_ms}ms")]
    BackendTimeout {
        /// Backend identifier.
        backend: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// A single backend call failed (non-2xx, connection error, bad payload).
    #[error("backend '{backend}' error: {message}")]
    Backend {
        /// Backend identifier.
        backend: String,
        /// HTTP status, when the backend answered at all.
        status: Option<u16>,
        /// Human-readable detail.
        message: String,
    },

    /// Every candidate backend for an agent type failed.
    #[error("all backends exhausted for agent '{agent_type}': {last_error}")]
    BackendUnavailable {
        /// Agent type being routed.
        agent_type: String,
        /// The last error observed.
        last_error: String,
    },

    /// The async queue is at capacity.
    #[error("queue saturated: {capacity} pending entries")]
    QueueSaturated {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// No queue entry with this id exists (or it has expired).
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A queue entry was asked to move backwards or sideways in its lifecycle.
    #[error("invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Queue entry id.
        task_id: String,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// The workflow deadline passed before every task finished.
    #[error("workflow timed out after {0}ms")]
    WorkflowTimeout(u64),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConclaveError {
    /// Stable machine-readable name of the error kind, used in HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ConclaveError::UnknownWorkflowType(_) => "unknown_workflow_type",
            ConclaveError::UnknownAgentType(_) => "unknown_agent_type",
            ConclaveError::UnknownDependency { .. } => "unknown_dependency",
            ConclaveError::DependencyCycle(_) => "dependency_cycle",
            ConclaveError::InvalidContext(_) => "invalid_context",
            ConclaveError::BackendTimeout { .. } => "backend_timeout",
            ConclaveError::Backend { .. } => "backend_error",
            ConclaveError::BackendUnavailable { .. } => "backend_unavailable",
            ConclaveError::QueueSaturated { .. } => "queue_saturated",
            ConclaveError::TaskNotFound(_) => "task_not_found",
            ConclaveError::InvalidTransition { .. } => "invalid_transition",
            ConclaveError::WorkflowTimeout(_) => "workflow_timeout",
            ConclaveError::Config(_) => "config",
            ConclaveError::Json(_) => "json",
            ConclaveError::Io(_) => "io",
        }
    }

    /// Whether the request was rejected during validation, before any dispatch.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConclaveError::UnknownWorkflowType(_)
                | ConclaveError::UnknownAgentType(_)
                | ConclaveError::UnknownDependency { .. }
                | ConclaveError::DependencyCycle(_)
                | ConclaveError::InvalidContext(_)
        )
    }

    /// Whether retrying the same backend may succeed.
    ///
    /// Timeouts, rate limiting (429) and server errors (5xx) are transient;
    /// other client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ConclaveError::BackendTimeout { .. } => true,
            ConclaveError::Backend { status, .. } => match status {
                Some(code) => *code == 429 || *code >= 500,
                // connection refused / reset
                None => true,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn backend_err(status: Option<u16>) -> ConclaveError {
        ConclaveError::Backend {
            backend: "gpu-a".into(),
            status,
            message: "boom".into(),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(backend_err(Some(429)).is_transient());
        assert!(backend_err(Some(500)).is_transient());
        assert!(backend_err(Some(503)).is_transient());
        assert!(backend_err(None).is_transient());
        assert!(ConclaveError::BackendTimeout {
            backend: "gpu-a".into(),
            timeout_ms: 10
        }
        .is_transient());

        assert!(!backend_err(Some(400)).is_transient());
        assert!(!backend_err(Some(404)).is_transient());
        assert!(!ConclaveError::DependencyCycle("a".into()).is_transient());
    }

    #[test]
    fn validation_kinds() {
        assert!(ConclaveError::InvalidContext("x".into()).is_validation());
        assert!(ConclaveError::DependencyCycle("x".into()).is_validation());
        assert!(!ConclaveError::QueueSaturated { capacity: 1 }.is_validation());
        assert!(!ConclaveError::WorkflowTimeout(5).is_validation());
    }

    #[test]
    fn display_includes_detail() {
        let err = ConclaveError::UnknownDependency {
            task: "billing_1".into(),
            dependency: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "task 'billing_1' depends on unknown task 'ghost'"
        );
        assert_eq!(err.kind(), "unknown_dependency");
    }
}
