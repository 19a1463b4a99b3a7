//! Multi-agent workflow orchestration and priority task queue.
//!
//! A workflow request is resolved to a template (or taken from a custom task
//! list), bound to its context and validated into an acyclic [`TaskGraph`].
//! The [`ExecutionCoordinator`] then dispatches every ready frontier
//! concurrently, and the [`ResultAggregator`] folds the task results into one
//! [`WorkflowResult`] with latency and parallel-efficiency accounting.
//!
//! Single tasks can also be submitted fire-and-forget to the
//! [`AsyncTaskService`], which schedules them by priority (with aging) over a
//! fixed [`WorkerPool`].
//!
//! # Main types
//!
//! - [`WorkflowTemplateRegistry`]: Named workflow templates and their context schema.
//! - [`DependencyGraphBuilder`]: Builds and validates executable task graphs.
//! - [`ExecutionCoordinator`]: Frontier-by-frontier concurrent execution.
//! - [`ResultAggregator`]: Deterministic merge of task results.
//! - [`TaskDispatcher`]: Shared enrich → route → invoke machinery.
//! - [`PriorityTaskQueue`]: Bounded multi-priority queue with anti-starvation aging.
//! - [`AsyncTaskService`]: Queue + worker pool + result store behind one handle.
//! - [`AgentMonitor`]: Per-agent-type call metrics.

/// Merging task results into a workflow result.
pub mod aggregator;
/// Backend dispatch shared by workflows and the async queue.
pub mod dispatch;
/// Workflow execution engine.
pub mod engine;
/// Task graph construction and validation.
pub mod graph;
/// Per-agent-type metrics.
pub mod monitor;
/// Default agent profiles (system prompts, sampling parameters).
pub mod profiles;
/// Async submission service.
pub mod service;
/// Priority task queue.
pub mod task_queue;
/// Workflow template registry.
pub mod templates;
/// Shared orchestration types.
pub mod types;
/// Worker pool draining the task queue.
pub mod worker;

pub use aggregator::{ExecutionOutcome, ResultAggregator};
pub use dispatch::TaskDispatcher;
pub use engine::{CoordinatorConfig, ExecutionCoordinator, SuccessPolicy};
pub use graph::{CustomTask, DependencyGraphBuilder, GraphSource, TaskGraph};
pub use monitor::{AgentMetrics, AgentMonitor, AgentState, WorkerStatus};
pub use profiles::{default_profiles, profile_for, AgentProfile};
pub use service::{AsyncTaskService, ChatMessage, SubmitRequest};
pub use task_queue::{
    Priority, PriorityTaskQueue, QueueConfig, QueueEntry, QueueHandle, QueueStats, QueueStatus,
};
pub use templates::{TaskGraphTemplate, TemplateStep, WorkflowDescriptor, WorkflowTemplateRegistry};
pub use types::{AgentTask, TaskResult, TaskState, WorkflowMetadata, WorkflowRequest, WorkflowResult};
pub use worker::WorkerPool;
