use crate::types::TaskResult;
use conclave_core::{AgentType, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counters kept per agent type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub calls: u64,
    pub succeeded: u64,
    pub errors: u64,
    pub tokens_used: u64,
    /// Cumulative backend latency.
    pub latency_ms: u64,
    pub in_flight: u32,
}

impl AgentMetrics {
    pub fn avg_latency_ms(&self) -> f64 {
        let finished = self.succeeded + self.errors;
        if finished == 0 {
            0.0
        } else {
            self.latency_ms as f64 / finished as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
    /// The last finished call failed.
    Error,
}

/// Snapshot of one agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_type: AgentType,
    pub tier: Tier,
    pub status: WorkerStatus,
    pub last_model: Option<String>,
    pub metrics: AgentMetrics,
}

impl AgentState {
    fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            tier: agent_type.tier(),
            status: WorkerStatus::Idle,
            last_model: None,
            metrics: AgentMetrics::default(),
        }
    }
}

/// Tracks calls and outcomes for every agent type, fed by both the workflow
/// coordinator and the async worker pool.
pub struct AgentMonitor {
    states: Arc<RwLock<BTreeMap<AgentType, AgentState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        let states = AgentType::ALL
            .into_iter()
            .map(|agent| (agent, AgentState::new(agent)))
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// A backend call for `agent_type` has started.
    pub async fn start_call(&self, agent_type: AgentType) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&agent_type) {
            state.metrics.calls += 1;
            state.metrics.in_flight += 1;
            state.status = WorkerStatus::Working;
        }
    }

    /// Record the outcome of a finished call.
    pub async fn finish_call(&self, result: &TaskResult) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&result.agent_type) {
            let m = &mut state.metrics;
            m.in_flight = m.in_flight.saturating_sub(1);
            m.latency_ms += result.latency_ms;
            m.tokens_used += u64::from(result.tokens);
            if result.success {
                m.succeeded += 1;
                state.last_model = result.model_used.clone();
            } else {
                m.errors += 1;
            }
            state.status = if m.in_flight > 0 {
                WorkerStatus::Working
            } else if result.success {
                WorkerStatus::Idle
            } else {
                WorkerStatus::Error
            };
        }
    }

    /// A started call was cancelled before it returned.
    pub async fn abandon_call(&self, agent_type: AgentType, latency_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&agent_type) {
            let m = &mut state.metrics;
            m.in_flight = m.in_flight.saturating_sub(1);
            m.latency_ms += latency_ms;
            m.errors += 1;
            state.status = if m.in_flight > 0 {
                WorkerStatus::Working
            } else {
                WorkerStatus::Error
            };
        }
    }

    /// All agent types, in agent-type order.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        states.values().cloned().collect()
    }

    pub async fn get_state(&self, agent_type: AgentType) -> Option<AgentState> {
        let states = self.states.read().await;
        states.get(&agent_type).cloned()
    }

    /// Totals across all agent types.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        let mut total = AgentMetrics::default();
        for state in states.values() {
            total.calls += state.metrics.calls;
            total.succeeded += state.metrics.succeeded;
            total.errors += state.metrics.errors;
            total.tokens_used += state.metrics.tokens_used;
            total.latency_ms += state.metrics.latency_ms;
            total.in_flight += state.metrics.in_flight;
        }
        total
    }

    /// Body of `GET /v1/agents/status`.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
