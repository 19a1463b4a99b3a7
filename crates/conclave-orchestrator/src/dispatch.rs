use crate::monitor::AgentMonitor;
use crate::types::{AgentTask, TaskResult};
use conclave_backend::{ModelRouter, NoopEnricher, PromptEnricher};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// The call path every task takes: enrich the prompt, route it to a
/// backend (with fallback), record the outcome in the monitor.
///
/// Shared by the [`ExecutionCoordinator`](crate::ExecutionCoordinator) and
/// the async [`WorkerPool`](crate::WorkerPool).
pub struct TaskDispatcher {
    router: Arc<ModelRouter>,
    monitor: Arc<AgentMonitor>,
    enricher: Arc<dyn PromptEnricher>,
}

impl TaskDispatcher {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self {
            router,
            monitor: Arc::new(AgentMonitor::new()),
            enricher: Arc::new(NoopEnricher),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<AgentMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn PromptEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Run one task with `prompt` (the task prompt plus any upstream
    /// sections). Never fails: backend errors land in the result.
    pub async fn dispatch(&self, task: &AgentTask, prompt: String) -> TaskResult {
        let prompt = match self.enricher.enrich(task.agent_type, &prompt).await {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(task = %task.id, error = %e, "Prompt enrichment failed, using raw prompt");
                prompt
            }
        };
        let request = task.invoke_request(prompt);

        self.monitor.start_call(task.agent_type).await;
        let start = Instant::now();
        let outcome = self
            .router
            .invoke_with_fallback(task.agent_type, &request)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(invocation) => {
                debug!(
                    task = %task.id,
                    model = %invocation.model_used,
                    latency_ms,
                    tokens = invocation.tokens,
                    "Task completed"
                );
                TaskResult::succeeded(task, invocation, latency_ms)
            }
            Err(e) => {
                error!(task = %task.id, agent = %task.agent_type, error = %e, "Task failed");
                TaskResult::failed(task, &e, latency_ms)
            }
        };
        self.monitor.finish_call(&result).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conclave_backend::{BackendClient, InvokeRequest, InvokeResponse, RouteTable};
    use conclave_core::{AgentType, ConclaveError, ConclaveResult};
    use parking_lot::Mutex;

    struct Recording {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BackendClient for Recording {
        fn id(&self) -> &str {
            "general-8b"
        }

        async fn invoke(&self, request: &InvokeRequest) -> ConclaveResult<InvokeResponse> {
            self.prompts.lock().push(request.prompt.clone());
            Ok(InvokeResponse {
                content: "ok".into(),
                tokens: 1,
            })
        }

        async fn health(&self) -> bool {
            true
        }
    }

    struct Failing;

    #[async_trait]
    impl PromptEnricher for Failing {
        async fn enrich(&self, _agent_type: AgentType, _prompt: &str) -> ConclaveResult<String> {
            Err(ConclaveError::Config("rag down".into()))
        }
    }

    struct Prefixing;

    #[async_trait]
    impl PromptEnricher for Prefixing {
        async fn enrich(&self, agent_type: AgentType, prompt: &str) -> ConclaveResult<String> {
            Ok(format!("[{agent_type} guidelines]\n{prompt}"))
        }
    }

    fn dispatcher(backend: Arc<Recording>) -> TaskDispatcher {
        let router = ModelRouter::new(RouteTable::uniform("general-8b", None), vec![backend])
            .unwrap();
        TaskDispatcher::new(Arc::new(router))
    }

    #[tokio::test]
    async fn test_enricher_applied() {
        let backend = Arc::new(Recording {
            prompts: Mutex::new(Vec::new()),
        });
        let d = dispatcher(backend.clone()).with_enricher(Arc::new(Prefixing));
        let task = AgentTask::new("billing_1", AgentType::Billing, "code it");
        let result = d.dispatch(&task, task.prompt.clone()).await;
        assert!(result.success);
        assert_eq!(backend.prompts.lock()[0], "[billing guidelines]\ncode it");
    }

    #[tokio::test]
    async fn test_enricher_failure_falls_back_to_raw_prompt() {
        let backend = Arc::new(Recording {
            prompts: Mutex::new(Vec::new()),
        });
        let d = dispatcher(backend.clone()).with_enricher(Arc::new(Failing));
        let task = AgentTask::new("triage_1", AgentType::Triage, "chest pain");
        let result = d.dispatch(&task, task.prompt.clone()).await;
        assert!(result.success);
        assert_eq!(backend.prompts.lock()[0], "chest pain");

        let state = d.monitor().get_state(AgentType::Triage).await.unwrap();
        assert_eq!(state.metrics.succeeded, 1);
    }
}
