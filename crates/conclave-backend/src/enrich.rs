use async_trait::async_trait;
use conclave_core::{AgentType, ConclaveResult};

/// Pre-call hook that may augment a prompt with retrieved context.
///
/// Retrieval itself lives outside Conclave; an implementation typically calls
/// a RAG service and returns the prompt with citations prepended.
#[async_trait]
pub trait PromptEnricher: Send + Sync {
    async fn enrich(&self, agent_type: AgentType, prompt: &str) -> ConclaveResult<String>;
}

/// Returns the prompt unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnricher;

#[async_trait]
impl PromptEnricher for NoopEnricher {
    async fn enrich(&self, _agent_type: AgentType, prompt: &str) -> ConclaveResult<String> {
        Ok(prompt.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_passes_through() {
        let out = NoopEnricher
            .enrich(AgentType::Clinical, "fever for 3 days")
            .await
            .unwrap();
        assert_eq!(out, "fever for 3 days");
    }
}
