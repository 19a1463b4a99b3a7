pub mod http;

use crate::fragments::ContentFragments;
use async_trait::async_trait;
use conclave_core::ConclaveResult;
use std::time::Duration;

/// Payload for one model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl InvokeRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            max_tokens,
            temperature,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// What a backend returns on success.
#[derive(Debug, Clone, Default)]
pub struct InvokeResponse {
    pub content: ContentFragments,
    /// Completion tokens reported by the server (or estimated).
    pub tokens: u32,
}

/// Trait for model-serving endpoints.
///
/// Conclave treats every backend as opaque and interchangeable as long as it
/// honours this contract. To add a new kind of endpoint:
/// 1. Create a new module in `backends/`
/// 2. Implement `BackendClient` for your struct
/// 3. Register instances with the [`ModelRouter`](crate::ModelRouter)
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Stable identifier, reported as `model_used` in task results.
    fn id(&self) -> &str;

    /// Per-call deadline enforced by the router. `None` means unbounded.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run one completion.
    async fn invoke(&self, request: &InvokeRequest) -> ConclaveResult<InvokeResponse>;

    /// Liveness check.
    async fn health(&self) -> bool;
}
