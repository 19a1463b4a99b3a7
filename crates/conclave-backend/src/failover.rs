use crate::backends::{BackendClient, InvokeRequest, InvokeResponse};
use conclave_core::{ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Configures retry behaviour within a single backend before failing over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries per backend for transient errors. `0` means each candidate is
    /// called exactly once.
    #[serde(default)]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
pub(crate) fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy.backoff_base_ms.saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Call a backend, enforcing its declared timeout.
pub(crate) async fn call_with_timeout(
    backend: &dyn BackendClient,
    request: &InvokeRequest,
) -> ConclaveResult<InvokeResponse> {
    match backend.timeout() {
        Some(limit) => tokio::time::timeout(limit, backend.invoke(request))
            .await
            .map_err(|_| ConclaveError::BackendTimeout {
                backend: backend.id().to_string(),
                timeout_ms: limit.as_millis() as u64,
            })?,
        None => backend.invoke(request).await,
    }
}

/// Outcome of walking a candidate list.
pub(crate) struct FailoverOutcome {
    pub response: InvokeResponse,
    pub backend_id: String,
    pub attempts: u32,
}

/// Try candidates in order. Within each candidate, retry transient errors up
/// to `policy.max_retries` times with backoff; any other error, or exhausting
/// the retries, moves on to the next candidate. Returns the last error when
/// every candidate fails.
pub(crate) async fn invoke_candidates(
    candidates: &[Arc<dyn BackendClient>],
    policy: &RetryPolicy,
    request: &InvokeRequest,
) -> Result<FailoverOutcome, Option<ConclaveError>> {
    let mut last_err: Option<ConclaveError> = None;
    let mut attempts = 0u32;

    for (backend_idx, backend) in candidates.iter().enumerate() {
        for attempt in 0..=policy.max_retries {
            attempts += 1;
            match call_with_timeout(backend.as_ref(), request).await {
                Ok(response) => {
                    if backend_idx > 0 {
                        info!(backend = %backend.id(), attempts, "Served by fallback backend");
                    }
                    return Ok(FailoverOutcome {
                        response,
                        backend_id: backend.id().to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    if !e.is_transient() {
                        warn!(
                            backend = %backend.id(),
                            attempt,
                            error = %e,
                            "Non-retryable error, moving to next backend"
                        );
                        last_err = Some(e);
                        break;
                    }

                    if attempt < policy.max_retries {
                        let delay = compute_backoff(policy, attempt);
                        info!(
                            backend = %backend.id(),
                            attempt,
                            delay_ms = delay,
                            error = %e,
                            "Retryable error, backing off"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    } else {
                        warn!(backend = %backend.id(), error = %e, "Backend exhausted");
                    }
                    last_err = Some(e);
                }
            }
        }
    }

    Err(last_err)
}
