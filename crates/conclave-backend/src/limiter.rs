use crate::backends::{BackendClient, InvokeRequest, InvokeResponse};
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Wraps a backend with a fixed ceiling on concurrent in-flight calls.
///
/// GPU-bound model servers degrade badly when oversubscribed, so the ceiling
/// is configured per endpoint rather than discovered. Callers beyond the
/// ceiling wait for a permit; the wait is not counted against the backend
/// timeout.
pub struct LimitedBackend {
    inner: Arc<dyn BackendClient>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl LimitedBackend {
    pub fn new(inner: Arc<dyn BackendClient>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Number of calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }
}

#[async_trait]
impl BackendClient for LimitedBackend {
    fn id(&self) -> &str {
        self.inner.id()
    }

    // The inner timeout is enforced in `invoke`, once the permit is held.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn invoke(&self, request: &InvokeRequest) -> ConclaveResult<InvokeResponse> {
        let _permit = self.permits.acquire().await.map_err(|_| ConclaveError::Backend {
            backend: self.inner.id().to_string(),
            status: None,
            message: "concurrency limiter closed".to_string(),
        })?;
        debug!(
            backend = %self.inner.id(),
            in_flight = self.in_flight(),
            limit = self.max_concurrency,
            "Permit acquired"
        );

        match self.inner.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.inner.invoke(request))
                .await
                .map_err(|_| ConclaveError::BackendTimeout {
                    backend: self.inner.id().to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => self.inner.invoke(request).await,
        }
    }

    async fn health(&self) -> bool {
        self.inner.health().await
    }
}
