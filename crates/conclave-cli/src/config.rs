//! `conclave.toml` loading and the wiring it drives.

use conclave_backend::{
    BackendClient, BackendConfig, HttpBackend, LimitedBackend, ModelRoute, ModelRouter,
    RetryPolicy, RouteTable,
};
use conclave_core::{AgentType, ConclaveError, ConclaveResult};
use conclave_orchestrator::{
    CoordinatorConfig, QueueConfig, TaskGraphTemplate, WorkflowTemplateRegistry,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize, Default)]
pub struct ConclaveConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    /// Overrides on top of the built-in routing table.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RouteConfig {
    pub agent_type: AgentType,
    pub primary: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WorkflowConfig {
    #[serde(flatten)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Extra templates registered next to the built-in ones.
    #[serde(default)]
    pub templates: Vec<TaskGraphTemplate>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl ConclaveConfig {
    pub fn from_toml_str(raw: &str) -> ConclaveResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConclaveError::Config(e.to_string()))?;
        config.workflow.coordinator.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> ConclaveResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConclaveError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn route_table(&self) -> RouteTable {
        self.routes.iter().fold(RouteTable::defaults(), |table, r| {
            table.with_route(ModelRoute::new(
                r.agent_type,
                r.primary.clone(),
                r.fallback.clone(),
            ))
        })
    }

    /// One `HttpBackend` per `[[backends]]` entry, capped at its
    /// `max_concurrency`.
    pub fn build_backends(&self) -> ConclaveResult<Vec<Arc<dyn BackendClient>>> {
        if self.backends.is_empty() {
            return Err(ConclaveError::Config("no [[backends]] configured".into()));
        }
        let mut seen = HashSet::new();
        self.backends
            .iter()
            .map(|cfg| {
                if !seen.insert(cfg.id.as_str()) {
                    return Err(ConclaveError::Config(format!(
                        "duplicate backend id '{}'",
                        cfg.id
                    )));
                }
                let http: Arc<dyn BackendClient> = Arc::new(HttpBackend::new(cfg.clone())?);
                let limited: Arc<dyn BackendClient> =
                    Arc::new(LimitedBackend::new(http, cfg.max_concurrency));
                Ok(limited)
            })
            .collect()
    }

    pub fn build_router(&self) -> ConclaveResult<ModelRouter> {
        let router = ModelRouter::new(self.route_table(), self.build_backends()?)?;
        Ok(router.with_retry_policy(self.workflow.retry.clone()))
    }

    pub fn build_registry(&self) -> ConclaveResult<WorkflowTemplateRegistry> {
        let mut registry = WorkflowTemplateRegistry::builtin();
        for template in &self.workflow.templates {
            registry.register(template.clone())?;
        }
        Ok(registry)
    }
}
