use crate::backends::{BackendClient, InvokeRequest};
use crate::failover::{invoke_candidates, RetryPolicy};
use crate::fragments::ContentFragments;
use conclave_core::{AgentType, ConclaveError, ConclaveResult, Tier};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Static route of one agent type to its backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRoute {
    pub agent_type: AgentType,
    pub tier: Tier,
    pub primary: String,
    pub fallback: Option<String>,
}

impl ModelRoute {
    pub fn new(agent_type: AgentType, primary: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            agent_type,
            tier: agent_type.tier(),
            primary: primary.into(),
            fallback,
        }
    }

    /// Backend ids in call order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallback.as_deref())
    }
}

/// Built-in deployment: primary and fallback backend id per agent type.
fn default_backends(agent_type: AgentType) -> (&'static str, &'static str) {
    match agent_type {
        AgentType::Clinical => ("clinical-70b", "general-8b"),
        AgentType::Radiology => ("radiology-34b", "clinical-70b"),
        AgentType::Documentation => ("clinical-70b", "general-8b"),
        AgentType::Billing => ("billing-8b", "general-8b"),
        AgentType::Compliance => ("billing-8b", "general-8b"),
        AgentType::Triage => ("general-8b", "billing-8b"),
    }
}

/// Routing table covering every [`AgentType`].
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: BTreeMap<AgentType, ModelRoute>,
}

impl RouteTable {
    /// The built-in table.
    pub fn defaults() -> Self {
        let routes = AgentType::ALL
            .into_iter()
            .map(|agent| {
                let (primary, fallback) = default_backends(agent);
                (agent, ModelRoute::new(agent, primary, Some(fallback.to_string())))
            })
            .collect();
        Self { routes }
    }

    /// Route every agent type to the same primary/fallback pair.
    pub fn uniform(primary: &str, fallback: Option<&str>) -> Self {
        let routes = AgentType::ALL
            .into_iter()
            .map(|agent| {
                (
                    agent,
                    ModelRoute::new(agent, primary, fallback.map(str::to_string)),
                )
            })
            .collect();
        Self { routes }
    }

    /// Replace the route of one agent type.
    pub fn with_route(mut self, route: ModelRoute) -> Self {
        self.routes.insert(route.agent_type, route);
        self
    }

    pub fn get(&self, agent_type: AgentType) -> Option<&ModelRoute> {
        self.routes.get(&agent_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelRoute> {
        self.routes.values()
    }

    fn backend_ids(&self) -> BTreeSet<&str> {
        self.routes.values().flat_map(ModelRoute::candidates).collect()
    }
}

/// Result of a routed invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub content: ContentFragments,
    pub tokens: u32,
    /// Id of the backend that produced the answer.
    pub model_used: String,
    pub tier: Tier,
    /// Total backend calls made, including failed ones.
    pub attempts: u32,
}

/// Health check result for one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub id: String,
    pub healthy: bool,
}

/// Maps agent types to backends and performs primary → fallback invocation.
///
/// The router owns no mutable state; it is shared behind an `Arc` by the
/// workflow coordinator and the async worker pool.
pub struct ModelRouter {
    routes: RouteTable,
    backends: HashMap<String, Arc<dyn BackendClient>>,
    policy: RetryPolicy,
}

impl ModelRouter {
    /// Build a router, checking that every agent type is routed and every
    /// referenced backend is registered.
    pub fn new(routes: RouteTable, backends: Vec<Arc<dyn BackendClient>>) -> ConclaveResult<Self> {
        let backends: HashMap<String, Arc<dyn BackendClient>> = backends
            .into_iter()
            .map(|b| (b.id().to_string(), b))
            .collect();

        let unrouted: Vec<&str> = AgentType::ALL
            .iter()
            .filter(|a| routes.get(**a).is_none())
            .map(AgentType::as_str)
            .collect();
        if !unrouted.is_empty() {
            return Err(ConclaveError::Config(format!(
                "no route for agent types: {}",
                unrouted.join(", ")
            )));
        }

        let missing: Vec<&str> = routes
            .backend_ids()
            .into_iter()
            .filter(|id| !backends.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            return Err(ConclaveError::Config(format!(
                "routes reference unregistered backends: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            routes,
            backends,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The static route for an agent type.
    pub fn route_for(&self, agent_type: AgentType) -> ConclaveResult<&ModelRoute> {
        self.routes
            .get(agent_type)
            .ok_or_else(|| ConclaveError::UnknownAgentType(agent_type.to_string()))
    }

    /// Candidate backends in call order (primary, then fallback).
    pub fn route(&self, agent_type: AgentType) -> Vec<Arc<dyn BackendClient>> {
        match self.routes.get(agent_type) {
            Some(route) => route
                .candidates()
                .filter_map(|id| self.backends.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = &ModelRoute> {
        self.routes.iter()
    }

    pub fn backend_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Invoke the primary backend; on failure, call the fallback before
    /// giving up with `BackendUnavailable`.
    pub async fn invoke_with_fallback(
        &self,
        agent_type: AgentType,
        request: &InvokeRequest,
    ) -> ConclaveResult<Invocation> {
        let tier = self.route_for(agent_type)?.tier;
        let candidates = self.route(agent_type);
        debug!(agent = %agent_type, candidates = candidates.len(), "Routing invocation");

        match invoke_candidates(&candidates, &self.policy, request).await {
            Ok(outcome) => Ok(Invocation {
                content: outcome.response.content,
                tokens: outcome.response.tokens,
                model_used: outcome.backend_id,
                tier,
                attempts: outcome.attempts,
            }),
            Err(last_err) => {
                let last_error = last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no backends registered".to_string());
                warn!(agent = %agent_type, error = %last_error, "All backends exhausted");
                Err(ConclaveError::BackendUnavailable {
                    agent_type: agent_type.to_string(),
                    last_error,
                })
            }
        }
    }

    /// Check every registered backend concurrently.
    pub async fn health(&self) -> Vec<BackendHealth> {
        let checks = self.backends.values().map(|backend| async move {
            BackendHealth {
                id: backend.id().to_string(),
                healthy: backend.health().await,
            }
        });
        let mut report = futures_util::future::join_all(checks).await;
        report.sort_by(|a, b| a.id.cmp(&b.id));
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::InvokeResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedBackend {
        id: String,
        up: bool,
        calls: AtomicU32,
    }

    impl FixedBackend {
        fn new(id: &str, up: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                up,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl BackendClient for FixedBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn invoke(&self, request: &InvokeRequest) -> ConclaveResult<InvokeResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.up {
                Ok(InvokeResponse {
                    content: format!("{} says: {}", self.id, request.prompt).into(),
                    tokens: 5,
                })
            } else {
                Err(ConclaveError::Backend {
                    backend: self.id.clone(),
                    status: None,
                    message: "connection refused".into(),
                })
            }
        }

        async fn health(&self) -> bool {
            self.up
        }
    }

    #[test]
    fn defaults_cover_every_agent() {
        let table = RouteTable::defaults();
        for agent in AgentType::ALL {
            let route = table.get(agent).unwrap();
            assert_eq!(route.tier, agent.tier());
            assert!(route.fallback.is_some());
            assert_ne!(Some(route.primary.as_str()), route.fallback.as_deref());
        }
    }

    #[test]
    fn rejects_unregistered_backend() {
        let err = ModelRouter::new(
            RouteTable::uniform("a", Some("ghost")),
            vec![FixedBackend::new("a", true)],
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConclaveError::Config(ref m) if m.contains("ghost")));
    }

    #[test]
    fn route_lists_primary_then_fallback() {
        let router = ModelRouter::new(
            RouteTable::uniform("a", Some("b")),
            vec![FixedBackend::new("a", true), FixedBackend::new("b", true)],
        )
        .unwrap();
        let ids: Vec<String> = router
            .route(AgentType::Triage)
            .iter()
            .map(|b| b.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn primary_down_uses_fallback_once() {
        let primary = FixedBackend::new("clinical-70b", false);
        let fallback = FixedBackend::new("general-8b", true);
        let router = ModelRouter::new(
            RouteTable::uniform("clinical-70b", Some("general-8b")),
            vec![primary.clone(), fallback.clone()],
        )
        .unwrap();

        let inv = router
            .invoke_with_fallback(AgentType::Clinical, &InvokeRequest::new("cough", 64, 0.3))
            .await
            .unwrap();

        assert_eq!(inv.model_used, "general-8b");
        assert_eq!(inv.tier, Tier::HighQuality);
        assert_eq!(inv.attempts, 2);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_down_is_backend_unavailable() {
        let router = ModelRouter::new(
            RouteTable::uniform("a", Some("b")),
            vec![FixedBackend::new("a", false), FixedBackend::new("b", false)],
        )
        .unwrap();

        let err = router
            .invoke_with_fallback(AgentType::Billing, &InvokeRequest::new("x", 8, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConclaveError::BackendUnavailable { ref agent_type, .. } if agent_type == "billing"
        ));
    }

    #[tokio::test]
    async fn health_reports_each_backend() {
        let router = ModelRouter::new(
            RouteTable::uniform("a", Some("b")),
            vec![FixedBackend::new("b", false), FixedBackend::new("a", true)],
        )
        .unwrap();
        let report = router.health().await;
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].id, "a");
        assert!(report[0].healthy);
        assert!(!report[1].healthy);
    }
}
