use crate::error::ApiError;
use crate::middleware::{auth_middleware, AuthConfig, Identity};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use conclave_core::ConclaveError;
use conclave_orchestrator::{
    AsyncTaskService, ExecutionCoordinator, QueueEntry, QueueStats, SubmitRequest,
    WorkflowRequest, WorkflowResult, WorkflowTemplateRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WorkflowTemplateRegistry>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub service: Arc<AsyncTaskService>,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without API key checks.
    pub fn build(state: AppState) -> Router {
        Self::build_with_auth(state, AuthConfig::default())
    }

    /// Build the gateway; every `/v1` route goes through [`auth_middleware`].
    /// `/health` is always open.
    pub fn build_with_auth(state: AppState, auth: AuthConfig) -> Router {
        let state = Arc::new(state);

        Router::new()
            .route("/v1/workflows/execute", post(execute_workflow))
            .route("/v1/workflows/types", get(workflow_types))
            .route("/v1/async/submit", post(submit_task))
            .route("/v1/async/stats", get(queue_stats))
            .route("/v1/async/tasks/{task_id}", get(task_status))
            .route("/v1/async/tasks/{task_id}/cancel", post(cancel_task))
            .route("/v1/agents/status", get(agents_status))
            .route("/v1/backends/health", get(backends_health))
            .layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "conclave"}))
}

async fn execute_workflow(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<WorkflowRequest>, JsonRejection>,
) -> Result<Json<WorkflowResult>, ApiError> {
    let Json(mut request) = body?;
    request.requested_by = identity.0;
    info!(
        workflow_type = %request.workflow_type,
        custom = request.custom_tasks.is_some(),
        requested_by = ?request.requested_by,
        "Workflow requested"
    );
    let result = state.coordinator.run(&state.registry, request).await?;
    Ok(Json(result))
}

async fn workflow_types(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "workflows": state.registry.list() }))
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let task_id = state.service.submit(request)?;
    info!(%task_id, requested_by = ?identity.0, "Async task accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "task_id": task_id, "status": "pending" })),
    ))
}

async fn queue_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.service.stats())
}

/// Malformed ids cannot name an entry, so they are reported as not found.
fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ConclaveError::TaskNotFound(raw.to_string()).into())
}

async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<QueueEntry>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    Ok(Json(state.service.status(task_id)?))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let status = state.service.cancel(task_id)?;
    info!(%task_id, %status, requested_by = ?identity.0, "Cancel requested");
    Ok(Json(json!({ "task_id": task_id, "status": status })))
}

async fn agents_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.coordinator.monitor().to_json().await)
}

async fn backends_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let backends = state.coordinator.dispatcher().router().health().await;
    let healthy = backends.iter().all(|b| b.healthy);
    Json(json!({ "healthy": healthy, "backends": backends }))
}
