use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conclave_core::ConclaveError;
use thiserror::Error;
use tracing::error;

/// Error returned by every handler. Serialized as
/// `{"error": <kind>, "message": <display>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Conclave(#[from] ConclaveError),
    /// The request body could not be decoded.
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("{0}")]
    Unauthorized(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Conclave(err) => match err {
                ConclaveError::UnknownWorkflowType(_)
                | ConclaveError::UnknownAgentType(_)
                | ConclaveError::TaskNotFound(_) => StatusCode::NOT_FOUND,
                ConclaveError::UnknownDependency { .. }
                | ConclaveError::DependencyCycle(_)
                | ConclaveError::InvalidContext(_)
                | ConclaveError::Json(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ConclaveError::QueueSaturated { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ConclaveError::BackendTimeout { .. }
                | ConclaveError::Backend { .. }
                | ConclaveError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
                ConclaveError::InvalidTransition { .. }
                | ConclaveError::WorkflowTimeout(_)
                | ConclaveError::Config(_)
                | ConclaveError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Conclave(err) => err.kind(),
            ApiError::InvalidBody(_) => "invalid_request",
            ApiError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Request failed");
        }
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ConclaveError::UnknownWorkflowType("x".into()), 404),
            (ConclaveError::UnknownAgentType("x".into()), 404),
            (ConclaveError::TaskNotFound("x".into()), 404),
            (ConclaveError::DependencyCycle("a".into()), 422),
            (ConclaveError::InvalidContext("missing".into()), 422),
            (ConclaveError::QueueSaturated { capacity: 4 }, 503),
            (
                ConclaveError::BackendUnavailable {
                    agent_type: "billing".into(),
                    last_error: "down".into(),
                },
                502,
            ),
            (ConclaveError::Config("bad".into()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status().as_u16(), expected);
        }
    }

    #[test]
    fn test_kind_passthrough() {
        let err = ApiError::from(ConclaveError::QueueSaturated { capacity: 1 });
        assert_eq!(err.kind(), "queue_saturated");
        assert_eq!(ApiError::InvalidBody("eof".into()).kind(), "invalid_request");
    }
}
