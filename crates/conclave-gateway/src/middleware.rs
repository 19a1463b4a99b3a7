use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Header carrying an upstream-authenticated caller identity.
pub const IDENTITY_HEADER: &str = "x-conclave-identity";

/// Auth configuration for the gateway.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// API keys accepted as `Authorization: Bearer <key>`. Empty = no auth required.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Returns true if authentication is enabled (at least one key configured).
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Opaque caller identity, recorded in workflow metadata and logs only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity(pub Option<String>);

fn bearer_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// Never put a full key into audit metadata.
fn key_label(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    format!("key:{prefix}")
}

fn resolve_identity(headers: &HeaderMap) -> Identity {
    let explicit = headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    Identity(explicit.or_else(|| bearer_key(headers).map(key_label)))
}

/// Attaches an [`Identity`] to every request.
///
/// With keys configured, requests must carry `Authorization: Bearer <key>`
/// with one of them; anything else is rejected with 401.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();

    if auth.is_enabled() {
        match bearer_key(headers) {
            Some(k) if auth.api_keys.iter().any(|allowed| allowed == k) => {}
            Some(_) => {
                warn!("Rejected request: invalid API key");
                return ApiError::Unauthorized("Invalid API key".into()).into_response();
            }
            None => {
                warn!("Rejected request: missing API key");
                return ApiError::Unauthorized("API key required".into()).into_response();
            }
        }
    }

    let identity = resolve_identity(headers);
    request.extensions_mut().insert(identity);
    next.run(request).await
}
