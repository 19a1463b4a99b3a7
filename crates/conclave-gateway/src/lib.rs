//! HTTP gateway for Conclave.
//!
//! Exposes workflow execution, the async task queue, the agent monitor and
//! backend health over an axum [`Router`](axum::Router). All state is passed
//! in explicitly through [`AppState`].

/// Mapping from [`ConclaveError`](conclave_core::ConclaveError) to HTTP responses.
pub mod error;
/// Identity extraction and API key checks.
pub mod middleware;
/// Route table and handlers.
pub mod server;

pub use error::ApiError;
pub use middleware::{AuthConfig, Identity};
pub use server::{AppState, GatewayServer};
