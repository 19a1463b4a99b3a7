//! Model backend access for Conclave.
//!
//! Every model server is reached through the [`BackendClient`] trait. The
//! [`ModelRouter`] maps each agent type to a primary and fallback backend and
//! performs the fallback dance; [`LimitedBackend`] caps how many calls a single
//! endpoint receives at once.
//!
//! # Main types
//!
//! - [`BackendClient`]: Uniform invoke/health interface to one endpoint.
//! - [`HttpBackend`]: OpenAI-compatible HTTP implementation.
//! - [`LimitedBackend`]: Semaphore-based per-endpoint concurrency ceiling.
//! - [`ModelRouter`]: Static routing table with `invoke_with_fallback`.
//! - [`ContentFragments`]: Restartable, finite sequence of content fragments.
//! - [`PromptEnricher`]: Optional pre-call hook for retrieval-augmented prompts.

pub mod backends;
pub mod config;
pub mod enrich;
pub mod failover;
pub mod fragments;
pub mod limiter;
pub mod router;

pub use backends::http::HttpBackend;
pub use backends::{BackendClient, InvokeRequest, InvokeResponse};
pub use config::{BackendConfig, BackendProvider};
pub use enrich::{NoopEnricher, PromptEnricher};
pub use failover::RetryPolicy;
pub use fragments::ContentFragments;
pub use limiter::LimitedBackend;
pub use router::{BackendHealth, Invocation, ModelRoute, ModelRouter, RouteTable};
