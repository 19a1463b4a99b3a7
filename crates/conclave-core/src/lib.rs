//! Core types and error definitions for the Conclave orchestration engine.
//!
//! This crate provides the foundational types shared across all Conclave
//! crates: the error taxonomy and the closed set of agent types with their
//! latency tiers.
//!
//! # Main types
//!
//! - [`ConclaveError`]: Unified error enum covering validation, backend and queue failures.
//! - [`ConclaveResult`]: Convenience alias for `Result<T, ConclaveError>`.
//! - [`AgentType`]: A named category of subtask, mapped to backend models by the router.
//! - [`Tier`]: Real-time vs high-quality classification, reported alongside results.

/// Agent type and tier definitions.
pub mod agent;
/// Error taxonomy.
pub mod error;

pub use agent::{AgentType, Tier};
pub use error::{ConclaveError, ConclaveResult};
