//! cot-eval: coordinator for a distributed chain-of-thought evaluation pipeline.
//!
//! This library keeps three logically-linked dataset repos consistent (a job
//! request queue, a raw-results store, a reasoning-traces store): it claims
//! and advances evaluation jobs, publishes trace and result artifacts
//! idempotently, audits and repairs drift between the traces and results
//! datasets, and aggregates per-model leaderboard deltas.

// Core modules
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod harness;
pub mod leaderboard;
pub mod lifecycle;
pub mod prs;
pub mod publish;
pub mod reconcile;
pub mod requests;
pub mod store;

// Re-export commonly used error types
pub use error::{
    AggregateError, ConfigError, LifecycleError, PublishError, ReconcileError, StoreError,
};
