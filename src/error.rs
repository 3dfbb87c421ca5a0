//! Error types for cot-eval operations.
//!
//! Defines comprehensive error types for all major subsystems:
//! - Dataset store access (snapshot, commit, existence probes)
//! - Eval-request lifecycle transitions
//! - Trace dataset reconciliation
//! - Leaderboard aggregation
//! - Retrying artifact publication
//! - Chain-run config and harness-task generation

use thiserror::Error;

/// Errors that can occur while talking to a dataset store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Repo '{0}' not found")]
    RepoNotFound(String),

    #[error("Snapshot of '{repo}' failed: {reason}")]
    SnapshotFailed { repo: String, reason: String },

    #[error("Missing authentication token")]
    MissingToken,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during eval-request lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("No pending evaluation requests found")]
    NoPendingWork,

    #[error("Model '{0}' not found in pending requests")]
    ModelNotFound(String),

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Unknown request status '{0}'")]
    UnknownStatus(String),

    #[error("Failed to publish status update: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during traces-dataset reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid manifest in '{path}': {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Traces dataset is not consistent with results dataset: {0}. Aborting clean up, dataset has not been changed")]
    InconsistentState(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during leaderboard aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("No matched cot/base pairs for task '{task}'")]
    EmptyTaskList { task: String },

    #[error("No tasks specified")]
    NoTasks,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while publishing artifacts.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish of '{path}' exhausted {attempts} attempts: {last_error}")]
    Exhausted {
        path: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur during config and harness-task generation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file '{0}' does not exist")]
    NotFound(String),

    #[error("Template file '{0}' does not exist")]
    TemplateNotFound(String),

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
