//! Dataset store abstraction.
//!
//! All pipeline state lives in append-only dataset repositories: a request
//! queue, a raw-results store and a reasoning-traces store. This module
//! defines the minimal interface the pipeline needs from that storage layer:
//!
//! - Snapshot download of a full repo into a local directory
//! - File-existence probe (used for idempotent publishing)
//! - Single-file upload
//! - Atomic multi-operation commit, optionally opened as a pull request
//! - Listing and merging the open pull requests those commits create
//!
//! Components take a store client by value at construction time instead of
//! reading a process-global client, so tests can substitute [`MemoryStore`].

pub mod hf;
pub mod memory;

pub use hf::{HfDatasetStore, HfStoreConfig};
pub use memory::MemoryStore;

use std::path::Path;

use async_trait::async_trait;

use crate::error::StoreError;

/// An open pull request against a dataset repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Discussion number, unique per repo.
    pub num: u64,
    pub title: String,
}

/// One operation inside an atomic multi-file commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOperation {
    /// Add or overwrite a file at `path` with `content`.
    Add { path: String, content: Vec<u8> },
    /// Delete a directory (and everything below it) at `path`.
    DeleteFolder { path: String },
}

impl CommitOperation {
    /// Convenience constructor for an add operation.
    pub fn add(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::Add {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a folder deletion.
    pub fn delete_folder(path: impl Into<String>) -> Self {
        Self::DeleteFolder { path: path.into() }
    }
}

/// Versioned dataset repository with atomic commits.
///
/// Commit serialization (last-writer-wins on concurrent commits) is owned by
/// the store; callers must not assume any in-process mutual exclusion.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Download a full snapshot of `repo_id` (main revision) into `local_dir`.
    async fn snapshot(&self, repo_id: &str, local_dir: &Path) -> Result<(), StoreError>;

    /// Check whether `path_in_repo` already exists in `repo_id`.
    async fn file_exists(&self, repo_id: &str, path_in_repo: &str) -> Result<bool, StoreError>;

    /// Upload a single file as its own commit.
    async fn upload_file(
        &self,
        repo_id: &str,
        path_in_repo: &str,
        content: &[u8],
        commit_message: &str,
        create_pr: bool,
    ) -> Result<(), StoreError>;

    /// Apply a set of operations as one atomic commit.
    ///
    /// Either every operation lands or none does; partial application would
    /// hide dataset drift instead of repairing it.
    async fn create_commit(
        &self,
        repo_id: &str,
        operations: &[CommitOperation],
        commit_message: &str,
        create_pr: bool,
    ) -> Result<(), StoreError>;

    /// List open pull requests against `repo_id`.
    async fn list_open_pull_requests(&self, repo_id: &str)
        -> Result<Vec<PullRequest>, StoreError>;

    /// Merge an open pull request by discussion number.
    async fn merge_pull_request(
        &self,
        repo_id: &str,
        num: u64,
        comment: &str,
    ) -> Result<(), StoreError>;
}
