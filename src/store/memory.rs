//! In-memory dataset store.
//!
//! Backs the test suites and local dry-runs. Every mutation is recorded so
//! tests can assert that an aborted repair left the store untouched, and
//! commits can be made to fail a configurable number of times to exercise
//! retry budgets.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{CommitOperation, DatasetStore, PullRequest};

#[derive(Default)]
struct MemoryState {
    /// repo_id -> path_in_repo -> content
    files: HashMap<String, HashMap<String, Vec<u8>>>,
    /// repo_id -> open pull requests
    pull_requests: HashMap<String, Vec<PullRequest>>,
    /// Number of commits applied (single uploads included).
    mutation_count: u64,
    /// Commits left to fail before succeeding again.
    fail_next_commits: u32,
    /// Commit messages in application order.
    commit_log: Vec<String>,
    /// (repo_id, num) of merged pull requests, in merge order.
    merged_log: Vec<(String, u64)>,
}

/// In-memory implementation of [`DatasetStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file into a repo without counting it as a mutation.
    pub async fn seed_file(&self, repo_id: &str, path: &str, content: &[u8]) {
        let mut state = self.state.lock().await;
        state
            .files
            .entry(repo_id.to_string())
            .or_default()
            .insert(path.to_string(), content.to_vec());
    }

    /// Seed an open pull request into a repo.
    pub async fn seed_pull_request(&self, repo_id: &str, num: u64, title: &str) {
        let mut state = self.state.lock().await;
        state
            .pull_requests
            .entry(repo_id.to_string())
            .or_default()
            .push(PullRequest {
                num,
                title: title.to_string(),
            });
    }

    /// (repo_id, num) of merged pull requests, in merge order.
    pub async fn merged_log(&self) -> Vec<(String, u64)> {
        self.state.lock().await.merged_log.clone()
    }

    /// Make the next `n` commits fail with a transient store error.
    pub async fn fail_next_commits(&self, n: u32) {
        self.state.lock().await.fail_next_commits = n;
    }

    /// Number of commits applied since creation.
    pub async fn mutation_count(&self) -> u64 {
        self.state.lock().await.mutation_count
    }

    /// Commit messages in application order.
    pub async fn commit_log(&self) -> Vec<String> {
        self.state.lock().await.commit_log.clone()
    }

    /// Content of a stored file, if present.
    pub async fn get_file(&self, repo_id: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .files
            .get(repo_id)
            .and_then(|repo| repo.get(path))
            .cloned()
    }

    /// All file paths currently stored in a repo, sorted.
    pub async fn list_paths(&self, repo_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut paths: Vec<String> = state
            .files
            .get(repo_id)
            .map(|repo| repo.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    fn apply(state: &mut MemoryState, repo_id: &str, op: &CommitOperation) {
        let repo = state.files.entry(repo_id.to_string()).or_default();
        match op {
            CommitOperation::Add { path, content } => {
                repo.insert(path.clone(), content.clone());
            }
            CommitOperation::DeleteFolder { path } => {
                let prefix = path.trim_end_matches('/');
                repo.retain(|p, _| p != prefix && !p.starts_with(&format!("{}/", prefix)));
            }
        }
    }

    async fn commit(
        &self,
        repo_id: &str,
        operations: &[CommitOperation],
        commit_message: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_next_commits > 0 {
            state.fail_next_commits -= 1;
            return Err(StoreError::Api {
                status: 500,
                message: "injected commit failure".to_string(),
            });
        }
        for op in operations {
            Self::apply(&mut state, repo_id, op);
        }
        state.mutation_count += 1;
        state.commit_log.push(commit_message.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatasetStore for MemoryStore {
    async fn snapshot(&self, repo_id: &str, local_dir: &Path) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        let repo = state
            .files
            .get(repo_id)
            .ok_or_else(|| StoreError::RepoNotFound(repo_id.to_string()))?;
        for (path, content) in repo {
            let dest = local_dir.join(path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, content)?;
        }
        Ok(())
    }

    async fn file_exists(&self, repo_id: &str, path_in_repo: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .get(repo_id)
            .map(|repo| repo.contains_key(path_in_repo))
            .unwrap_or(false))
    }

    async fn upload_file(
        &self,
        repo_id: &str,
        path_in_repo: &str,
        content: &[u8],
        commit_message: &str,
        _create_pr: bool,
    ) -> Result<(), StoreError> {
        self.commit(
            repo_id,
            &[CommitOperation::add(path_in_repo, content)],
            commit_message,
        )
        .await
    }

    async fn create_commit(
        &self,
        repo_id: &str,
        operations: &[CommitOperation],
        commit_message: &str,
        _create_pr: bool,
    ) -> Result<(), StoreError> {
        if operations.is_empty() {
            return Ok(());
        }
        self.commit(repo_id, operations, commit_message).await
    }

    async fn list_open_pull_requests(
        &self,
        repo_id: &str,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .pull_requests
            .get(repo_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn merge_pull_request(
        &self,
        repo_id: &str,
        num: u64,
        _comment: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let open = state.pull_requests.entry(repo_id.to_string()).or_default();
        let before = open.len();
        open.retain(|pr| pr.num != num);
        if open.len() == before {
            return Err(StoreError::Api {
                status: 404,
                message: format!("no open pull request {} in {}", num, repo_id),
            });
        }
        state.merged_log.push((repo_id.to_string(), num));
        Ok(())
    }
}
