//! HuggingFace Hub REST API client for dataset repositories.
//!
//! Uses the HF Hub commit API to push files (and folder deletions) to a
//! dataset repo, and the tree/resolve APIs to download snapshots and probe
//! for existing files.

use std::path::Path;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{CommitOperation, DatasetStore, PullRequest};

const HF_API_BASE: &str = "https://huggingface.co/api";
const HF_RESOLVE_BASE: &str = "https://huggingface.co/datasets";

/// Connection settings for the HF dataset store.
#[derive(Debug, Clone)]
pub struct HfStoreConfig {
    /// Read/write token for the org.
    pub token: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HfStoreConfig {
    /// Build a config from a token, with the default 300s timeout.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Serialize)]
struct CommitAction {
    action: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    summary: String,
    actions: Vec<CommitAction>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    entry_type: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct DiscussionEntry {
    num: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct DiscussionPage {
    discussions: Vec<DiscussionEntry>,
}

/// HF Hub implementation of [`DatasetStore`].
pub struct HfDatasetStore {
    client: Client,
    config: HfStoreConfig,
}

impl HfDatasetStore {
    pub fn new(config: HfStoreConfig) -> Result<Self, StoreError> {
        if config.token.is_empty() {
            return Err(StoreError::MissingToken);
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// List every file in the repo's main revision.
    async fn list_files(&self, repo_id: &str) -> Result<Vec<String>, StoreError> {
        let url = format!(
            "{}/datasets/{}/tree/main?recursive=true",
            HF_API_BASE, repo_id
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(StoreError::RepoNotFound(repo_id.to_string()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let entries: Vec<TreeEntry> = resp.json().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.entry_type == "file")
            .map(|e| e.path)
            .collect())
    }

    fn discussions_url(&self, repo_id: &str) -> String {
        format!(
            "{}/datasets/{}/discussions?type=pull_request&status=open",
            HF_API_BASE, repo_id
        )
    }

    fn merge_url(&self, repo_id: &str, num: u64) -> String {
        format!(
            "{}/datasets/{}/discussions/{}/merge",
            HF_API_BASE, repo_id, num
        )
    }

    fn commit_url(&self, repo_id: &str, create_pr: bool) -> String {
        let mut url = format!("{}/datasets/{}/commit/main", HF_API_BASE, repo_id);
        if create_pr {
            url.push_str("?create_pr=1");
        }
        url
    }

    async fn post_commit(
        &self,
        repo_id: &str,
        body: &CommitRequest,
        create_pr: bool,
    ) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.commit_url(repo_id, create_pr))
            .bearer_auth(&self.config.token)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = resp.text().await.unwrap_or_default();
            Err(StoreError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn encode_action(op: &CommitOperation) -> CommitAction {
    match op {
        CommitOperation::Add { path, content } => CommitAction {
            action: "file".to_string(),
            path: path.clone(),
            content: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                content,
            )),
            encoding: Some("base64".to_string()),
        },
        CommitOperation::DeleteFolder { path } => CommitAction {
            action: "deleteFolder".to_string(),
            path: path.clone(),
            content: None,
            encoding: None,
        },
    }
}

#[async_trait::async_trait]
impl DatasetStore for HfDatasetStore {
    async fn snapshot(&self, repo_id: &str, local_dir: &Path) -> Result<(), StoreError> {
        let files = self.list_files(repo_id).await?;
        tracing::info!(repo = repo_id, files = files.len(), "Downloading snapshot");

        for file in &files {
            let url = format!(
                "{}/{}/resolve/main/{}",
                HF_RESOLVE_BASE,
                repo_id,
                urlencoding::encode(file).replace("%2F", "/")
            );
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.config.token)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(StoreError::SnapshotFailed {
                    repo: repo_id.to_string(),
                    reason: format!("download of '{}' failed with status {}", file, status),
                });
            }

            let bytes = resp.bytes().await?;
            let dest = local_dir.join(file);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, &bytes)?;
        }

        Ok(())
    }

    async fn file_exists(&self, repo_id: &str, path_in_repo: &str) -> Result<bool, StoreError> {
        let url = format!(
            "{}/{}/resolve/main/{}",
            HF_RESOLVE_BASE,
            repo_id,
            urlencoding::encode(path_in_repo).replace("%2F", "/")
        );
        let resp = self
            .client
            .head(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status.as_u16() == 404 {
            Ok(false)
        } else {
            let message = resp.text().await.unwrap_or_default();
            Err(StoreError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn upload_file(
        &self,
        repo_id: &str,
        path_in_repo: &str,
        content: &[u8],
        commit_message: &str,
        create_pr: bool,
    ) -> Result<(), StoreError> {
        let body = CommitRequest {
            summary: commit_message.to_string(),
            actions: vec![encode_action(&CommitOperation::Add {
                path: path_in_repo.to_string(),
                content: content.to_vec(),
            })],
        };
        self.post_commit(repo_id, &body, create_pr).await?;
        tracing::info!(path = path_in_repo, repo = repo_id, "Uploaded file");
        Ok(())
    }

    async fn create_commit(
        &self,
        repo_id: &str,
        operations: &[CommitOperation],
        commit_message: &str,
        create_pr: bool,
    ) -> Result<(), StoreError> {
        if operations.is_empty() {
            return Ok(());
        }
        let body = CommitRequest {
            summary: commit_message.to_string(),
            actions: operations.iter().map(encode_action).collect(),
        };
        self.post_commit(repo_id, &body, create_pr).await?;
        tracing::info!(
            repo = repo_id,
            operations = operations.len(),
            create_pr,
            "Committed batch"
        );
        Ok(())
    }

    async fn list_open_pull_requests(
        &self,
        repo_id: &str,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let resp = self
            .client
            .get(self.discussions_url(repo_id))
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(StoreError::RepoNotFound(repo_id.to_string()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page: DiscussionPage = resp.json().await?;
        Ok(page
            .discussions
            .into_iter()
            .map(|d| PullRequest {
                num: d.num,
                title: d.title,
            })
            .collect())
    }

    async fn merge_pull_request(
        &self,
        repo_id: &str,
        num: u64,
        comment: &str,
    ) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.merge_url(repo_id, num))
            .bearer_auth(&self.config.token)
            .json(&serde_json::json!({ "comment": comment }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        tracing::info!(repo = repo_id, num, "Merged pull request");
        Ok(())
    }
}
