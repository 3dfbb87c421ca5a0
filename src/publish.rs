//! Retrying, idempotent artifact publication.
//!
//! Uploads to the dataset stores go through a single publisher so every
//! caller gets the same contract: an artifact that already exists at its
//! destination is skipped (reruns of a failed pipeline stage must not
//! duplicate uploads), and transient store failures are retried up to a
//! fixed budget before being escalated as fatal.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PublishError;
use crate::store::DatasetStore;

/// Maximum number of commit attempts before giving up.
const MAX_ATTEMPTS: u32 = 5;

/// Pause between attempts.
const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// One file destined for a dataset repo.
#[derive(Debug, Clone)]
pub struct PublishArtifact {
    /// Path inside the target repo.
    pub destination: String,
    pub content: Vec<u8>,
    pub commit_message: String,
}

impl PublishArtifact {
    pub fn new(
        destination: impl Into<String>,
        content: impl Into<Vec<u8>>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            content: content.into(),
            commit_message: commit_message.into(),
        }
    }
}

/// Outcome of a publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The artifact was committed to the store.
    Committed,
    /// An artifact already existed at the destination; nothing was uploaded.
    SkippedExisting,
}

/// Publishes artifacts to one dataset repo with retries.
pub struct RetryingPublisher {
    store: Arc<dyn DatasetStore>,
    repo_id: String,
    create_pr: bool,
    max_attempts: u32,
    retry_interval: Duration,
}

impl RetryingPublisher {
    pub fn new(store: Arc<dyn DatasetStore>, repo_id: impl Into<String>, create_pr: bool) -> Self {
        Self {
            store,
            repo_id: repo_id.into(),
            create_pr,
            max_attempts: MAX_ATTEMPTS,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Override the retry pause. Tests use millisecond intervals.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Override the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Target repo of this publisher.
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Publish `artifact`, skipping entirely if the destination exists.
    pub async fn publish(&self, artifact: &PublishArtifact) -> Result<PublishOutcome, PublishError> {
        if self
            .store
            .file_exists(&self.repo_id, &artifact.destination)
            .await?
        {
            tracing::info!(
                path = %artifact.destination,
                repo = %self.repo_id,
                "Artifact already in store, skipping upload"
            );
            return Ok(PublishOutcome::SkippedExisting);
        }
        self.upload_with_retries(artifact).await?;
        Ok(PublishOutcome::Committed)
    }

    /// Publish `artifact` unconditionally, overwriting any existing file.
    ///
    /// Used for records that are rewritten on every run (request status,
    /// leaderboard records).
    pub async fn publish_overwrite(&self, artifact: &PublishArtifact) -> Result<(), PublishError> {
        self.upload_with_retries(artifact).await
    }

    async fn upload_with_retries(&self, artifact: &PublishArtifact) -> Result<(), PublishError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self
                .store
                .upload_file(
                    &self.repo_id,
                    &artifact.destination,
                    &artifact.content,
                    &artifact.commit_message,
                    self.create_pr,
                )
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        path = %artifact.destination,
                        repo = %self.repo_id,
                        attempt,
                        "Published artifact"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(
                        path = %artifact.destination,
                        repo = %self.repo_id,
                        attempt,
                        error = %e,
                        "Upload failed"
                    );
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        tracing::info!(
                            "Retrying in {} seconds",
                            self.retry_interval.as_secs()
                        );
                        tokio::time::sleep(self.retry_interval).await;
                    }
                }
            }
        }

        Err(PublishError::Exhausted {
            path: artifact.destination.clone(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn publisher(store: &MemoryStore) -> RetryingPublisher {
        RetryingPublisher::new(Arc::new(store.clone()), "org/results", false)
            .with_retry_interval(Duration::from_millis(1))
    }

    fn artifact() -> PublishArtifact {
        PublishArtifact::new("data/m/results.json", b"{}".to_vec(), "Upload results")
    }

    #[tokio::test]
    async fn test_publish_is_idempotent() {
        let store = MemoryStore::new();
        let publisher = publisher(&store);

        let first = publisher.publish(&artifact()).await.unwrap();
        assert_eq!(first, PublishOutcome::Committed);

        let second = publisher.publish(&artifact()).await.unwrap();
        assert_eq!(second, PublishOutcome::SkippedExisting);

        // Exactly one artifact in the store, one mutation total.
        assert_eq!(store.list_paths("org/results").await.len(), 1);
        assert_eq!(store.mutation_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_retries_transient_failures() {
        let store = MemoryStore::new();
        store.fail_next_commits(3).await;
        let publisher = publisher(&store);

        let outcome = publisher.publish(&artifact()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Committed);
        assert_eq!(store.mutation_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_exhausts_budget() {
        let store = MemoryStore::new();
        store.fail_next_commits(5).await;
        let publisher = publisher(&store);

        let err = publisher.publish(&artifact()).await.unwrap_err();
        match err {
            PublishError::Exhausted { path, attempts, .. } => {
                assert_eq!(path, "data/m/results.json");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(store.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_overwrite_replaces_existing() {
        let store = MemoryStore::new();
        store.seed_file("org/results", "m/leaderboard.json", b"old").await;
        let publisher = publisher(&store);

        publisher
            .publish_overwrite(&PublishArtifact::new(
                "m/leaderboard.json",
                b"new".to_vec(),
                "Update leaderboard",
            ))
            .await
            .unwrap();

        assert_eq!(
            store.get_file("org/results", "m/leaderboard.json").await,
            Some(b"new".to_vec())
        );
    }
}
