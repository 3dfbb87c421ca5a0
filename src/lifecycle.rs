//! Evaluation-job lifecycle: claiming pending requests and advancing status.
//!
//! A request moves PENDING -> RUNNING -> FINISHED, or to FAILED from either
//! non-terminal state. Transitions are enforced strictly; a finished or
//! failed request can never be reactivated.
//!
//! Claiming is not mutually excluded across concurrent pipeline invocations:
//! two workers can both observe the same PENDING request before either
//! advances it, and the last status commit wins at the store. Callers that
//! need exclusivity must serialize invocations externally.

use std::path::Path;

use crate::error::LifecycleError;
use crate::publish::{PublishArtifact, RetryingPublisher};
use crate::requests::{rewrite_status, EvalRequest, RequestStatus};

/// Check whether a status transition is allowed.
///
/// Transitions are monotonic: PENDING may start running or fail outright,
/// RUNNING may finish or fail, FINISHED and FAILED are terminal.
pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Pending, Running) | (Pending, Failed) | (Running, Finished) | (Running, Failed)
    )
}

/// Claims and advances evaluation requests.
pub struct JobLifecycle {
    publisher: RetryingPublisher,
}

impl JobLifecycle {
    /// Create a lifecycle manager publishing status updates through
    /// `publisher` (configured for the request-queue repo).
    pub fn new(publisher: RetryingPublisher) -> Self {
        Self { publisher }
    }

    /// Select the next request to evaluate.
    ///
    /// With `model_id`, the unique pending request for that model is
    /// returned, or [`LifecycleError::ModelNotFound`]. Otherwise requests
    /// are filtered by `params <= max_params` (requests without a params
    /// field are excluded when a cap is given) and the earliest parsed
    /// `submitted_time` wins; the sort is stable, so ties keep their
    /// enumeration order.
    pub fn claim_next<'a>(
        pending: &'a [EvalRequest],
        max_params: Option<f64>,
        model_id: Option<&str>,
    ) -> Result<&'a EvalRequest, LifecycleError> {
        if pending.is_empty() {
            return Err(LifecycleError::NoPendingWork);
        }

        if let Some(model) = model_id {
            return pending
                .iter()
                .find(|r| r.model == model)
                .ok_or_else(|| LifecycleError::ModelNotFound(model.to_string()));
        }

        let mut candidates: Vec<&EvalRequest> = match max_params {
            Some(cap) => pending
                .iter()
                .filter(|r| r.params.map(|p| p <= cap).unwrap_or(false))
                .collect(),
            None => pending.iter().collect(),
        };

        if candidates.is_empty() {
            return Err(LifecycleError::NoPendingWork);
        }

        candidates.sort_by_key(|r| r.submitted_at());
        Ok(candidates[0])
    }

    /// Advance `request` to `new_status` and publish the update.
    ///
    /// The request's snapshot file is rewritten first, then uploaded with a
    /// commit message naming the new status. A publish failure after the
    /// retry budget leaves the local copy and the store inconsistent and is
    /// surfaced to the caller; there is no rollback.
    pub async fn advance(
        &self,
        request: &EvalRequest,
        new_status: RequestStatus,
        local_dir: &Path,
    ) -> Result<(), LifecycleError> {
        if !can_transition(request.status, new_status) {
            return Err(LifecycleError::InvalidTransition {
                from: request.status.to_string(),
                to: new_status.to_string(),
            });
        }

        rewrite_status(&request.source_path, new_status)?;

        let path_in_repo = request
            .source_path
            .strip_prefix(local_dir)
            .unwrap_or(&request.source_path)
            .to_string_lossy()
            .to_string();

        let content = std::fs::read(&request.source_path)?;
        let artifact = PublishArtifact::new(
            path_in_repo,
            content,
            format!("Update status to {}", new_status),
        );
        self.publisher.publish_overwrite(&artifact).await?;

        tracing::info!(
            model = %request.model,
            status = %new_status,
            "Updated eval request status"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn request(model: &str, submitted: &str, params: Option<f64>) -> EvalRequest {
        serde_json::from_value(serde_json::json!({
            "model": model,
            "status": "PENDING",
            "submitted_time": submitted,
            "params": params,
        }))
        .unwrap()
    }

    #[test]
    fn test_claim_next_is_fifo() {
        let pending = vec![
            request("org/b", "2024-02-01T00:00:00", None),
            request("org/a", "2024-01-01T00:00:00", None),
            request("org/c", "2024-03-01T00:00:00", None),
        ];

        let claimed = JobLifecycle::claim_next(&pending, None, None).unwrap();
        assert_eq!(claimed.model, "org/a");
    }

    #[test]
    fn test_claim_next_ties_keep_enumeration_order() {
        let pending = vec![
            request("org/first", "2024-01-01T00:00:00", None),
            request("org/second", "2024-01-01T00:00:00", None),
        ];

        let claimed = JobLifecycle::claim_next(&pending, None, None).unwrap();
        assert_eq!(claimed.model, "org/first");
    }

    #[test]
    fn test_claim_next_malformed_timestamp_sorts_first() {
        let pending = vec![
            request("org/ok", "2020-01-01T00:00:00", None),
            request("org/bad-timestamp", "yesterday", None),
        ];

        let claimed = JobLifecycle::claim_next(&pending, None, None).unwrap();
        assert_eq!(claimed.model, "org/bad-timestamp");
    }

    #[test]
    fn test_claim_next_filters_by_max_params() {
        let pending = vec![
            request("org/huge", "2024-01-01T00:00:00", Some(70.0)),
            request("org/small", "2024-02-01T00:00:00", Some(7.0)),
            request("org/unsized", "2024-01-15T00:00:00", None),
        ];

        let claimed = JobLifecycle::claim_next(&pending, Some(10.0), None).unwrap();
        assert_eq!(claimed.model, "org/small");
    }

    #[test]
    fn test_claim_next_by_model_id() {
        let pending = vec![
            request("org/a", "2024-01-01T00:00:00", None),
            request("org/b", "2024-02-01T00:00:00", None),
        ];

        let claimed = JobLifecycle::claim_next(&pending, None, Some("org/b")).unwrap();
        assert_eq!(claimed.model, "org/b");

        let missing = JobLifecycle::claim_next(&pending, None, Some("org/zzz"));
        assert!(matches!(missing, Err(LifecycleError::ModelNotFound(_))));
    }

    #[test]
    fn test_claim_next_empty_queue() {
        let err = JobLifecycle::claim_next(&[], None, None).unwrap_err();
        assert!(matches!(err, LifecycleError::NoPendingWork));

        let oversized = vec![request("org/huge", "2024-01-01T00:00:00", Some(70.0))];
        let err = JobLifecycle::claim_next(&oversized, Some(10.0), None).unwrap_err();
        assert!(matches!(err, LifecycleError::NoPendingWork));
    }

    #[test]
    fn test_transition_table() {
        use RequestStatus::*;
        assert!(can_transition(Pending, Running));
        assert!(can_transition(Pending, Failed));
        assert!(can_transition(Running, Finished));
        assert!(can_transition(Running, Failed));

        assert!(!can_transition(Pending, Finished));
        assert!(!can_transition(Running, Pending));
        assert!(!can_transition(Finished, Running));
        assert!(!can_transition(Failed, Pending));
        assert!(!can_transition(Finished, Finished));
    }

    #[tokio::test]
    async fn test_advance_publishes_status_update() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("org").join("model-7b.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"model": "org/model-7b", "status": "PENDING", "likes": 3}"#,
        )
        .unwrap();

        let mut requests =
            crate::requests::load_requests(dir.path(), &[RequestStatus::Pending]).unwrap();
        let request = requests.remove(0);

        let publisher = RetryingPublisher::new(Arc::new(store.clone()), "org/requests", false)
            .with_retry_interval(Duration::from_millis(1));
        let lifecycle = JobLifecycle::new(publisher);

        lifecycle
            .advance(&request, RequestStatus::Running, dir.path())
            .await
            .unwrap();

        let uploaded = store
            .get_file("org/requests", "org/model-7b.json")
            .await
            .expect("status update should be in store");
        let data: serde_json::Value = serde_json::from_slice(&uploaded).unwrap();
        assert_eq!(data["status"], "RUNNING");
        assert_eq!(data["likes"], 3);
        assert_eq!(
            store.commit_log().await,
            vec!["Update status to RUNNING".to_string()]
        );
    }

    #[tokio::test]
    async fn test_advance_rejects_non_monotonic_transition() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"{"model": "org/m", "status": "FINISHED"}"#).unwrap();

        let mut requests =
            crate::requests::load_requests(dir.path(), &[RequestStatus::Finished]).unwrap();
        let request = requests.remove(0);

        let publisher = RetryingPublisher::new(Arc::new(store.clone()), "org/requests", false);
        let lifecycle = JobLifecycle::new(publisher);

        let err = lifecycle
            .advance(&request, RequestStatus::Running, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        // Rejected transitions must not touch the store.
        assert_eq!(store.mutation_count().await, 0);
    }
}
