//! Pull-request landing for the dataset repos.
//!
//! Pipeline stages invoked with `--create-pr` leave their commits as open
//! pull requests instead of writing to main directly. This module lists
//! those PRs, filters them by a title keyword (typically a model id, which
//! every upload commit message carries) and merges the matches, so a
//! review-then-land flow does not end at the review step.

use crate::error::StoreError;
use crate::store::{DatasetStore, PullRequest};

/// Comment posted on every merged pull request.
const MERGE_COMMENT: &str = "Merge PR";

/// Outcome of one merge pass over a repo.
#[derive(Debug, Default)]
pub struct MergeSummary {
    /// Open PRs matching the keyword filter, in listing order.
    pub matched: Vec<PullRequest>,
    /// Number of PRs actually merged.
    pub merged: usize,
}

/// List open pull requests on `repo_id`, keep those whose title contains
/// `keyword` (all of them when no keyword is given) and merge the matches.
///
/// With `do_merge` unset the pass is read-only and only reports what would
/// be merged. A merge failure aborts the pass; already-merged PRs stay
/// merged and the rest remain open for a rerun.
pub async fn merge_open_prs(
    store: &dyn DatasetStore,
    repo_id: &str,
    keyword: Option<&str>,
    do_merge: bool,
) -> Result<MergeSummary, StoreError> {
    let open = store.list_open_pull_requests(repo_id).await?;
    tracing::info!(repo = repo_id, count = open.len(), "Found open pull requests");

    let matched: Vec<PullRequest> = match keyword {
        Some(kw) if !kw.is_empty() => {
            open.into_iter().filter(|pr| pr.title.contains(kw)).collect()
        }
        _ => open,
    };
    for pr in &matched {
        tracing::info!(num = pr.num, title = %pr.title, "PR");
    }

    if !do_merge {
        tracing::info!("Listing only. To merge the matched PRs, pass --do-merge");
        return Ok(MergeSummary { matched, merged: 0 });
    }

    let mut merged = 0usize;
    for pr in &matched {
        tracing::info!(num = pr.num, title = %pr.title, "Merging pull request");
        store
            .merge_pull_request(repo_id, pr.num, MERGE_COMMENT)
            .await?;
        merged += 1;
    }
    tracing::info!(repo = repo_id, merged, "Merged pull requests");

    Ok(MergeSummary { matched, merged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed_pull_request("org/results", 1, "Upload results for model org/model-a")
            .await;
        store
            .seed_pull_request("org/results", 2, "Upload results for model org/model-b")
            .await;
        store
            .seed_pull_request("org/results", 3, "Update status to RUNNING")
            .await;
        store
    }

    #[tokio::test]
    async fn test_keyword_filters_by_title() {
        let store = seeded_store().await;

        let summary = merge_open_prs(&store, "org/results", Some("org/model-a"), false)
            .await
            .unwrap();
        assert_eq!(summary.matched.len(), 1);
        assert_eq!(summary.matched[0].num, 1);

        let all = merge_open_prs(&store, "org/results", None, false)
            .await
            .unwrap();
        assert_eq!(all.matched.len(), 3);

        // An empty keyword matches everything, like no keyword at all.
        let blank = merge_open_prs(&store, "org/results", Some(""), false)
            .await
            .unwrap();
        assert_eq!(blank.matched.len(), 3);
    }

    #[tokio::test]
    async fn test_listing_pass_merges_nothing() {
        let store = seeded_store().await;

        let summary = merge_open_prs(&store, "org/results", None, false)
            .await
            .unwrap();
        assert_eq!(summary.merged, 0);
        assert!(store.merged_log().await.is_empty());
        assert_eq!(
            store.list_open_pull_requests("org/results").await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_merge_lands_only_matches() {
        let store = seeded_store().await;

        let summary = merge_open_prs(&store, "org/results", Some("Upload results"), true)
            .await
            .unwrap();
        assert_eq!(summary.merged, 2);
        assert_eq!(
            store.merged_log().await,
            vec![
                ("org/results".to_string(), 1),
                ("org/results".to_string(), 2)
            ]
        );

        // The status-update PR stays open.
        let open = store.list_open_pull_requests("org/results").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].num, 3);
    }
}
