//! Reasoning Engine collaborator interface.
//!
//! Trace generation (prompt templates, chain composition, model invocation)
//! lives outside this crate. The pipeline only needs two things from it: a
//! way to turn a batch of inputs into one reasoning string per input, and a
//! stable destination for the resulting trace artifacts in the traces store.

use async_trait::async_trait;

use crate::config::CotEvalConfig;
use crate::error::PublishError;
use crate::harness::trace_data_file;
use crate::publish::{PublishArtifact, PublishOutcome, RetryingPublisher};

/// One example the engine produces a reasoning trace for.
#[derive(Debug, Clone)]
pub struct TraceInput {
    /// Passage or context the question refers to.
    pub context: String,
    /// Question plus formatted answer options.
    pub question: String,
}

/// Produces reasoning traces for a batch of inputs.
///
/// Implementations may run internal self-review sub-steps; the contract is
/// only that the output has exactly one trace per input, in order.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn generate(&self, batch: &[TraceInput]) -> anyhow::Result<Vec<String>>;
}

/// Publish a serialized trace dataset for one config/task pair.
///
/// Destination and commit message follow the traces-store convention.
/// Idempotent: an existing artifact at the destination short-circuits.
pub async fn publish_traces(
    publisher: &RetryingPublisher,
    config: &CotEvalConfig,
    task: &str,
    payload: Vec<u8>,
) -> Result<PublishOutcome, PublishError> {
    let artifact = PublishArtifact::new(
        trace_data_file(&config.model, &config.name, task),
        payload,
        format!(
            "Add reasoning traces dataset for config {} and task {}",
            config.name, task
        ),
    );
    publisher.publish(&artifact).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> CotEvalConfig {
        serde_yaml::from_str(
            "name: alpha-1000\ncot_chain: ReflectBeforeRun\nmodel: org/model-7b\ntasks: [logiqa]\n",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_traces_destination_and_idempotency() {
        let store = MemoryStore::new();
        let publisher = RetryingPublisher::new(Arc::new(store.clone()), "org/traces", false)
            .with_retry_interval(Duration::from_millis(1));
        let config = test_config();

        let outcome = publish_traces(&publisher, &config, "logiqa", b"parquet".to_vec())
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Committed);
        assert!(store
            .get_file("org/traces", "data/org/model-7b/alpha-1000-logiqa.parquet")
            .await
            .is_some());

        // Rerunning the same upload is a no-op.
        let outcome = publish_traces(&publisher, &config, "logiqa", b"parquet".to_vec())
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::SkippedExisting);
        assert_eq!(store.mutation_count().await, 1);
    }
}
