//! Leaderboard aggregation: per-task accuracy deltas between cot and base runs.
//!
//! Raw per-task results live under `data/{model}/{base|cot}/` in the results
//! store, one JSON file per task-run. Each cot record is paired with a base
//! record by task suffix (not by exact chain name: base tasks are evaluated
//! once and shared across chain configs), and the leaderboard reports the
//! maximum absolute and relative delta per task across all matched pairs.
//! The max-not-mean policy is inherited scoring behavior: the leaderboard
//! ranks a model by its best-performing cot run per task.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::AggregateError;

/// Which partition of the results store a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subfolder {
    Base,
    Cot,
}

/// One task-evaluation outcome from a raw result file.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    /// Run label, e.g. `alpha-run-1000_logiqa_cot`.
    pub alias: String,
    /// Metric fields as found in the file.
    pub metrics: serde_json::Map<String, serde_json::Value>,
    pub subfolder: Subfolder,
}

/// Model identity block of a leaderboard record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_dtype: String,
    pub model_sha: String,
    pub model_name: String,
}

/// Best observed deltas for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskDelta {
    /// Maximum of (acc_cot - acc_base) over all matched pairs.
    pub delta_abs: f64,
    /// Maximum of (acc_cot - acc_base) / acc_base over all matched pairs.
    pub delta_rel: f64,
}

/// Aggregated leaderboard output for one model; overwrites the previous
/// record on each aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub config: ModelConfig,
    pub results: BTreeMap<String, TaskDelta>,
}

/// Extract an accuracy value, preferring `acc` and falling back to
/// `acc,none` (the two field names the evaluation harness emits).
pub fn extract_accuracy(metrics: &serde_json::Map<String, serde_json::Value>) -> Option<f64> {
    metrics
        .get("acc")
        .or_else(|| metrics.get("acc,none"))
        .and_then(|v| v.as_f64())
}

/// Infer the task of an alias: the first configured task that appears as a
/// whole underscore-delimited token.
pub fn infer_task<'a>(alias: &str, tasks: &'a [String]) -> Option<&'a str> {
    let tokens: Vec<&str> = alias.split('_').collect();
    tasks
        .iter()
        .find(|t| tokens.contains(&t.as_str()))
        .map(|t| t.as_str())
}

/// Load every `results*.json` record under `data/{model}/{base,cot}/`.
pub fn load_raw_results(
    results_dir: &Path,
    model: &str,
) -> Result<Vec<ResultRecord>, AggregateError> {
    let mut records = Vec::new();

    for (subfolder, name) in [(Subfolder::Base, "base"), (Subfolder::Cot, "cot")] {
        let root = results_dir.join("data").join(model).join(name);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let file_name = entry.file_name().to_string_lossy();
            if !file_name.starts_with("results") || !file_name.ends_with(".json") {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())?;
            let data: serde_json::Value = serde_json::from_str(&content)?;
            let Some(results) = data.get("results").and_then(|r| r.as_object()) else {
                continue;
            };
            for (alias, value) in results {
                let metrics = value.as_object().cloned().unwrap_or_default();
                records.push(ResultRecord {
                    alias: alias.clone(),
                    metrics,
                    subfolder,
                });
            }
        }
    }

    Ok(records)
}

/// Compute the leaderboard record for one model.
///
/// Each cot record is matched with the first base record whose alias ends in
/// `_{task}_base` for the inferred task. Records with no inferable task, no
/// base counterpart or no accuracy field are skipped with a warning. A
/// configured task that accumulates zero deltas is fatal for the record:
/// the max over an empty list must never silently become 0 or NaN.
pub fn compute(
    raw_results: &[ResultRecord],
    tasks: &[String],
    config: ModelConfig,
) -> Result<LeaderboardRecord, AggregateError> {
    if tasks.is_empty() {
        return Err(AggregateError::NoTasks);
    }

    let base_records: Vec<&ResultRecord> = raw_results
        .iter()
        .filter(|r| r.subfolder == Subfolder::Base)
        .collect();

    let mut deltas: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut rates: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for record_cot in raw_results.iter().filter(|r| r.subfolder == Subfolder::Cot) {
        let Some(current_task) = infer_task(&record_cot.alias, tasks) else {
            tracing::warn!(alias = %record_cot.alias, "No configured task matches alias. Skipping this cot eval record");
            continue;
        };

        // The base record need not share the cot record's chain config,
        // only its task suffix; base tasks are evaluated once per task.
        let suffix = format!("_{}_base", current_task);
        let Some(record_base) = base_records.iter().find(|r| r.alias.ends_with(&suffix)) else {
            tracing::warn!(
                alias = %record_cot.alias,
                "Could not find corresponding base record. Skipping this cot eval record"
            );
            continue;
        };

        let Some(acc_base) = extract_accuracy(&record_base.metrics) else {
            tracing::warn!(alias = %record_base.alias, "Could not find acc for base record");
            continue;
        };
        let Some(acc_cot) = extract_accuracy(&record_cot.metrics) else {
            tracing::warn!(alias = %record_cot.alias, "Could not find acc for cot record");
            continue;
        };

        deltas
            .entry(current_task)
            .or_default()
            .push(acc_cot - acc_base);
        rates
            .entry(current_task)
            .or_default()
            .push((acc_cot - acc_base) / acc_base);
    }

    let mut results = BTreeMap::new();
    for task in tasks {
        let task_deltas = deltas.get(task.as_str()).filter(|d| !d.is_empty()).ok_or(
            AggregateError::EmptyTaskList { task: task.clone() },
        )?;
        let task_rates = &rates[task.as_str()];

        let delta_abs = task_deltas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let delta_rel = task_rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        results.insert(task.clone(), TaskDelta { delta_abs, delta_rel });
    }

    Ok(LeaderboardRecord { config, results })
}

/// Destination of the leaderboard record inside the leaderboard repo.
pub fn leaderboard_destination(model: &str) -> String {
    format!("{}/results_leaderboard.json", model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(alias: &str, acc_field: &str, acc: f64, subfolder: Subfolder) -> ResultRecord {
        let mut metrics = serde_json::Map::new();
        metrics.insert(acc_field.to_string(), serde_json::json!(acc));
        ResultRecord {
            alias: alias.to_string(),
            metrics,
            subfolder,
        }
    }

    fn config() -> ModelConfig {
        ModelConfig {
            model_dtype: "bfloat16".to_string(),
            model_sha: "main".to_string(),
            model_name: "org/model-7b".to_string(),
        }
    }

    fn tasks(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_accuracy_prefers_acc() {
        let mut metrics = serde_json::Map::new();
        metrics.insert("acc".to_string(), serde_json::json!(0.7));
        metrics.insert("acc,none".to_string(), serde_json::json!(0.2));
        assert_eq!(extract_accuracy(&metrics), Some(0.7));

        metrics.remove("acc");
        assert_eq!(extract_accuracy(&metrics), Some(0.2));

        metrics.remove("acc,none");
        assert_eq!(extract_accuracy(&metrics), None);
    }

    #[test]
    fn test_infer_task_by_token() {
        let tasks = tasks(&["logiqa", "lsat-ar"]);
        assert_eq!(infer_task("alpha-1000_logiqa_cot", &tasks), Some("logiqa"));
        assert_eq!(infer_task("alpha-1000_lsat-ar_cot", &tasks), Some("lsat-ar"));
        // "logiqa2" is not the token "logiqa"
        assert_eq!(infer_task("alpha-1000_logiqa2_cot", &tasks), None);
    }

    #[test]
    fn test_compute_selects_maximum_delta() {
        let raw = vec![
            record("cfg_logiqa_base", "acc", 0.4, Subfolder::Base),
            record("run-a_logiqa_cot", "acc", 0.5, Subfolder::Cot), // +0.1
            record("run-b_logiqa_cot", "acc", 0.35, Subfolder::Cot), // -0.05
            record("run-c_logiqa_cot", "acc", 0.6, Subfolder::Cot), // +0.2
        ];

        let lb = compute(&raw, &tasks(&["logiqa"]), config()).unwrap();
        let delta = lb.results["logiqa"];
        assert!((delta.delta_abs - 0.2).abs() < 1e-12);
        assert!((delta.delta_rel - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_base_match_by_task_suffix_not_chain_name() {
        let raw = vec![
            record("beta_logiqa_base", "acc", 0.4, Subfolder::Base),
            record("alpha_logiqa_cot", "acc", 0.5, Subfolder::Cot),
        ];

        let lb = compute(&raw, &tasks(&["logiqa"]), config()).unwrap();
        assert!((lb.results["logiqa"].delta_abs - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_empty_task_guard() {
        let raw = vec![
            record("cfg_logiqa_base", "acc", 0.4, Subfolder::Base),
            record("cfg_logiqa_cot", "acc", 0.5, Subfolder::Cot),
        ];

        let err = compute(&raw, &tasks(&["logiqa", "lsat-ar"]), config()).unwrap_err();
        match err {
            AggregateError::EmptyTaskList { task } => assert_eq!(task, "lsat-ar"),
            other => panic!("expected EmptyTaskList, got {other:?}"),
        }
    }

    #[test]
    fn test_records_without_accuracy_are_skipped() {
        let raw = vec![
            record("cfg_logiqa_base", "acc", 0.4, Subfolder::Base),
            record("bad_logiqa_cot", "f1", 0.9, Subfolder::Cot),
            record("good_logiqa_cot", "acc,none", 0.45, Subfolder::Cot),
        ];

        let lb = compute(&raw, &tasks(&["logiqa"]), config()).unwrap();
        // Only the record with a recognized accuracy field contributes.
        assert!((lb.results["logiqa"].delta_abs - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_load_raw_results_partitions_by_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("data/org/model-7b/base/run1");
        let cot_dir = dir.path().join("data/org/model-7b/cot/run1");
        std::fs::create_dir_all(&base_dir).unwrap();
        std::fs::create_dir_all(&cot_dir).unwrap();
        std::fs::write(
            base_dir.join("results_2024-01-01.json"),
            serde_json::json!({"results": {"cfg_logiqa_base": {"acc": 0.4}}}).to_string(),
        )
        .unwrap();
        std::fs::write(
            cot_dir.join("results_2024-01-02.json"),
            serde_json::json!({"results": {"cfg_logiqa_cot": {"acc": 0.5}}}).to_string(),
        )
        .unwrap();
        // not a results file
        std::fs::write(cot_dir.join("config.json"), "{}").unwrap();

        let records = load_raw_results(dir.path(), "org/model-7b").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records.iter().filter(|r| r.subfolder == Subfolder::Cot).count(),
            1
        );
    }

    #[test]
    fn test_leaderboard_record_shape() {
        let raw = vec![
            record("cfg_logiqa_base", "acc", 0.4, Subfolder::Base),
            record("cfg_logiqa_cot", "acc", 0.5, Subfolder::Cot),
        ];
        let lb = compute(&raw, &tasks(&["logiqa"]), config()).unwrap();
        let json = serde_json::to_value(&lb).unwrap();

        assert_eq!(json["config"]["model_name"], "org/model-7b");
        assert_eq!(json["config"]["model_dtype"], "bfloat16");
        assert!(json["results"]["logiqa"]["delta_abs"].is_f64());
        assert!(json["results"]["logiqa"]["delta_rel"].is_f64());
    }
}
