//! Evaluation-harness task generation.
//!
//! For every chain-run config and task, the evaluation harness needs two
//! task definitions: a `cot` run that prepends the reasoning trace and a
//! `base` run without it. Base runs do not depend on the chain config, so a
//! base task for a given task name is emitted at most once per batch; cot
//! records produced later may therefore pair with a base record created
//! under a different chain config (matching is by task suffix).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::CotEvalConfig;
use crate::error::ConfigError;

/// Where the trace parquet for a config/task pair lives in the traces repo.
pub fn trace_data_file(model: &str, config_name: &str, task: &str) -> String {
    format!("data/{}/{}-{}.parquet", model, config_name, task)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFiles {
    pub test: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetKwargs {
    pub data_files: DataFiles,
}

/// One harness task definition, serialized as a YAML file per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessTask {
    /// Task key, `{config}_{task}_{base|cot}`.
    pub task: String,
    /// Traces dataset repo the task reads from.
    pub dataset_path: String,
    pub dataset_kwargs: DatasetKwargs,
    /// Prompt template include, `_logikon_{base|cot}_template_yaml`.
    pub include: String,
}

/// Task keys created in one batch, split by subtype.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HarnessTaskKeys {
    pub base: Vec<String>,
    pub cot: Vec<String>,
}

/// Build harness tasks for every config x task x subtype combination.
///
/// Base tasks are deduplicated by their `_{task}_base` key suffix across the
/// whole batch.
pub fn build_harness_tasks(
    model: &str,
    configs: &[CotEvalConfig],
    traces_dataset: &str,
) -> (Vec<HarnessTask>, HarnessTaskKeys) {
    let mut tasks = Vec::new();
    let mut keys = HarnessTaskKeys::default();

    for config in configs {
        for task in &config.tasks {
            for subtype in ["base", "cot"] {
                if subtype == "base" {
                    let suffix = format!("_{}_{}", task, subtype);
                    if keys.base.iter().any(|k| k.ends_with(&suffix)) {
                        continue;
                    }
                }

                let harness_task = HarnessTask {
                    task: format!("{}_{}_{}", config.name, task, subtype),
                    dataset_path: traces_dataset.to_string(),
                    dataset_kwargs: DatasetKwargs {
                        data_files: DataFiles {
                            test: trace_data_file(model, &config.name, task),
                        },
                    },
                    include: format!("_logikon_{}_template_yaml", subtype),
                };

                match subtype {
                    "base" => keys.base.push(harness_task.task.clone()),
                    _ => keys.cot.push(harness_task.task.clone()),
                }
                tasks.push(harness_task);
            }
        }
    }

    (tasks, keys)
}

/// Write each task as `{task_key}.yaml` under `output_dir`.
pub fn write_harness_tasks(output_dir: &Path, tasks: &[HarnessTask]) -> Result<(), ConfigError> {
    std::fs::create_dir_all(output_dir)?;
    for task in tasks {
        let path = output_dir.join(format!("{}.yaml", task.task));
        std::fs::write(&path, serde_yaml::to_string(task)?)?;
        tracing::debug!(task = %task.task, path = %path.display(), "Created harness task");
    }
    tracing::info!(count = tasks.len(), "Created harness tasks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, tasks: &[&str]) -> CotEvalConfig {
        serde_yaml::from_str(&format!(
            "name: {}\ncot_chain: ReflectBeforeRun\nmodel: org/model-7b\ntasks: [{}]\n",
            name,
            tasks.join(", ")
        ))
        .unwrap()
    }

    #[test]
    fn test_build_creates_base_and_cot_per_task() {
        let configs = vec![config("alpha-1000", &["logiqa", "lsat-ar"])];
        let (tasks, keys) = build_harness_tasks("org/model-7b", &configs, "org/traces");

        assert_eq!(tasks.len(), 4);
        assert_eq!(keys.base, vec!["alpha-1000_logiqa_base", "alpha-1000_lsat-ar_base"]);
        assert_eq!(keys.cot, vec!["alpha-1000_logiqa_cot", "alpha-1000_lsat-ar_cot"]);
    }

    #[test]
    fn test_base_tasks_deduplicated_across_configs() {
        let configs = vec![
            config("alpha-1000", &["logiqa"]),
            config("beta-2000", &["logiqa"]),
        ];
        let (tasks, keys) = build_harness_tasks("org/model-7b", &configs, "org/traces");

        // One shared base task, two cot tasks.
        assert_eq!(keys.base, vec!["alpha-1000_logiqa_base"]);
        assert_eq!(keys.cot, vec!["alpha-1000_logiqa_cot", "beta-2000_logiqa_cot"]);
        assert_eq!(tasks.len(), 3);
    }

    #[test]
    fn test_task_points_at_trace_parquet() {
        let configs = vec![config("alpha-1000", &["logiqa"])];
        let (tasks, _) = build_harness_tasks("org/model-7b", &configs, "org/traces");

        let cot = tasks.iter().find(|t| t.task.ends_with("_cot")).unwrap();
        assert_eq!(
            cot.dataset_kwargs.data_files.test,
            "data/org/model-7b/alpha-1000-logiqa.parquet"
        );
        assert_eq!(cot.include, "_logikon_cot_template_yaml");
    }

    #[test]
    fn test_write_harness_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![config("alpha-1000", &["logiqa"])];
        let (tasks, _) = build_harness_tasks("org/model-7b", &configs, "org/traces");

        write_harness_tasks(dir.path(), &tasks).unwrap();
        assert!(dir.path().join("alpha-1000_logiqa_base.yaml").is_file());
        assert!(dir.path().join("alpha-1000_logiqa_cot.yaml").is_file());
    }
}
