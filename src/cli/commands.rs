//! CLI command definitions for cot-eval.
//!
//! Each subcommand maps to one stage of the evaluation pipeline: `claim`
//! picks the next pending request and marks it RUNNING, `upload-results`
//! pushes raw results, recomputes the leaderboard record and marks the
//! request FINISHED, `audit-traces` reconciles the traces dataset against
//! the results dataset, `merge-prs` lands pull requests opened by
//! `--create-pr` runs, and `make-configs` / `make-tasks` prepare a run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{generate_configs, CotEvalConfig, GenerateParams};
use crate::harness::{build_harness_tasks, write_harness_tasks};
use crate::leaderboard::{self, ModelConfig};
use crate::lifecycle::JobLifecycle;
use crate::prs;
use crate::publish::{PublishArtifact, PublishOutcome, RetryingPublisher};
use crate::reconcile::{self, TraceReconciler, TracesManifest};
use crate::requests::{load_requests, RequestStatus};
use crate::store::{DatasetStore, HfDatasetStore, HfStoreConfig};

/// Default dataset repos of the cot-leaderboard org.
const DEFAULT_REQUESTS_REPO: &str = "cot-leaderboard/cot-leaderboard-requests";
const DEFAULT_RESULTS_REPO: &str = "cot-leaderboard/cot-eval-results";
const DEFAULT_LEADERBOARD_REPO: &str = "cot-leaderboard/cot-leaderboard-results";
const DEFAULT_TRACES_REPO: &str = "cot-leaderboard/cot-eval-traces";
const DEFAULT_TRACES_DATASET: &str = "cot-leaderboard/cot-eval-traces-2.0";

/// Default local snapshot cache.
const DEFAULT_TMP_DIR: &str = "./TMP";

/// Chain-of-thought evaluation pipeline coordinator.
#[derive(Parser)]
#[command(name = "cot-eval")]
#[command(about = "Coordinate COT evaluation jobs, trace datasets and leaderboard aggregation")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Claim the next pending evaluation request and mark it RUNNING.
    Claim(ClaimArgs),

    /// Upload raw results, update the leaderboard and finish the request.
    UploadResults(UploadResultsArgs),

    /// Audit the traces dataset against the results dataset; optionally clean up.
    AuditTraces(AuditTracesArgs),

    /// List open pull requests on a dataset repo; optionally merge them.
    MergePrs(MergePrsArgs),

    /// Create chain-run config files for a model.
    MakeConfigs(MakeConfigsArgs),

    /// Create evaluation-harness task files from chain-run configs.
    MakeTasks(MakeTasksArgs),
}

/// Arguments for `cot-eval claim`.
#[derive(Parser, Debug)]
pub struct ClaimArgs {
    /// Claim this specific model instead of the FIFO pick.
    #[arg(long)]
    pub model_id: Option<String>,

    /// Skip requests above this size (billions of parameters).
    #[arg(long)]
    pub max_params: Option<f64>,

    /// File to write the claimed model keys to (JSON).
    #[arg(long)]
    pub keys_file: PathBuf,

    /// Request-queue dataset repo.
    #[arg(long, default_value = DEFAULT_REQUESTS_REPO)]
    pub requests_repo: String,

    /// Open status updates as pull requests instead of direct commits.
    #[arg(long)]
    pub create_pr: bool,

    /// Local snapshot cache directory.
    #[arg(long, default_value = DEFAULT_TMP_DIR)]
    pub tmp_dir: PathBuf,

    /// Read/write token for the dataset stores.
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    pub hf_token: String,
}

/// Arguments for `cot-eval upload-results`.
#[derive(Parser, Debug)]
pub struct UploadResultsArgs {
    /// Model the results belong to.
    #[arg(long)]
    pub model: String,

    /// Model revision (commit).
    #[arg(long, default_value = "main")]
    pub revision: String,

    /// Model precision (float16, bfloat16, ...).
    #[arg(long, default_value = "")]
    pub precision: String,

    /// Comma-separated task list to aggregate over.
    #[arg(long)]
    pub tasks: String,

    /// Directory holding the harness output for this model.
    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_REQUESTS_REPO)]
    pub requests_repo: String,

    #[arg(long, default_value = DEFAULT_RESULTS_REPO)]
    pub results_repo: String,

    #[arg(long, default_value = DEFAULT_LEADERBOARD_REPO)]
    pub leaderboard_repo: String,

    /// Open uploads as pull requests instead of direct commits.
    #[arg(long)]
    pub create_pr: bool,

    /// Local snapshot cache directory.
    #[arg(long, default_value = DEFAULT_TMP_DIR)]
    pub tmp_dir: PathBuf,

    /// Read/write token for the dataset stores.
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    pub hf_token: String,
}

/// Arguments for `cot-eval audit-traces`.
#[derive(Parser, Debug)]
pub struct AuditTracesArgs {
    #[arg(long, default_value = DEFAULT_RESULTS_REPO)]
    pub results_repo: String,

    #[arg(long, default_value = DEFAULT_TRACES_REPO)]
    pub traces_repo: String,

    /// Actually remove unused configs and orphan directories.
    /// Without this flag the audit is read-only.
    #[arg(long)]
    pub do_cleanup: bool,

    /// Open the cleanup commit as a pull request.
    #[arg(long)]
    pub create_pr: bool,

    /// Read/write token for the dataset stores.
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    pub hf_token: String,
}

/// Arguments for `cot-eval merge-prs`.
#[derive(Parser, Debug)]
pub struct MergePrsArgs {
    /// Dataset repo to merge pull requests on.
    #[arg(long, default_value = DEFAULT_RESULTS_REPO)]
    pub repo: String,

    /// Only merge PRs whose title contains this keyword (e.g. a model id).
    #[arg(long)]
    pub keyword: Option<String>,

    /// Actually merge the matched PRs.
    /// Without this flag the command only lists them.
    #[arg(long)]
    pub do_merge: bool,

    /// Read/write token for the dataset stores.
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    pub hf_token: String,
}

/// Arguments for `cot-eval make-configs`.
#[derive(Parser, Debug)]
pub struct MakeConfigsArgs {
    #[arg(long)]
    pub model: String,

    #[arg(long)]
    pub revision: String,

    #[arg(long, default_value = "auto")]
    pub precision: String,

    /// Comma-separated chain names.
    #[arg(long)]
    pub chains: String,

    /// Model kwargs variations as inline YAML (a sequence of mappings).
    #[arg(long, default_value = "[{}]")]
    pub model_kwargs: String,

    /// Comma-separated task list.
    #[arg(long)]
    pub tasks: String,

    #[arg(long)]
    pub output_dir: PathBuf,

    /// Template config; defaults to template.yaml in the output dir.
    #[arg(long)]
    pub template_path: Option<PathBuf>,

    /// File to write the created config names to (comma-separated).
    #[arg(long)]
    pub keys_file: PathBuf,
}

/// Arguments for `cot-eval make-tasks`.
#[derive(Parser, Debug)]
pub struct MakeTasksArgs {
    #[arg(long)]
    pub model: String,

    /// Comma-separated config names to build tasks for.
    #[arg(long)]
    pub configs: String,

    /// Directory holding the config YAML files.
    #[arg(long)]
    pub configs_dir: PathBuf,

    /// Traces dataset the harness tasks read from.
    #[arg(long, default_value = DEFAULT_TRACES_DATASET)]
    pub traces_dataset: String,

    #[arg(long)]
    pub output_dir: PathBuf,

    /// File to write the created task keys to (JSON, split by subtype).
    #[arg(long)]
    pub keys_file: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Claim(args) => run_claim_command(args).await,
        Commands::UploadResults(args) => run_upload_results_command(args).await,
        Commands::AuditTraces(args) => run_audit_traces_command(args).await,
        Commands::MergePrs(args) => run_merge_prs_command(args).await,
        Commands::MakeConfigs(args) => run_make_configs_command(args),
        Commands::MakeTasks(args) => run_make_tasks_command(args),
    }
}

fn open_store(token: &str) -> anyhow::Result<Arc<dyn DatasetStore>> {
    let store = HfDatasetStore::new(HfStoreConfig::new(token))?;
    Ok(Arc::new(store))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn run_claim_command(args: ClaimArgs) -> anyhow::Result<()> {
    let store = open_store(&args.hf_token)?;
    let local_dir = args.tmp_dir.join("requests");
    store.snapshot(&args.requests_repo, &local_dir).await?;

    let pending = load_requests(&local_dir, &[RequestStatus::Pending])?;
    let claimed =
        JobLifecycle::claim_next(&pending, args.max_params, args.model_id.as_deref())?.clone();
    info!(model = %claimed.model, "Claiming eval request");

    let publisher = RetryingPublisher::new(store, &args.requests_repo, args.create_pr);
    let lifecycle = JobLifecycle::new(publisher);
    lifecycle
        .advance(&claimed, RequestStatus::Running, &local_dir)
        .await?;

    let keys = serde_json::json!({
        "model": claimed.model,
        "revision": claimed.revision,
        "precision": claimed.precision,
    });
    std::fs::write(&args.keys_file, serde_json::to_string(&keys)?)?;
    info!(keys_file = %args.keys_file.display(), "Wrote claimed model keys");
    Ok(())
}

async fn run_upload_results_command(args: UploadResultsArgs) -> anyhow::Result<()> {
    let tasks = split_csv(&args.tasks);
    if tasks.is_empty() {
        anyhow::bail!("No tasks specified");
    }
    if !args.output_dir.is_dir() {
        anyhow::bail!("output_dir is not a directory: {}", args.output_dir.display());
    }
    info!(?tasks, model = %args.model, "Uploading results");

    let store = open_store(&args.hf_token)?;
    let results_cache = args.tmp_dir.join("results");
    store.snapshot(&args.results_repo, &results_cache).await?;

    // Push every new raw result file for this model, mirroring it into the
    // local snapshot so aggregation sees files the store already had and
    // files uploaded just now alike.
    let results_publisher =
        RetryingPublisher::new(store.clone(), &args.results_repo, args.create_pr);
    let model_output = args.output_dir.join(&args.model);
    let mut found = 0usize;
    for entry in WalkDir::new(&model_output)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if !name.starts_with("results") || !name.ends_with(".json") {
            continue;
        }
        found += 1;

        let relative = entry
            .path()
            .strip_prefix(&args.output_dir)
            .unwrap_or(entry.path());
        let path_in_repo = Path::new("data").join(relative);
        let path_in_repo = path_in_repo.to_string_lossy().to_string();

        let content = std::fs::read(entry.path())?;
        let cached = results_cache.join(&path_in_repo);
        if let Some(parent) = cached.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&cached, &content)?;

        let outcome = results_publisher
            .publish(&PublishArtifact::new(
                path_in_repo.clone(),
                content,
                format!("Upload results for model {}", args.model),
            ))
            .await?;
        if outcome == PublishOutcome::Committed {
            info!(path = %path_in_repo, "Uploaded result file");
        }
    }
    if found == 0 {
        anyhow::bail!(
            "No result files found for model {} under {}",
            args.model,
            args.output_dir.display()
        );
    }
    info!(count = found, model = %args.model, "Processed result files");

    // Aggregate and overwrite the leaderboard record.
    let raw = leaderboard::load_raw_results(&results_cache, &args.model)?;
    let record = leaderboard::compute(
        &raw,
        &tasks,
        ModelConfig {
            model_dtype: args.precision.clone(),
            model_sha: args.revision.clone(),
            model_name: args.model.clone(),
        },
    )?;

    let lb_publisher =
        RetryingPublisher::new(store.clone(), &args.leaderboard_repo, args.create_pr);
    lb_publisher
        .publish_overwrite(&PublishArtifact::new(
            leaderboard::leaderboard_destination(&args.model),
            serde_json::to_vec_pretty(&record)?,
            format!("Update leaderboard for model {}", args.model),
        ))
        .await?;
    info!(model = %args.model, "Uploaded leaderboard record");

    // Mark the running request for this model as finished.
    let requests_cache = args.tmp_dir.join("requests");
    store.snapshot(&args.requests_repo, &requests_cache).await?;
    let running = load_requests(&requests_cache, &[RequestStatus::Running])?;
    match running.iter().find(|r| r.model == args.model) {
        Some(request) => {
            let publisher =
                RetryingPublisher::new(store, &args.requests_repo, args.create_pr);
            let lifecycle = JobLifecycle::new(publisher);
            lifecycle
                .advance(request, RequestStatus::Finished, &requests_cache)
                .await?;
            info!(model = %args.model, "Updated eval request status to FINISHED");
        }
        None => {
            warn!(model = %args.model, "No running evaluation request found for model");
        }
    }

    Ok(())
}

async fn run_audit_traces_command(args: AuditTracesArgs) -> anyhow::Result<()> {
    let store = open_store(&args.hf_token)?;

    let results_dir = tempfile::tempdir()?;
    store.snapshot(&args.results_repo, results_dir.path()).await?;
    let scan = reconcile::collect_cot_configs(results_dir.path())?;
    info!(count = scan.records.len(), "Found cot configs");
    info!(count = scan.unknown_aliases.len(), "Found unknown aliases");

    let traces_dir = tempfile::tempdir()?;
    store.snapshot(&args.traces_repo, traces_dir.path()).await?;
    let mut manifest = TracesManifest::from_file(&traces_dir.path().join("README.md"))?;
    let data_dirs = reconcile::list_data_dirs(traces_dir.path())?;

    let report = reconcile::audit(&scan.records, &manifest.config_names(), &data_dirs);
    report.log_summary();

    let reconciler = TraceReconciler::new(store, &args.traces_repo);
    reconciler
        .repair(
            &report,
            &mut manifest,
            &scan.records,
            args.do_cleanup,
            args.create_pr,
        )
        .await?;

    Ok(())
}

async fn run_merge_prs_command(args: MergePrsArgs) -> anyhow::Result<()> {
    let store = open_store(&args.hf_token)?;
    let summary = prs::merge_open_prs(
        store.as_ref(),
        &args.repo,
        args.keyword.as_deref(),
        args.do_merge,
    )
    .await?;
    if summary.matched.is_empty() {
        info!(repo = %args.repo, "No open pull requests matched");
    }
    Ok(())
}

fn run_make_configs_command(args: MakeConfigsArgs) -> anyhow::Result<()> {
    let model_kwargs: Vec<serde_yaml::Mapping> = serde_yaml::from_str(&args.model_kwargs)?;

    let params = GenerateParams {
        model: args.model,
        revision: args.revision,
        precision: args.precision,
        chains: split_csv(&args.chains),
        model_kwargs,
        tasks: split_csv(&args.tasks),
        output_dir: args.output_dir,
        template_path: args.template_path,
    };
    let created = generate_configs(&params)?;

    std::fs::write(&args.keys_file, created.join(","))?;
    info!(keys_file = %args.keys_file.display(), "Wrote config keys");
    Ok(())
}

fn run_make_tasks_command(args: MakeTasksArgs) -> anyhow::Result<()> {
    let mut configs = Vec::new();
    for key in split_csv(&args.configs) {
        let path = args.configs_dir.join(format!("{}.yaml", key));
        configs.push(CotEvalConfig::from_yaml(&path)?);
    }
    if configs.is_empty() {
        anyhow::bail!("No configs specified");
    }

    let (harness_tasks, keys) =
        build_harness_tasks(&args.model, &configs, &args.traces_dataset);
    write_harness_tasks(&args.output_dir, &harness_tasks)?;

    let keys_json = serde_json::json!({
        "base": keys.base.join(","),
        "cot": keys.cot.join(","),
    });
    std::fs::write(&args.keys_file, serde_json::to_string(&keys_json)?)?;
    info!(keys_file = %args.keys_file.display(), "Wrote harness task keys");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_claim_defaults() {
        let cli = Cli::try_parse_from([
            "cot-eval",
            "claim",
            "--keys-file",
            "./keys.json",
            "--hf-token",
            "hf_test",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Claim(args) => {
                assert_eq!(args.requests_repo, DEFAULT_REQUESTS_REPO);
                assert!(args.model_id.is_none());
                assert!(args.max_params.is_none());
                assert!(!args.create_pr);
            }
            _ => panic!("Expected Claim command"),
        }
    }

    #[test]
    fn test_audit_traces_cleanup_gate() {
        let cli = Cli::try_parse_from([
            "cot-eval",
            "audit-traces",
            "--do-cleanup",
            "--create-pr",
            "--hf-token",
            "hf_test",
        ])
        .expect("should parse");

        match cli.command {
            Commands::AuditTraces(args) => {
                assert!(args.do_cleanup);
                assert!(args.create_pr);
                assert_eq!(args.traces_repo, DEFAULT_TRACES_REPO);
            }
            _ => panic!("Expected AuditTraces command"),
        }
    }

    #[test]
    fn test_merge_prs_merge_gate() {
        let cli = Cli::try_parse_from([
            "cot-eval",
            "merge-prs",
            "--keyword",
            "org/model-7b",
            "--hf-token",
            "hf_test",
        ])
        .expect("should parse");

        match cli.command {
            Commands::MergePrs(args) => {
                assert_eq!(args.repo, DEFAULT_RESULTS_REPO);
                assert_eq!(args.keyword.as_deref(), Some("org/model-7b"));
                assert!(!args.do_merge);
            }
            _ => panic!("Expected MergePrs command"),
        }
    }

    #[test]
    fn test_upload_results_requires_model_and_tasks() {
        let result = Cli::try_parse_from(["cot-eval", "upload-results", "--hf-token", "t"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv("a,b, c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv(""), Vec::<String>::new());
    }
}
