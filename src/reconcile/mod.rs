//! Cross-dataset reconciliation for the traces store.
//!
//! The cot-eval pipeline runs in three steps: create and upload traces,
//! evaluate the model, upload eval results. When step two fails, the traces
//! store keeps config partitions no result ever refers to. This module
//! audits the traces manifest and its data directories against the config
//! names found in the raw-results store, and optionally repairs the drift:
//!
//! - `unused`: declared configs no result record refers to (deletable)
//! - `missing`: result configs with no trace partition (logged, never
//!   auto-created)
//! - `orphan_manifest`: declared configs without a data directory (defect)
//! - `orphan_dir`: data directories without a declared config (defect,
//!   deletable)
//!
//! Repair bundles the manifest rewrite and all directory deletions into one
//! atomic commit. A partial cleanup (manifest edited but directories
//! retained, or vice versa) would hide real drift, so both closure
//! invariants are re-checked immediately before the commit and any failure
//! aborts with the store untouched.

pub mod manifest;
pub mod matching;

pub use manifest::{ConfigEntry, ManifestMetadata, TracesManifest};
pub use matching::{matches_record, variant};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::ReconcileError;
use crate::store::{CommitOperation, DatasetStore};

/// A named unit of chain-run work, extracted from the results dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRecord {
    /// Chain-run identifier (the result alias minus its `_cot` suffix).
    pub name: String,
    /// Result file the record was extracted from.
    pub path: PathBuf,
}

impl ConfigRecord {
    /// Hyphenated form of the name, as the traces store writes it.
    pub fn variant(&self) -> String {
        variant(&self.name)
    }
}

/// Result of scanning the raw-results snapshot for chain-run configs.
#[derive(Debug, Default)]
pub struct CotConfigScan {
    pub records: Vec<ConfigRecord>,
    /// Aliases with a suffix other than `_cot`, `_base` or `_orig`.
    pub unknown_aliases: Vec<String>,
}

/// Extract cot chain-run configs from every result file under `results_dir`.
///
/// Aliases ending in `_base` and `_orig` belong to reference runs and are
/// skipped; any other unrecognized suffix is recorded and logged.
pub fn collect_cot_configs(results_dir: &Path) -> Result<CotConfigScan, ReconcileError> {
    let mut scan = CotConfigScan::default();

    for entry in WalkDir::new(results_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = std::fs::read_to_string(entry.path())?;
        let data: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unparseable result file");
                continue;
            }
        };
        let Some(results) = data.get("results").and_then(|r| r.as_object()) else {
            continue;
        };
        for value in results.values() {
            let Some(alias) = value.get("alias").and_then(|a| a.as_str()) else {
                continue;
            };
            if let Some(name) = alias.strip_suffix("_cot") {
                scan.records.push(ConfigRecord {
                    name: name.to_string(),
                    path: entry.path().to_path_buf(),
                });
            } else if alias.ends_with("_base") || alias.ends_with("_orig") {
                continue;
            } else {
                tracing::debug!(alias, "Unknown alias suffix, ignoring entry");
                scan.unknown_aliases.push(alias.to_string());
            }
        }
    }

    Ok(scan)
}

/// Top-level data directories of a traces snapshot.
pub fn list_data_dirs(traces_dir: &Path) -> Result<Vec<String>, ReconcileError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(traces_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Severity of an audit, worst finding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    /// Manifest, directories and results all agree.
    Clean,
    /// Unused or missing configs; repairable or informational.
    Drift,
    /// Manifest and data directories disagree with each other.
    Defect,
}

/// Findings of a read-only audit run.
#[derive(Debug, Default, Clone)]
pub struct AuditReport {
    /// Declared configs matching no chain-run record.
    pub unused: Vec<String>,
    /// Chain-run records with no declared config.
    pub missing: Vec<String>,
    /// Declared configs without a backing data directory.
    pub orphan_manifest: Vec<String>,
    /// Data directories without a declared config.
    pub orphan_dir: Vec<String>,
    /// Number of declared configs at audit time.
    pub total_declared: usize,
}

impl AuditReport {
    pub fn severity(&self) -> AuditSeverity {
        if !self.orphan_manifest.is_empty() || !self.orphan_dir.is_empty() {
            AuditSeverity::Defect
        } else if !self.unused.is_empty() || !self.missing.is_empty() {
            AuditSeverity::Drift
        } else {
            AuditSeverity::Clean
        }
    }

    /// Log a severity-ordered summary of the findings.
    pub fn log_summary(&self) {
        if !self.orphan_manifest.is_empty() {
            tracing::warn!(
                count = self.orphan_manifest.len(),
                "🛑 Found traces configs without data directory, traces dataset is defect"
            );
        }
        if !self.orphan_dir.is_empty() {
            tracing::warn!(
                count = self.orphan_dir.len(),
                "🛑 Found data directories without config, traces dataset is defect"
            );
        }
        if !self.missing.is_empty() {
            tracing::warn!(count = self.missing.len(), "⚠️  Found missing traces configs");
        }
        tracing::info!(
            unused = self.unused.len(),
            declared = self.total_declared,
            "Found {} unused traces configs of {}",
            self.unused.len(),
            self.total_declared
        );
        if self.severity() == AuditSeverity::Clean {
            tracing::info!("✅ Traces dataset is consistent with results dataset");
        }
    }
}

/// Compute set-differences between the three config name-spaces.
///
/// Read-only; never fails. Matching accepts a record's exact name or its
/// hyphenated variant.
pub fn audit(
    cot_configs: &[ConfigRecord],
    declared_configs: &[String],
    data_dirs: &[String],
) -> AuditReport {
    let unused = declared_configs
        .iter()
        .filter(|declared| !cot_configs.iter().any(|r| matches_record(declared, &r.name)))
        .cloned()
        .collect();

    let missing = cot_configs
        .iter()
        .filter(|r| !declared_configs.iter().any(|d| matches_record(d, &r.name)))
        .map(|r| r.name.clone())
        .collect();

    let orphan_manifest = declared_configs
        .iter()
        .filter(|d| !data_dirs.contains(d))
        .cloned()
        .collect();

    let orphan_dir = data_dirs
        .iter()
        .filter(|d| !declared_configs.contains(d))
        .cloned()
        .collect();

    AuditReport {
        unused,
        missing,
        orphan_manifest,
        orphan_dir,
        total_declared: declared_configs.len(),
    }
}

/// Result of a repair call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairResult {
    /// `do_cleanup` was not set; nothing was changed.
    Skipped,
    /// Cleanup ran; counts of removed manifest configs and deleted
    /// directories.
    Repaired {
        removed_configs: usize,
        removed_dirs: usize,
    },
}

/// Audits and repairs the traces dataset against the results dataset.
pub struct TraceReconciler {
    store: Arc<dyn DatasetStore>,
    traces_repo: String,
}

impl TraceReconciler {
    pub fn new(store: Arc<dyn DatasetStore>, traces_repo: impl Into<String>) -> Self {
        Self {
            store,
            traces_repo: traces_repo.into(),
        }
    }

    /// Remove unused configs and orphan directories from the traces store.
    ///
    /// No-op unless `do_cleanup` is set. Re-validates both closure
    /// invariants on the post-removal manifest and aborts with
    /// [`ReconcileError::InconsistentState`] before any store mutation if
    /// either fails. On success the updated manifest and all directory
    /// deletions land as one atomic commit, `manifest` is updated in place,
    /// and the counts are returned.
    pub async fn repair(
        &self,
        report: &AuditReport,
        manifest: &mut TracesManifest,
        cot_configs: &[ConfigRecord],
        do_cleanup: bool,
        create_pr: bool,
    ) -> Result<RepairResult, ReconcileError> {
        if !do_cleanup {
            tracing::info!("Check completed. To cleanup the dataset, pass --do-cleanup");
            return Ok(RepairResult::Skipped);
        }

        if report.unused.is_empty() && report.orphan_dir.is_empty() {
            tracing::info!("Nothing to clean up");
            return Ok(RepairResult::Repaired {
                removed_configs: 0,
                removed_dirs: 0,
            });
        }

        // Apply removals to a scratch copy; the caller's manifest and the
        // store stay untouched until both invariants hold.
        let mut updated = manifest.clone();
        for unused in &report.unused {
            updated.remove_config(unused);
        }

        let remaining = updated.config_names();
        if let Some(stray) = remaining
            .iter()
            .find(|d| !cot_configs.iter().any(|r| matches_record(d, &r.name)))
        {
            return Err(ReconcileError::InconsistentState(format!(
                "declared config '{}' matches no result record after cleanup",
                stray
            )));
        }
        if let Some(unmatched) = cot_configs
            .iter()
            .find(|r| !remaining.iter().any(|d| matches_record(d, &r.name)))
        {
            return Err(ReconcileError::InconsistentState(format!(
                "result record '{}' matches no declared config after cleanup",
                unmatched.name
            )));
        }

        let mut operations = Vec::new();
        if !report.unused.is_empty() {
            operations.push(CommitOperation::add(
                "README.md",
                updated.render()?.into_bytes(),
            ));
        }
        let mut removed_dirs = 0usize;
        for dir in report.unused.iter().chain(report.orphan_dir.iter()) {
            operations.push(CommitOperation::delete_folder(format!("{}/", dir)));
            removed_dirs += 1;
        }

        self.store
            .create_commit(
                &self.traces_repo,
                &operations,
                "Cleanup traces (delete unused traces)",
                create_pr,
            )
            .await?;

        tracing::info!(
            removed_configs = report.unused.len(),
            removed_dirs,
            repo = %self.traces_repo,
            "Cleaned up unused traces configs"
        );

        *manifest = updated;
        Ok(RepairResult::Repaired {
            removed_configs: report.unused.len(),
            removed_dirs,
        })
    }
}
