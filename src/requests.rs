//! Evaluation request records.
//!
//! Requests live as one JSON file per job in the request-queue dataset. They
//! are created by an external submission process and never deleted; the
//! pipeline only rewrites their `status` field. Optional fields carry
//! explicit defaults so missing upstream data is visible in one place
//! instead of being silently filled in at call sites.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::LifecycleError;

/// Lifecycle status of an evaluation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequestStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl RequestStatus {
    /// Canonical uppercase form used in request files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Running => "RUNNING",
            RequestStatus::Finished => "FINISHED",
            RequestStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "RUNNING" => Ok(RequestStatus::Running),
            "FINISHED" => Ok(RequestStatus::Finished),
            "FAILED" => Ok(RequestStatus::Failed),
            other => Err(LifecycleError::UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse().map_err(|e: LifecycleError| e.to_string())
    }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        status.as_str().to_string()
    }
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_weight_type() -> String {
    "Original".to_string()
}

/// Sentinel date so requests submitted without a timestamp still order.
fn default_submitted_time() -> String {
    "2022-05-18T11:40:22.519222".to_string()
}

/// One evaluation job, unique per (model, revision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    pub model: String,
    pub status: RequestStatus,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default)]
    pub precision: String,
    /// ISO-8601 timestamp used for FIFO claim ordering.
    #[serde(default = "default_submitted_time")]
    pub submitted_time: String,
    /// Model size in billions of parameters, used for claim filtering.
    #[serde(default)]
    pub params: Option<f64>,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_weight_type")]
    pub weight_type: String,
    /// Base model for adapter weights.
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub license: String,
    /// Local snapshot file this request was read from; status updates are
    /// written back here before publishing.
    #[serde(skip)]
    pub source_path: PathBuf,
}

impl EvalRequest {
    /// Submission instant used for FIFO claim ordering.
    ///
    /// A timestamp that fails to parse sorts as earliest, so a malformed
    /// submission surfaces at the front of the queue instead of hiding
    /// behind well-formed ones.
    pub fn submitted_at(&self) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&self.submitted_time, "%Y-%m-%dT%H:%M:%S%.f")
            .unwrap_or(NaiveDateTime::MIN)
    }
}

/// Load every request under `local_dir` whose status is in `statuses`.
///
/// Scans the snapshot recursively for `*.json` files. Files that fail to
/// parse are logged and skipped so one malformed submission cannot block the
/// whole queue.
pub fn load_requests(
    local_dir: &Path,
    statuses: &[RequestStatus],
) -> Result<Vec<EvalRequest>, LifecycleError> {
    let mut requests = Vec::new();

    for entry in WalkDir::new(local_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = std::fs::read_to_string(entry.path())?;
        let mut request: EvalRequest = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping unparseable request file"
                );
                continue;
            }
        };
        if statuses.contains(&request.status) {
            request.source_path = entry.path().to_path_buf();
            requests.push(request);
        }
    }

    Ok(requests)
}

/// Rewrite the `status` field of a request file in place.
///
/// All other fields, including ones this crate does not model, pass through
/// unchanged.
pub fn rewrite_status(path: &Path, new_status: RequestStatus) -> Result<(), LifecycleError> {
    let content = std::fs::read_to_string(path)?;
    let mut data: serde_json::Value = serde_json::from_str(&content)?;
    data["status"] = serde_json::Value::String(new_status.as_str().to_string());
    std::fs::write(path, serde_json::to_string_pretty(&data)?)?;
    Ok(())
}
