//! Run manifest stored next to a saved safety measure.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::{LearnerConfig, TrainingSummary};

/// Current run manifest schema version.
pub const CURRENT_MANIFEST_VERSION: u32 = 1;
/// File name of the manifest inside a model folder.
pub const MANIFEST_NAME: &str = "run.json";

/// Configuration and outcome of the run that produced a model folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub saved_at_unix_seconds: u64,
    pub config: LearnerConfig,
    pub summary: TrainingSummary,
}

impl RunManifest {
    pub fn new(config: LearnerConfig, summary: TrainingSummary) -> Self {
        let saved_at_unix_seconds = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self {
            manifest_version: CURRENT_MANIFEST_VERSION,
            saved_at_unix_seconds,
            config,
            summary,
        }
    }
}

/// Writes `run.json` into `folder` through a temporary file.
#[instrument(skip(manifest), fields(folder = %folder.display()))]
pub fn save_run_manifest(folder: &Path, manifest: &RunManifest) -> Result<()> {
    let payload = json!({
        "manifest_version": manifest.manifest_version,
        "saved_at_unix_seconds": manifest.saved_at_unix_seconds,
        "config": manifest.config.to_json()?,
        "summary": serde_json::to_value(manifest.summary).context("serialize run summary")?,
    });
    let bytes = serde_json::to_vec_pretty(&payload).context("serialize run manifest")?;
    std::fs::create_dir_all(folder)
        .with_context(|| format!("create model directory {}", folder.display()))?;
    let path = folder.join(MANIFEST_NAME);
    let temp_path = temporary_path(&path);
    std::fs::write(&temp_path, bytes)
        .with_context(|| format!("write run manifest temp file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, &path).with_context(|| {
        format!(
            "atomically replace run manifest {} from {}",
            path.display(),
            temp_path.display()
        )
    })?;
    Ok(())
}

/// Reads `run.json` from `folder`.
#[instrument(fields(folder = %folder.display()))]
pub fn load_run_manifest(folder: &Path) -> Result<RunManifest> {
    let path = folder.join(MANIFEST_NAME);
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read run manifest {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse run manifest JSON {}", path.display()))?;
    let object = value
        .as_object()
        .context("run manifest payload must be a JSON object")?;

    let manifest_version = object
        .get("manifest_version")
        .and_then(Value::as_u64)
        .context("missing required run manifest field `manifest_version`")?;
    if manifest_version != u64::from(CURRENT_MANIFEST_VERSION) {
        bail!(
            "unsupported manifest_version {manifest_version}; expected {CURRENT_MANIFEST_VERSION}"
        );
    }
    let saved_at_unix_seconds = object
        .get("saved_at_unix_seconds")
        .and_then(Value::as_u64)
        .context("missing required run manifest field `saved_at_unix_seconds`")?;
    let config = LearnerConfig::from_json(
        object
            .get("config")
            .context("missing required run manifest field `config`")?,
    )?;
    let summary = object
        .get("summary")
        .context("missing required run manifest field `summary`")?;
    let summary = TrainingSummary {
        episodes: summary_count(summary, "episodes")?,
        steps: summary_count(summary, "steps")?,
        failures: summary_count(summary, "failures")?,
        total_reward: summary
            .get("total_reward")
            .and_then(Value::as_f64)
            .context("run summary field `total_reward` must be numeric")?,
    };

    Ok(RunManifest {
        manifest_version: CURRENT_MANIFEST_VERSION,
        saved_at_unix_seconds,
        config,
        summary,
    })
}

fn summary_count(summary: &Value, field: &'static str) -> Result<usize> {
    summary
        .get(field)
        .and_then(Value::as_u64)
        .map(|count| count as usize)
        .ok_or_else(|| anyhow::anyhow!("run summary field `{field}` must be a non-negative integer"))
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut temp_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| MANIFEST_NAME.to_string());
    temp_name.push_str(".tmp");
    path.with_file_name(format!("{temp_name}.{}", std::process::id()))
}
