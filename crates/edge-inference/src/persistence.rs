//! Versioned on-disk artifact for [`MaternGp`].

use chrono::{DateTime, Utc};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::{InferenceError, InferenceResult, MaternGp, MaternGpConfig, Regressor, TrainingRow};

/// Current GP artifact schema version.
pub const GP_ARTIFACT_VERSION: u32 = 1;

/// Serialized hyperparameters and training rows of a [`MaternGp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpArtifact {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub input_dim: usize,
    pub config: MaternGpConfig,
    pub rows: Vec<TrainingRow>,
}

/// Parses and validates a GP artifact payload.
pub fn parse_gp_artifact(raw: &str) -> InferenceResult<GpArtifact> {
    let artifact: GpArtifact = serde_json::from_str(raw)?;
    if artifact.format_version != GP_ARTIFACT_VERSION {
        return Err(InferenceError::UnsupportedVersion {
            found: artifact.format_version,
            expected: GP_ARTIFACT_VERSION,
        });
    }
    artifact.config.validate(artifact.input_dim)?;
    if let Some(row) = artifact
        .rows
        .iter()
        .find(|row| row.input.len() != artifact.input_dim)
    {
        return Err(InferenceError::DimensionMismatch {
            expected: artifact.input_dim,
            received: row.input.len(),
        });
    }
    Ok(artifact)
}

impl MaternGp {
    pub fn to_artifact(&self) -> GpArtifact {
        GpArtifact {
            format_version: GP_ARTIFACT_VERSION,
            saved_at: Utc::now(),
            input_dim: self.input_dim(),
            config: self.config().clone(),
            rows: self.rows().to_vec(),
        }
    }

    /// Writes the artifact through a temporary file and an atomic rename.
    #[instrument(skip(self), fields(path = %path.display(), rows = self.len()))]
    pub fn save(&self, path: &Path) -> InferenceResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.to_artifact())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let temp_path = temporary_path(path);
        std::fs::write(&temp_path, bytes).map_err(|source| io_error(&temp_path, source))?;
        std::fs::rename(&temp_path, path).map_err(|source| io_error(path, source))?;
        Ok(())
    }

    /// Restores a GP saved with [`MaternGp::save`].
    ///
    /// With `load_data` the persisted training rows are restored as-is;
    /// otherwise only the hyperparameters are kept and `seed` supplies the data.
    #[instrument(skip(seed), fields(path = %path.display()))]
    pub fn load(
        path: &Path,
        seed: Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)>,
        load_data: bool,
    ) -> InferenceResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        let artifact = parse_gp_artifact(&raw)?;
        if load_data {
            return Self::from_rows(artifact.input_dim, artifact.rows, artifact.config);
        }
        let Some((x_seed, y_seed)) = seed else {
            return Err(InferenceError::MissingSeed {
                path: path.to_path_buf(),
            });
        };
        if x_seed.ncols() != artifact.input_dim {
            return Err(InferenceError::DimensionMismatch {
                expected: artifact.input_dim,
                received: x_seed.ncols(),
            });
        }
        Self::new(x_seed, y_seed, artifact.config)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> InferenceError {
    InferenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut temp_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "gp_save".to_string());
    temp_name.push_str(".tmp");
    path.with_file_name(format!("{temp_name}.{}", std::process::id()))
}
