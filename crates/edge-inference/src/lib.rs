//! Regression backends consumed by the safety measure and value models.
//!
//! The [`Regressor`] trait is the seam: a training set of `(input, target)`
//! rows tagged with [`RetentionFlags`], and batched posterior queries that
//! return a mean and, on request, the marginal variance and the full joint
//! covariance. [`MaternGp`] is the exact Gaussian-process implementation.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

mod dataset;
mod kernel;
mod matern;
mod persistence;

pub use dataset::{RetentionPolicy, TrainingRow, TrainingSet};
pub use kernel::{MaternKernel, MaternNu};
pub use matern::{Device, MaternGp, MaternGpConfig};
pub use persistence::{parse_gp_artifact, GpArtifact, GP_ARTIFACT_VERSION};

/// Result type for regressor operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Errors returned by regressor implementations.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("input dimension mismatch: expected {expected} columns, received {received}")]
    DimensionMismatch { expected: usize, received: usize },
    #[error("training data length mismatch: inputs={inputs}, targets={targets}, flags={flags}")]
    LengthMismatch {
        inputs: usize,
        targets: usize,
        flags: usize,
    },
    #[error("invalid hyperparameter '{name}': {reason}")]
    InvalidHyperparameter { name: &'static str, reason: String },
    #[error("non-finite values detected in '{0}'")]
    NonFinite(&'static str),
    #[error("kernel matrix over {rows} training rows is not positive definite")]
    NotPositiveDefinite { rows: usize },
    #[error("unsupported gp artifact format_version {found}; expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("no seed data supplied while loading {path} without its training data")]
    MissingSeed { path: PathBuf },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Retention tags attached to every training row.
///
/// A row is evictable when it is `forgettable` and not `unskippable`;
/// appending a `make_forget` row is what triggers the retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionFlags {
    pub forgettable: bool,
    pub make_forget: bool,
    pub unskippable: bool,
}

impl RetentionFlags {
    /// Row that is never evicted and never triggers eviction.
    pub fn permanent() -> Self {
        Self::default()
    }

    pub fn is_evictable(&self) -> bool {
        self.forgettable && !self.unskippable
    }
}

/// Which second-order outputs a query should compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pub variance: bool,
    pub covariance_matrix: bool,
}

impl QueryOptions {
    pub fn mean_only() -> Self {
        Self::default()
    }

    pub fn with_variance() -> Self {
        Self {
            variance: true,
            covariance_matrix: false,
        }
    }
}

/// Posterior summary over a batch of query rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Array1<f64>,
    /// Marginal latent variance per row. Not clamped: an ill-conditioned
    /// kernel matrix may produce slightly negative entries.
    pub variance: Option<Array1<f64>>,
    /// Joint latent covariance between all query rows.
    pub covariance_matrix: Option<Array2<f64>>,
}

/// Rows added and removed by one `append_data` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendOutcome {
    pub appended: usize,
    pub evicted: usize,
}

/// Regression model over a fixed-dimension input domain.
pub trait Regressor {
    fn input_dim(&self) -> usize;

    /// Appends training rows, applying the model's retention policy.
    fn append_data(
        &mut self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
        flags: &[RetentionFlags],
    ) -> InferenceResult<AppendOutcome>;

    /// Posterior at every row of `inputs`.
    fn query(
        &self,
        inputs: ArrayView2<'_, f64>,
        options: QueryOptions,
    ) -> InferenceResult<Prediction>;

    fn train_x(&self) -> ArrayView2<'_, f64>;

    fn train_y(&self) -> ArrayView1<'_, f64>;
}
