//! Learnable probabilistic safety measure.
//!
//! A [`SafetyMeasure`] wraps a [`Regressor`](edge_inference::Regressor) over a
//! state-action space and estimates, for every state-action pair, how likely
//! the agent is to remain in recoverable states. Policies consume it through
//! three queries: [`SafetyMeasure::measure`], [`SafetyMeasure::is_in_level_set`]
//! and [`SafetyMeasure::level_set`]. [`MaternSafety`] binds the measure to the
//! exact Matérn GP and adds folder persistence.

use edge_inference::InferenceError;
use edge_space::SpaceError;
use std::path::PathBuf;
use thiserror::Error;

mod level_set;
mod matern_safety;
mod measure;
pub mod normal;
#[cfg(test)]
mod testing;
mod thresholds;

pub use level_set::{CovarianceDiagnostic, LevelSetOptions, LevelSetOutput, StateQuery};
pub use matern_safety::{MaternSafety, GP_SAVE_NAME, SAVE_NAME};
pub use measure::{SafetyMeasure, SafetyStateDict, TransitionSample};
pub use thresholds::{ThresholdPair, Thresholds};

/// Result type for safety measure operations.
pub type SafetyResult<T> = Result<T, SafetyError>;

/// Errors returned by the safety measure.
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("gamma_measure must be finite and within (0.0, 1.0], got {0}")]
    InvalidGammaMeasure(f64),
    #[error("threshold '{name}' must be finite, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("at least one threshold pair is required")]
    EmptyThresholds,
    #[error("threshold lists must have the same length: lambda={lambda}, gamma={gamma}")]
    ThresholdLengthMismatch { lambda: usize, gamma: usize },
    #[error("state range {start}..{end} is invalid for a state space of {len} states")]
    InvalidStateRange {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("regressor input dimension {regressor} does not match state-action dimension {space}")]
    RegressorDimension { regressor: usize, space: usize },
    #[error("regressor returned {received} {field} values for {expected} queried rows")]
    PredictionShape {
        field: &'static str,
        expected: usize,
        received: usize,
    },
    #[error("could not find file {path}; specify gamma_measure instead to load this model")]
    MissingStateDict { path: PathBuf },
    #[error("invalid state dict {path}: {source}")]
    InvalidStateDict {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
