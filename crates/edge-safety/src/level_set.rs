use edge_inference::Prediction;
use edge_space::ProductSpace;
use ndarray::{s, Array1, Array2, ArrayD, IxDyn};
use std::ops::Range;
use tracing::warn;

use crate::normal::exceedance_probability;
use crate::{SafetyError, SafetyResult, Thresholds};

/// States a level-set query is evaluated on. Every state is paired with the
/// whole action grid.
#[derive(Debug, Clone, PartialEq)]
pub enum StateQuery {
    /// Every point of the state grid, in row-major order.
    All,
    /// A slice of flat state-grid indices.
    Range(Range<usize>),
    /// One explicit state.
    Single(Vec<f64>),
    /// Explicit states, one per row.
    Batch(Array2<f64>),
}

impl StateQuery {
    pub(crate) fn resolve(&self, state_space: &ProductSpace) -> SafetyResult<Array2<f64>> {
        match self {
            Self::All => Ok(state_space.values()),
            Self::Range(range) => {
                let len = state_space.len();
                if range.start >= range.end || range.end > len {
                    return Err(SafetyError::InvalidStateRange {
                        start: range.start,
                        end: range.end,
                        len,
                    });
                }
                Ok(state_space
                    .values()
                    .slice(s![range.start..range.end, ..])
                    .to_owned())
            }
            Self::Single(state) => {
                state_space.check_dim(state.len())?;
                Ok(Array1::from(state.clone()).insert_axis(ndarray::Axis(0)))
            }
            Self::Batch(states) => {
                state_space.check_dim(states.ncols())?;
                Ok(states.clone())
            }
        }
    }
}

impl From<Vec<f64>> for StateQuery {
    fn from(state: Vec<f64>) -> Self {
        Self::Single(state)
    }
}

impl From<&[f64]> for StateQuery {
    fn from(state: &[f64]) -> Self {
        Self::Single(state.to_vec())
    }
}

impl From<Array2<f64>> for StateQuery {
    fn from(states: Array2<f64>) -> Self {
        Self::Batch(states)
    }
}

impl From<Range<usize>> for StateQuery {
    fn from(range: Range<usize>) -> Self {
        Self::Range(range)
    }
}

/// Optional outputs of [`crate::SafetyMeasure::level_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelSetOptions {
    pub return_proba: bool,
    pub return_covar: bool,
    pub return_measure: bool,
    pub return_covar_matrix: bool,
}

impl LevelSetOptions {
    pub fn with_proba() -> Self {
        Self {
            return_proba: true,
            ..Self::default()
        }
    }

    pub fn with_proba_and_covar() -> Self {
        Self {
            return_proba: true,
            return_covar: true,
            ..Self::default()
        }
    }
}

/// Degenerate posterior variances found while evaluating a level set.
///
/// Negative entries are evaluated with their absolute value. NaN entries give
/// a NaN probability, so the pair is never in a level set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovarianceDiagnostic {
    pub negative_entries: usize,
    pub most_negative: f64,
    pub non_finite_entries: usize,
}

/// Result of a level-set query.
///
/// Per-state arrays have shape `(n_states,) + action_space.shape()`. The
/// per-threshold vectors follow the order of the [`Thresholds`] they were
/// computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSetOutput {
    pub level_sets: Vec<ArrayD<bool>>,
    pub probabilities: Option<Vec<ArrayD<f64>>>,
    pub covariance: Option<ArrayD<f64>>,
    pub measure: Option<ArrayD<f64>>,
    /// Joint posterior covariance between all `n_states * n_actions` queried rows.
    pub covariance_matrix: Option<Array2<f64>>,
    pub diagnostic: Option<CovarianceDiagnostic>,
}

impl LevelSetOutput {
    /// Level set of the first threshold pair.
    pub fn level_set(&self) -> &ArrayD<bool> {
        &self.level_sets[0]
    }

    /// Probabilities of the first threshold pair, when requested.
    pub fn probability(&self) -> Option<&ArrayD<f64>> {
        self.probabilities
            .as_ref()
            .and_then(|probabilities| probabilities.first())
    }
}

/// Turns one regressor prediction into per-threshold level sets.
pub(crate) fn evaluate(
    prediction: Prediction,
    shape: &[usize],
    thresholds: &Thresholds,
    options: LevelSetOptions,
) -> SafetyResult<LevelSetOutput> {
    let rows = shape.iter().product::<usize>();
    check_rows("mean", rows, prediction.mean.len())?;
    let Some(variance) = prediction.variance else {
        return Err(SafetyError::PredictionShape {
            field: "variance",
            expected: rows,
            received: 0,
        });
    };
    check_rows("variance", rows, variance.len())?;

    let diagnostic = diagnose(&variance);
    if let Some(diagnostic) = diagnostic {
        warn!(
            negative_entries = diagnostic.negative_entries,
            most_negative = diagnostic.most_negative,
            non_finite_entries = diagnostic.non_finite_entries,
            "degenerate posterior variance"
        );
    }
    let scale = variance.mapv(|value| value.abs().sqrt());

    let mut level_sets = Vec::with_capacity(thresholds.len());
    let mut probabilities = Vec::with_capacity(thresholds.len());
    for pair in thresholds.pairs() {
        let probability = prediction
            .mean
            .iter()
            .zip(scale.iter())
            .map(|(mean, scale)| exceedance_probability(mean - pair.lambda(), *scale))
            .collect::<Vec<_>>();
        let level_set = probability
            .iter()
            .map(|probability| *probability > pair.gamma())
            .collect::<Vec<_>>();
        level_sets.push(shaped(level_set, shape)?);
        if options.return_proba {
            probabilities.push(shaped(probability, shape)?);
        }
    }

    let covariance_matrix = if options.return_covar_matrix {
        let Some(matrix) = prediction.covariance_matrix else {
            return Err(SafetyError::PredictionShape {
                field: "covariance matrix",
                expected: rows,
                received: 0,
            });
        };
        check_rows("covariance matrix", rows * rows, matrix.len())?;
        Some(matrix)
    } else {
        None
    };

    Ok(LevelSetOutput {
        level_sets,
        probabilities: options.return_proba.then_some(probabilities),
        covariance: if options.return_covar {
            Some(shaped(variance.to_vec(), shape)?)
        } else {
            None
        },
        measure: if options.return_measure {
            Some(shaped(prediction.mean.to_vec(), shape)?)
        } else {
            None
        },
        covariance_matrix,
        diagnostic,
    })
}

fn diagnose(variance: &Array1<f64>) -> Option<CovarianceDiagnostic> {
    let mut negative_entries = 0;
    let mut most_negative = 0.0_f64;
    let mut non_finite_entries = 0;
    for value in variance.iter() {
        if !value.is_finite() {
            non_finite_entries += 1;
        } else if *value < 0.0 {
            negative_entries += 1;
            most_negative = most_negative.min(*value);
        }
    }
    (negative_entries > 0 || non_finite_entries > 0).then_some(CovarianceDiagnostic {
        negative_entries,
        most_negative,
        non_finite_entries,
    })
}

fn check_rows(field: &'static str, expected: usize, received: usize) -> SafetyResult<()> {
    if expected != received {
        return Err(SafetyError::PredictionShape {
            field,
            expected,
            received,
        });
    }
    Ok(())
}

fn shaped<T>(values: Vec<T>, shape: &[usize]) -> SafetyResult<ArrayD<T>> {
    let received = values.len();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| SafetyError::PredictionShape {
        field: "level set",
        expected: shape.iter().product(),
        received,
    })
}
