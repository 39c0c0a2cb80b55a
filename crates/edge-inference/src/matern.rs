use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{RetentionPolicy, TrainingRow, TrainingSet};
use crate::kernel::{MaternKernel, MaternNu};
use crate::{
    AppendOutcome, InferenceError, InferenceResult, Prediction, QueryOptions, Regressor,
    RetentionFlags,
};

/// Compute backend for kernel algebra. Selected explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
}

/// Hyperparameters and data-handling options of a [`MaternGp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaternGpConfig {
    #[serde(default)]
    pub nu: MaternNu,
    /// One lengthscale per input dimension, or a single value shared by all.
    pub lengthscale: Vec<f64>,
    pub outputscale: f64,
    /// Observation noise variance added to the kernel diagonal.
    pub noise: f64,
    /// Constant prior mean.
    #[serde(default)]
    pub prior_mean: f64,
    /// Seed rows are permanent when true, evictable otherwise.
    #[serde(default = "default_keep_seed")]
    pub keep_seed_in_data: bool,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub device: Device,
}

fn default_keep_seed() -> bool {
    true
}

impl MaternGpConfig {
    /// Matérn-5/2 configuration with one shared lengthscale.
    pub fn isotropic(lengthscale: f64, outputscale: f64, noise: f64) -> Self {
        Self {
            nu: MaternNu::FiveHalves,
            lengthscale: vec![lengthscale],
            outputscale,
            noise,
            prior_mean: 0.0,
            keep_seed_in_data: true,
            retention: RetentionPolicy::KeepAll,
            device: Device::Cpu,
        }
    }

    pub fn validate(&self, input_dim: usize) -> InferenceResult<()> {
        if self.lengthscale.len() != 1 && self.lengthscale.len() != input_dim {
            return Err(InferenceError::InvalidHyperparameter {
                name: "lengthscale",
                reason: format!(
                    "expected 1 or {input_dim} values, received {}",
                    self.lengthscale.len()
                ),
            });
        }
        if self
            .lengthscale
            .iter()
            .any(|value| !value.is_finite() || *value <= 0.0)
        {
            return Err(positive("lengthscale"));
        }
        if !self.outputscale.is_finite() || self.outputscale <= 0.0 {
            return Err(positive("outputscale"));
        }
        if !self.noise.is_finite() || self.noise <= 0.0 {
            return Err(positive("noise"));
        }
        if !self.prior_mean.is_finite() {
            return Err(InferenceError::InvalidHyperparameter {
                name: "prior_mean",
                reason: "must be finite".to_string(),
            });
        }
        match self.retention {
            RetentionPolicy::NeighborErasing { radius } if !radius.is_finite() || radius < 0.0 => {
                Err(InferenceError::InvalidHyperparameter {
                    name: "retention.radius",
                    reason: "must be finite and >= 0.0".to_string(),
                })
            }
            RetentionPolicy::SlidingWindow { capacity: 0 } => {
                Err(InferenceError::InvalidHyperparameter {
                    name: "retention.capacity",
                    reason: "must be greater than 0".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn kernel(&self, input_dim: usize) -> MaternKernel {
        let lengthscale = if self.lengthscale.len() == 1 {
            vec![self.lengthscale[0]; input_dim]
        } else {
            self.lengthscale.clone()
        };
        MaternKernel {
            nu: self.nu,
            lengthscale,
            outputscale: self.outputscale,
        }
    }
}

fn positive(name: &'static str) -> InferenceError {
    InferenceError::InvalidHyperparameter {
        name,
        reason: "must be finite and > 0.0".to_string(),
    }
}

/// Exact Gaussian-process regressor with a Matérn kernel.
///
/// The Cholesky factor of `K + noise * I` and the weight vector are refreshed
/// after every mutation of the training set, so queries never refit.
#[derive(Debug, Clone)]
pub struct MaternGp {
    config: MaternGpConfig,
    kernel: MaternKernel,
    input_dim: usize,
    data: TrainingSet,
    train_x: Array2<f64>,
    train_y: Array1<f64>,
    chol_lower: DMatrix<f64>,
    alpha: DVector<f64>,
}

impl MaternGp {
    /// Builds a GP seeded with `(x_seed, y_seed)`. The input dimension is the
    /// number of columns of `x_seed`, even when it has no rows.
    pub fn new(
        x_seed: ArrayView2<'_, f64>,
        y_seed: ArrayView1<'_, f64>,
        config: MaternGpConfig,
    ) -> InferenceResult<Self> {
        let flags = RetentionFlags {
            forgettable: !config.keep_seed_in_data,
            make_forget: false,
            unskippable: false,
        };
        let rows = seed_rows(x_seed, y_seed, flags)?;
        Self::from_rows(x_seed.ncols(), rows, config)
    }

    pub(crate) fn from_rows(
        input_dim: usize,
        rows: Vec<TrainingRow>,
        config: MaternGpConfig,
    ) -> InferenceResult<Self> {
        config.validate(input_dim)?;
        if let Some(row) = rows.iter().find(|row| row.input.len() != input_dim) {
            return Err(InferenceError::DimensionMismatch {
                expected: input_dim,
                received: row.input.len(),
            });
        }
        let mut gp = Self {
            kernel: config.kernel(input_dim),
            config,
            input_dim,
            data: TrainingSet::from_rows(rows),
            train_x: Array2::zeros((0, input_dim)),
            train_y: Array1::zeros(0),
            chol_lower: DMatrix::zeros(0, 0),
            alpha: DVector::zeros(0),
        };
        gp.refit()?;
        Ok(gp)
    }

    pub fn config(&self) -> &MaternGpConfig {
        &self.config
    }

    pub fn rows(&self) -> &[TrainingRow] {
        self.data.rows()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn refit(&mut self) -> InferenceResult<()> {
        let n = self.data.len();
        let mut train_x = Array2::zeros((n, self.input_dim));
        let mut train_y = Array1::zeros(n);
        for (index, row) in self.data.rows().iter().enumerate() {
            for (slot, value) in train_x.row_mut(index).iter_mut().zip(&row.input) {
                *slot = *value;
            }
            train_y[index] = row.target;
        }
        if train_x.iter().any(|value: &f64| !value.is_finite()) {
            return Err(InferenceError::NonFinite("train_x"));
        }
        if train_y.iter().any(|value: &f64| !value.is_finite()) {
            return Err(InferenceError::NonFinite("train_y"));
        }

        if n == 0 {
            self.chol_lower = DMatrix::zeros(0, 0);
            self.alpha = DVector::zeros(0);
            self.train_x = train_x;
            self.train_y = train_y;
            return Ok(());
        }

        let mut gram = self.kernel.matrix(train_x.view(), train_x.view());
        for index in 0..n {
            gram[(index, index)] += self.config.noise;
        }
        let cholesky = gram
            .cholesky()
            .ok_or(InferenceError::NotPositiveDefinite { rows: n })?;
        let centered = DVector::from_iterator(
            n,
            train_y.iter().map(|target| target - self.config.prior_mean),
        );
        self.alpha = cholesky.solve(&centered);
        self.chol_lower = cholesky.unpack();
        self.train_x = train_x;
        self.train_y = train_y;
        Ok(())
    }

    fn check_inputs(&self, inputs: ArrayView2<'_, f64>) -> InferenceResult<()> {
        if inputs.ncols() != self.input_dim {
            return Err(InferenceError::DimensionMismatch {
                expected: self.input_dim,
                received: inputs.ncols(),
            });
        }
        if inputs.iter().any(|value| !value.is_finite()) {
            return Err(InferenceError::NonFinite("inputs"));
        }
        Ok(())
    }
}

impl Regressor for MaternGp {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[tracing::instrument(level = "debug", skip_all, fields(rows = inputs.nrows()))]
    fn append_data(
        &mut self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
        flags: &[RetentionFlags],
    ) -> InferenceResult<AppendOutcome> {
        self.check_inputs(inputs)?;
        if inputs.nrows() != targets.len() || inputs.nrows() != flags.len() {
            return Err(InferenceError::LengthMismatch {
                inputs: inputs.nrows(),
                targets: targets.len(),
                flags: flags.len(),
            });
        }
        if targets.iter().any(|value| !value.is_finite()) {
            return Err(InferenceError::NonFinite("targets"));
        }

        let previous = self.data.clone();
        let mut evicted = 0;
        for ((input, target), flags) in inputs.rows().into_iter().zip(targets).zip(flags) {
            let row = TrainingRow {
                input: input.to_vec(),
                target: *target,
                flags: *flags,
            };
            evicted += self.data.append(row, &self.config.retention);
        }
        if let Err(error) = self.refit() {
            self.data = previous;
            return Err(error);
        }
        if evicted > 0 {
            debug!(evicted, remaining = self.data.len(), "retention policy evicted rows");
        }
        Ok(AppendOutcome {
            appended: inputs.nrows(),
            evicted,
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(rows = inputs.nrows()))]
    fn query(
        &self,
        inputs: ArrayView2<'_, f64>,
        options: QueryOptions,
    ) -> InferenceResult<Prediction> {
        self.check_inputs(inputs)?;
        let m = inputs.nrows();
        let cross = self.kernel.matrix(self.train_x.view(), inputs);
        let mean_vector = cross.tr_mul(&self.alpha);
        let mean = Array1::from_iter(
            mean_vector
                .iter()
                .map(|value| value + self.config.prior_mean),
        );

        if !options.variance && !options.covariance_matrix {
            return Ok(Prediction {
                mean,
                variance: None,
                covariance_matrix: None,
            });
        }

        let projected = if self.data.is_empty() {
            DMatrix::zeros(0, m)
        } else {
            self.chol_lower
                .solve_lower_triangular(&cross)
                .ok_or(InferenceError::NotPositiveDefinite {
                    rows: self.data.len(),
                })?
        };

        let variance = options.variance.then(|| {
            Array1::from_iter(
                projected
                    .column_iter()
                    .map(|column| self.config.outputscale - column.norm_squared()),
            )
        });
        let covariance_matrix = options.covariance_matrix.then(|| {
            let prior = self.kernel.matrix(inputs, inputs);
            let reduction = projected.tr_mul(&projected);
            Array2::from_shape_fn((m, m), |(row, col)| {
                prior[(row, col)] - reduction[(row, col)]
            })
        });

        Ok(Prediction {
            mean,
            variance,
            covariance_matrix,
        })
    }

    fn train_x(&self) -> ArrayView2<'_, f64> {
        self.train_x.view()
    }

    fn train_y(&self) -> ArrayView1<'_, f64> {
        self.train_y.view()
    }
}

fn seed_rows(
    x_seed: ArrayView2<'_, f64>,
    y_seed: ArrayView1<'_, f64>,
    flags: RetentionFlags,
) -> InferenceResult<Vec<TrainingRow>> {
    if x_seed.nrows() != y_seed.len() {
        return Err(InferenceError::LengthMismatch {
            inputs: x_seed.nrows(),
            targets: y_seed.len(),
            flags: x_seed.nrows(),
        });
    }
    Ok(x_seed
        .rows()
        .into_iter()
        .zip(y_seed)
        .map(|(input, target)| TrainingRow {
            input: input.to_vec(),
            target: *target,
            flags,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{MaternGp, MaternGpConfig};
    use crate::{InferenceError, QueryOptions, Regressor, RetentionFlags, RetentionPolicy};
    use ndarray::{array, Array1};

    fn two_point_gp() -> MaternGp {
        MaternGp::new(
            array![[0.0, 0.0], [1.0, 1.0]].view(),
            array![1.0, 1.0].view(),
            MaternGpConfig::isotropic(100.0, 1.0, 1e-4),
        )
        .expect("gp")
    }

    #[test]
    fn unit_posterior_interpolates_seed_targets_with_small_variance() {
        let gp = two_point_gp();
        let prediction = gp
            .query(
                array![[0.0, 0.0], [0.5, 0.5]].view(),
                QueryOptions::with_variance(),
            )
            .expect("query");
        let variance = prediction.variance.expect("variance");
        for (mean, variance) in prediction.mean.iter().zip(variance.iter()) {
            assert!((mean - 1.0).abs() < 1e-3, "mean {mean}");
            assert!(variance.abs() < 1e-3, "variance {variance}");
        }
    }

    #[test]
    fn unit_empty_gp_returns_prior() {
        let config = MaternGpConfig {
            prior_mean: 0.3,
            ..MaternGpConfig::isotropic(1.0, 2.0, 0.1)
        };
        let gp = MaternGp::new(
            ndarray::Array2::<f64>::zeros((0, 1)).view(),
            Array1::<f64>::zeros(0).view(),
            config,
        )
        .expect("gp");
        let prediction = gp
            .query(
                array![[0.5]].view(),
                QueryOptions {
                    variance: true,
                    covariance_matrix: true,
                },
            )
            .expect("query");
        assert_eq!(prediction.mean[0], 0.3);
        assert_eq!(prediction.variance.expect("variance")[0], 2.0);
        assert_eq!(prediction.covariance_matrix.expect("matrix")[[0, 0]], 2.0);
    }

    #[test]
    fn unit_covariance_matrix_diagonal_matches_variance() {
        let gp = MaternGp::new(
            array![[0.0], [0.4]].view(),
            array![0.2, 0.9].view(),
            MaternGpConfig::isotropic(0.3, 1.0, 0.05),
        )
        .expect("gp");
        let prediction = gp
            .query(
                array![[0.1], [0.7], [1.0]].view(),
                QueryOptions {
                    variance: true,
                    covariance_matrix: true,
                },
            )
            .expect("query");
        let variance = prediction.variance.expect("variance");
        let matrix = prediction.covariance_matrix.expect("matrix");
        assert_eq!(matrix.dim(), (3, 3));
        for index in 0..3 {
            assert!((matrix[[index, index]] - variance[index]).abs() < 1e-12);
            assert!((matrix[[index, 0]] - matrix[[0, index]]).abs() < 1e-12);
        }
    }

    #[test]
    fn functional_append_applies_retention_policy() {
        let config = MaternGpConfig {
            retention: RetentionPolicy::NeighborErasing { radius: 0.2 },
            ..MaternGpConfig::isotropic(0.5, 1.0, 0.01)
        };
        let mut gp = MaternGp::new(array![[5.0]].view(), array![1.0].view(), config).expect("gp");
        let success = RetentionFlags {
            forgettable: true,
            make_forget: true,
            unskippable: false,
        };
        gp.append_data(array![[0.0]].view(), array![0.5].view(), &[success])
            .expect("append");
        let outcome = gp
            .append_data(array![[0.1]].view(), array![0.7].view(), &[success])
            .expect("append");
        assert_eq!(outcome.evicted, 1);
        assert_eq!(gp.train_x().nrows(), 2);
        assert_eq!(gp.train_y().to_vec(), vec![1.0, 0.7]);
    }

    #[test]
    fn regression_append_rejects_mismatched_lengths_and_dimensions() {
        let mut gp = two_point_gp();
        let error = gp
            .append_data(
                array![[0.0, 0.0]].view(),
                array![1.0, 2.0].view(),
                &[RetentionFlags::permanent()],
            )
            .expect_err("length mismatch");
        assert!(matches!(error, InferenceError::LengthMismatch { .. }));

        let error = gp
            .query(array![[0.0]].view(), QueryOptions::mean_only())
            .expect_err("dimension mismatch");
        assert!(error.to_string().contains("expected 2 columns"));
        assert_eq!(gp.len(), 2);
    }

    #[test]
    fn regression_invalid_hyperparameters_are_rejected() {
        let mut config = MaternGpConfig::isotropic(1.0, 1.0, 0.1);
        config.lengthscale = vec![1.0, 2.0, 3.0];
        let error = MaternGp::new(array![[0.0, 0.0]].view(), array![1.0].view(), config)
            .expect_err("lengthscale arity");
        assert!(error.to_string().contains("lengthscale"));

        let config = MaternGpConfig::isotropic(1.0, 1.0, 0.0);
        assert!(MaternGp::new(array![[0.0]].view(), array![1.0].view(), config).is_err());
    }
}
