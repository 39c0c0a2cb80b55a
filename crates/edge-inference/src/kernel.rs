use nalgebra::DMatrix;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Smoothness parameter of the Matérn family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaternNu {
    Half,
    ThreeHalves,
    #[default]
    FiveHalves,
}

impl MaternNu {
    /// Correlation at scaled distance `r >= 0`.
    pub fn correlation(self, r: f64) -> f64 {
        match self {
            Self::Half => (-r).exp(),
            Self::ThreeHalves => {
                let s = 3.0_f64.sqrt() * r;
                (1.0 + s) * (-s).exp()
            }
            Self::FiveHalves => {
                let s = 5.0_f64.sqrt() * r;
                (1.0 + s + s * s / 3.0) * (-s).exp()
            }
        }
    }
}

/// Scaled Matérn kernel with one lengthscale per input dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct MaternKernel {
    pub nu: MaternNu,
    pub lengthscale: Vec<f64>,
    pub outputscale: f64,
}

impl MaternKernel {
    pub fn eval(&self, left: ArrayView1<'_, f64>, right: ArrayView1<'_, f64>) -> f64 {
        let squared = left
            .iter()
            .zip(right.iter())
            .zip(&self.lengthscale)
            .map(|((left, right), lengthscale)| {
                let scaled = (left - right) / lengthscale;
                scaled * scaled
            })
            .sum::<f64>();
        self.outputscale * self.nu.correlation(squared.sqrt())
    }

    /// Cross-covariance matrix with one row per `left` row and one column per `right` row.
    pub fn matrix(&self, left: ArrayView2<'_, f64>, right: ArrayView2<'_, f64>) -> DMatrix<f64> {
        DMatrix::from_fn(left.nrows(), right.nrows(), |row, col| {
            self.eval(left.row(row), right.row(col))
        })
    }
}
