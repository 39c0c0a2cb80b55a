use crate::{SpaceError, SpaceResult};

/// Evenly spaced 1-D grid over `[low, high]` with `n` points.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    low: f64,
    high: f64,
    n: usize,
}

impl Axis {
    /// Creates a grid of `n` points spanning `[low, high]`, both ends included.
    pub fn new(low: f64, high: f64, n: usize) -> SpaceResult<Self> {
        if !low.is_finite() || !high.is_finite() {
            return Err(SpaceError::InvalidAxis(format!(
                "bounds must be finite, got [{low}, {high}]"
            )));
        }
        if low > high {
            return Err(SpaceError::InvalidAxis(format!(
                "low bound {low} exceeds high bound {high}"
            )));
        }
        if n == 0 {
            return Err(SpaceError::InvalidAxis(
                "axis must contain at least one point".to_string(),
            ));
        }
        if n == 1 && low != high {
            return Err(SpaceError::InvalidAxis(format!(
                "single-point axis requires low == high, got [{low}, {high}]"
            )));
        }
        Ok(Self { low, high, n })
    }

    /// Integer grid `0, 1, ..., n - 1`.
    pub fn discrete(n: usize) -> SpaceResult<Self> {
        if n == 0 {
            return Err(SpaceError::InvalidAxis(
                "discrete axis must contain at least one point".to_string(),
            ));
        }
        Self::new(0.0, (n - 1) as f64, n)
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between two consecutive grid points (0 for a single point).
    pub fn step(&self) -> f64 {
        if self.n == 1 {
            0.0
        } else {
            (self.high - self.low) / (self.n - 1) as f64
        }
    }

    /// Grid value at `index`.
    pub fn value(&self, index: usize) -> SpaceResult<f64> {
        if index >= self.n {
            return Err(SpaceError::IndexOutOfRange {
                index,
                len: self.n,
            });
        }
        if index == self.n - 1 {
            return Ok(self.high);
        }
        Ok(self.low + self.step() * index as f64)
    }

    /// All grid values in increasing order.
    pub fn values(&self) -> Vec<f64> {
        (0..self.n)
            .map(|index| {
                if index == self.n - 1 {
                    self.high
                } else {
                    self.low + self.step() * index as f64
                }
            })
            .collect()
    }

    /// Returns true when `value` lies within the axis bounds.
    pub fn contains(&self, value: f64) -> bool {
        let tolerance = 1e-9 * (1.0 + (self.high - self.low).abs());
        value.is_finite() && value >= self.low - tolerance && value <= self.high + tolerance
    }

    /// Index of the grid point closest to `value`.
    pub fn indexof(&self, value: f64) -> SpaceResult<usize> {
        if !self.contains(value) {
            return Err(SpaceError::OutOfBounds {
                value,
                low: self.low,
                high: self.high,
            });
        }
        if self.n == 1 {
            return Ok(0);
        }
        let raw = ((value - self.low) / self.step()).round();
        Ok((raw.max(0.0) as usize).min(self.n - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::Axis;
    use crate::SpaceError;

    #[test]
    fn unit_axis_values_include_both_bounds() {
        let axis = Axis::new(0.0, 1.0, 5).expect("axis");
        assert_eq!(axis.values(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(axis.step(), 0.25);
    }

    #[test]
    fn unit_indexof_snaps_to_nearest_grid_point() {
        let axis = Axis::new(-1.0, 1.0, 3).expect("axis");
        assert_eq!(axis.indexof(-0.6).expect("index"), 0);
        assert_eq!(axis.indexof(0.4).expect("index"), 1);
        assert_eq!(axis.indexof(1.0).expect("index"), 2);
    }

    #[test]
    fn regression_indexof_rejects_values_outside_bounds() {
        let axis = Axis::discrete(4).expect("axis");
        let error = axis.indexof(3.5).expect_err("out of bounds");
        assert!(matches!(error, SpaceError::OutOfBounds { .. }));
        assert!(axis.indexof(f64::NAN).is_err());
    }

    #[test]
    fn regression_invalid_axes_are_rejected() {
        assert!(Axis::new(1.0, 0.0, 3).is_err());
        assert!(Axis::new(0.0, 1.0, 0).is_err());
        assert!(Axis::new(0.0, 1.0, 1).is_err());
        assert!(Axis::new(2.0, 2.0, 1).is_ok());
        assert!(Axis::discrete(0).is_err());
    }
}
