use ndarray::Array2;

use crate::{Axis, SpaceError, SpaceResult};

/// Cartesian product of 1-D axes, iterated in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSpace {
    axes: Vec<Axis>,
}

impl ProductSpace {
    pub fn new(axes: Vec<Axis>) -> SpaceResult<Self> {
        if axes.is_empty() {
            return Err(SpaceError::EmptyProduct);
        }
        Ok(Self { axes })
    }

    /// Builds a box `[low, high]` discretised with `shape` points per axis.
    pub fn boxed(low: &[f64], high: &[f64], shape: &[usize]) -> SpaceResult<Self> {
        check_len(low.len(), high.len())?;
        check_len(low.len(), shape.len())?;
        let axes = low
            .iter()
            .zip(high)
            .zip(shape)
            .map(|((low, high), n)| Axis::new(*low, *high, *n))
            .collect::<SpaceResult<Vec<_>>>()?;
        Self::new(axes)
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Number of coordinates of a point of this space.
    pub fn index_dim(&self) -> usize {
        self.axes.len()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.axes.iter().map(Axis::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn check_dim(&self, received: usize) -> SpaceResult<()> {
        check_len(self.index_dim(), received)
    }

    /// Returns whether every coordinate lies within its axis bounds.
    pub fn contains(&self, coordinates: &[f64]) -> SpaceResult<bool> {
        self.check_dim(coordinates.len())?;
        Ok(coordinates
            .iter()
            .zip(&self.axes)
            .all(|(value, axis)| axis.contains(*value)))
    }

    /// Fails unless `coordinates` has the right length and lies in the space.
    pub fn ensure_contains(&self, coordinates: &[f64]) -> SpaceResult<()> {
        self.check_dim(coordinates.len())?;
        for (value, axis) in coordinates.iter().zip(&self.axes) {
            if !axis.contains(*value) {
                return Err(SpaceError::OutOfBounds {
                    value: *value,
                    low: axis.low(),
                    high: axis.high(),
                });
            }
        }
        Ok(())
    }

    /// Coordinates of the grid point at a multi-index.
    pub fn value_at(&self, index: &[usize]) -> SpaceResult<Vec<f64>> {
        self.check_dim(index.len())?;
        index
            .iter()
            .zip(&self.axes)
            .map(|(index, axis)| axis.value(*index))
            .collect()
    }

    /// Converts each coordinate to its index on the corresponding axis.
    pub fn indexof(&self, coordinates: &[f64]) -> SpaceResult<Vec<usize>> {
        self.check_dim(coordinates.len())?;
        coordinates
            .iter()
            .zip(&self.axes)
            .map(|(value, axis)| axis.indexof(*value))
            .collect()
    }

    /// Row-major flat index of a multi-index.
    pub fn flat_index(&self, index: &[usize]) -> SpaceResult<usize> {
        self.check_dim(index.len())?;
        let mut flat = 0;
        for (index, axis) in index.iter().zip(&self.axes) {
            if *index >= axis.len() {
                return Err(SpaceError::IndexOutOfRange {
                    index: *index,
                    len: axis.len(),
                });
            }
            flat = flat * axis.len() + index;
        }
        Ok(flat)
    }

    /// Inverse of [`ProductSpace::flat_index`].
    pub fn unravel(&self, flat: usize) -> SpaceResult<Vec<usize>> {
        let len = self.len();
        if flat >= len {
            return Err(SpaceError::IndexOutOfRange { index: flat, len });
        }
        let mut remainder = flat;
        let mut index = vec![0; self.axes.len()];
        for (slot, axis) in index.iter_mut().zip(&self.axes).rev() {
            *slot = remainder % axis.len();
            remainder /= axis.len();
        }
        Ok(index)
    }

    /// Every grid point as one row, in row-major order.
    pub fn values(&self) -> Array2<f64> {
        let per_axis = self.axes.iter().map(Axis::values).collect::<Vec<_>>();
        let len = self.len();
        let dim = self.index_dim();
        let mut grid = Array2::zeros((len, dim));
        for (row, mut out) in grid.rows_mut().into_iter().enumerate() {
            let mut remainder = row;
            for axis_index in (0..dim).rev() {
                let axis_len = per_axis[axis_index].len();
                out[axis_index] = per_axis[axis_index][remainder % axis_len];
                remainder /= axis_len;
            }
        }
        grid
    }
}

fn check_len(expected: usize, received: usize) -> SpaceResult<()> {
    if expected != received {
        return Err(SpaceError::ShapeMismatch { expected, received });
    }
    Ok(())
}
