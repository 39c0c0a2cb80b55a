use ndarray::{Array2, ArrayView2};

use crate::{Axis, ProductSpace, SpaceError, SpaceResult};

/// Product of a state space and an action space.
///
/// A state-action point is the state coordinates followed by the action
/// coordinates; grid points are numbered state-major, so the rows belonging to
/// one state are contiguous and ordered like the action grid.
#[derive(Debug, Clone, PartialEq)]
pub struct StateActionSpace {
    state_space: ProductSpace,
    action_space: ProductSpace,
}

impl StateActionSpace {
    pub fn new(state_space: ProductSpace, action_space: ProductSpace) -> Self {
        Self {
            state_space,
            action_space,
        }
    }

    /// Splits `axes` into the first `state_dim` state axes and the remaining action axes.
    pub fn from_product(mut axes: Vec<Axis>, state_dim: usize) -> SpaceResult<Self> {
        if state_dim == 0 || state_dim >= axes.len() {
            return Err(SpaceError::ShapeMismatch {
                expected: axes.len().saturating_sub(1).max(1),
                received: state_dim,
            });
        }
        let action_axes = axes.split_off(state_dim);
        Ok(Self::new(
            ProductSpace::new(axes)?,
            ProductSpace::new(action_axes)?,
        ))
    }

    pub fn state_space(&self) -> &ProductSpace {
        &self.state_space
    }

    pub fn action_space(&self) -> &ProductSpace {
        &self.action_space
    }

    /// Number of coordinates of a state-action point.
    pub fn dim(&self) -> usize {
        self.state_space.index_dim() + self.action_space.index_dim()
    }

    pub fn len(&self) -> usize {
        self.state_space.len() * self.action_space.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenates a state and an action after checking both belong to the space.
    pub fn stateaction(&self, state: &[f64], action: &[f64]) -> SpaceResult<Vec<f64>> {
        self.state_space.ensure_contains(state)?;
        self.action_space.ensure_contains(action)?;
        let mut point = Vec::with_capacity(self.dim());
        point.extend_from_slice(state);
        point.extend_from_slice(action);
        Ok(point)
    }

    /// Flat grid index of a (state index, action index) pair.
    pub fn flat_index(&self, state_index: &[usize], action_index: &[usize]) -> SpaceResult<usize> {
        let state = self.state_space.flat_index(state_index)?;
        let action = self.action_space.flat_index(action_index)?;
        Ok(state * self.action_space.len() + action)
    }

    /// Builds the query rows pairing every state in `states` with the full action grid.
    ///
    /// Output has `states.nrows() * action_space.len()` rows.
    pub fn grid_for_states(&self, states: ArrayView2<'_, f64>) -> SpaceResult<Array2<f64>> {
        self.state_space.check_dim(states.ncols())?;
        let actions = self.action_space.values();
        let n_actions = actions.nrows();
        let mut grid = Array2::zeros((states.nrows() * n_actions, self.dim()));
        for (state_row, state) in states.rows().into_iter().enumerate() {
            let state = state.to_vec();
            self.state_space.ensure_contains(&state)?;
            for (action_row, action) in actions.rows().into_iter().enumerate() {
                let mut out = grid.row_mut(state_row * n_actions + action_row);
                for (slot, value) in out.iter_mut().zip(state.iter().chain(action.iter())) {
                    *slot = *value;
                }
            }
        }
        Ok(grid)
    }
}
