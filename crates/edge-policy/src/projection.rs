use anyhow::{bail, Result};
use edge_space::ProductSpace;
use ndarray::ArrayViewD;

use crate::{check_action_shape, Policy};

/// Projects a proposed action onto the nearest admissible grid action.
#[derive(Debug, Clone)]
pub struct SafeProjectionPolicy {
    action_space: ProductSpace,
}

impl SafeProjectionPolicy {
    pub fn new(action_space: ProductSpace) -> Self {
        Self { action_space }
    }

    /// Admissible action closest to `to_project` in Euclidean distance, or
    /// `None` when `constraints` admits nothing.
    pub fn get_action(
        &self,
        to_project: &[f64],
        constraints: ArrayViewD<'_, bool>,
    ) -> Result<Option<Vec<f64>>> {
        check_action_shape(&self.action_space, &constraints, "constraints")?;
        if to_project.len() != self.action_space.index_dim() {
            bail!(
                "action to project has {} coordinates, expected {}",
                to_project.len(),
                self.action_space.index_dim()
            );
        }
        let actions = self.action_space.values();
        let nearest = actions
            .rows()
            .into_iter()
            .zip(constraints.iter())
            .filter(|(_, admissible)| **admissible)
            .map(|(action, _)| {
                let distance = action
                    .iter()
                    .zip(to_project)
                    .map(|(left, right)| (left - right).powi(2))
                    .sum::<f64>();
                (action, distance)
            })
            .min_by(|left, right| left.1.total_cmp(&right.1))
            .map(|(action, _)| action.to_vec());
        Ok(nearest)
    }
}

impl Policy for SafeProjectionPolicy {
    fn name(&self) -> &'static str {
        "safe_projection"
    }

    fn action_space(&self) -> &ProductSpace {
        &self.action_space
    }
}
