use anyhow::Result;
use edge_space::ProductSpace;
use ndarray::ArrayViewD;

use crate::{action_at, argmax_where, check_action_shape, Policy};

/// Best Q-value action among those admitted by a constraint set.
#[derive(Debug, Clone)]
pub struct GreedyConstrained {
    action_space: ProductSpace,
}

impl GreedyConstrained {
    pub fn new(action_space: ProductSpace) -> Self {
        Self { action_space }
    }

    pub fn get_action(
        &self,
        q_values: ArrayViewD<'_, f64>,
        constraints: ArrayViewD<'_, bool>,
    ) -> Result<Option<Vec<f64>>> {
        check_action_shape(&self.action_space, &q_values, "q-values")?;
        check_action_shape(&self.action_space, &constraints, "constraints")?;
        argmax_where(q_values.iter().copied(), constraints.iter().copied())
            .map(|flat| action_at(&self.action_space, flat))
            .transpose()
    }
}

impl Policy for GreedyConstrained {
    fn name(&self) -> &'static str {
        "greedy_constrained"
    }

    fn action_space(&self) -> &ProductSpace {
        &self.action_space
    }
}
