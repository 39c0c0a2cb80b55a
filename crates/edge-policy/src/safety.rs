use anyhow::Result;
use edge_space::ProductSpace;
use ndarray::ArrayViewD;
use rand::Rng;

use crate::{action_at, argmax_where, check_action_shape, tie_break, Policy};

/// Picks the action most likely to be cautious.
#[derive(Debug, Clone)]
pub struct SafetyMaximization {
    action_space: ProductSpace,
}

impl SafetyMaximization {
    pub fn new(action_space: ProductSpace) -> Self {
        Self { action_space }
    }

    /// Argmax of `cautious_probability` with a small random tie-break, so equal
    /// probabilities do not always select the same action.
    pub fn get_action(
        &self,
        cautious_probability: ArrayViewD<'_, f64>,
        rng: &mut impl Rng,
    ) -> Result<Vec<f64>> {
        check_action_shape(
            &self.action_space,
            &cautious_probability,
            "cautious probability",
        )?;
        let noisy = cautious_probability
            .iter()
            .map(|probability| probability + tie_break(rng))
            .collect::<Vec<_>>();
        let best = argmax_where(noisy.into_iter(), std::iter::repeat(true))
            .unwrap_or_default();
        action_at(&self.action_space, best)
    }
}

impl Policy for SafetyMaximization {
    fn name(&self) -> &'static str {
        "safety_maximization"
    }

    fn action_space(&self) -> &ProductSpace {
        &self.action_space
    }
}

/// Picks, among cautious actions, the one whose safety estimate is the most
/// uncertain.
#[derive(Debug, Clone)]
pub struct SafetyActiveSampling {
    action_space: ProductSpace,
}

impl SafetyActiveSampling {
    pub fn new(action_space: ProductSpace) -> Self {
        Self { action_space }
    }

    /// `None` when no action is cautious.
    pub fn get_action(
        &self,
        covariance: ArrayViewD<'_, f64>,
        is_cautious: ArrayViewD<'_, bool>,
        rng: &mut impl Rng,
    ) -> Result<Option<Vec<f64>>> {
        check_action_shape(&self.action_space, &covariance, "covariance")?;
        check_action_shape(&self.action_space, &is_cautious, "cautious set")?;
        if !is_cautious.iter().any(|cautious| *cautious) {
            return Ok(None);
        }
        let noisy = covariance
            .iter()
            .map(|variance| variance + tie_break(rng))
            .collect::<Vec<_>>();
        argmax_where(noisy.into_iter(), is_cautious.iter().copied())
            .map(|flat| action_at(&self.action_space, flat))
            .transpose()
    }
}

impl Policy for SafetyActiveSampling {
    fn name(&self) -> &'static str {
        "safety_active_sampling"
    }

    fn action_space(&self) -> &ProductSpace {
        &self.action_space
    }
}
