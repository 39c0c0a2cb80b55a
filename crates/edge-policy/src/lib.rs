//! Action-selection policies over a discretised action grid.
//!
//! Every policy receives per-action arrays shaped like the action grid (the
//! trailing axes of a level-set output for one state) and returns the chosen
//! action's coordinates.

use anyhow::{bail, Result};
use edge_space::ProductSpace;
use ndarray::{ArrayD, ArrayViewD};
use rand::Rng;

mod greedy;
mod projection;
mod safety;

pub use greedy::GreedyConstrained;
pub use projection::SafeProjectionPolicy;
pub use safety::{SafetyActiveSampling, SafetyMaximization};

/// Amplitude of the uniform noise used to break ties between equal scores.
pub const TIE_BREAK_NOISE: f64 = 0.001;

/// Common surface of all policies.
pub trait Policy {
    fn name(&self) -> &'static str;

    fn action_space(&self) -> &ProductSpace;

    /// Action chosen in every state of the state grid.
    ///
    /// None of the policies here can produce a map without per-state inputs.
    fn policy_map(&self) -> Result<ArrayD<f64>> {
        bail!(
            "unimplemented capability: policy '{}' does not provide a policy map",
            self.name()
        )
    }
}

fn check_action_shape<T>(space: &ProductSpace, values: &ArrayViewD<'_, T>, what: &str) -> Result<()> {
    if values.len() != space.len() {
        bail!(
            "{what} has {} entries but the action grid has {}",
            values.len(),
            space.len()
        );
    }
    Ok(())
}

fn action_at(space: &ProductSpace, flat: usize) -> Result<Vec<f64>> {
    let index = space.unravel(flat)?;
    Ok(space.value_at(&index)?)
}

fn tie_break(rng: &mut impl Rng) -> f64 {
    rng.gen_range(-TIE_BREAK_NOISE..TIE_BREAK_NOISE)
}

/// Flat index of the largest score among entries where `admissible` holds.
fn argmax_where(
    scores: impl Iterator<Item = f64>,
    admissible: impl Iterator<Item = bool>,
) -> Option<usize> {
    scores
        .zip(admissible)
        .enumerate()
        .filter(|(_, (_, admissible))| *admissible)
        .map(|(index, (score, _))| (index, score))
        .max_by(|left, right| left.1.total_cmp(&right.1))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::{argmax_where, Policy, SafetyMaximization};
    use edge_space::{Axis, ProductSpace};

    #[test]
    fn unit_argmax_where_skips_inadmissible_entries() {
        let scores = [0.9, 0.4, 0.7];
        let best = argmax_where(scores.into_iter(), [false, true, true].into_iter());
        assert_eq!(best, Some(2));
        assert_eq!(
            argmax_where(scores.into_iter(), [false; 3].into_iter()),
            None
        );
    }

    #[test]
    fn regression_policy_map_is_an_unimplemented_capability() {
        let space = ProductSpace::new(vec![Axis::discrete(3).expect("axis")]).expect("space");
        let policy = SafetyMaximization::new(space);
        let error = policy.policy_map().expect_err("no policy map");
        let message = error.to_string();
        assert!(message.contains("unimplemented capability"));
        assert!(message.contains("safety_maximization"));
    }
}
