//! Q-value model learned by a regressor over a state-action space.

use anyhow::{bail, Context, Result};
use edge_inference::{MaternGp, MaternGpConfig, QueryOptions, Regressor, RetentionFlags};
use edge_space::StateActionSpace;
use ndarray::{aview1, array, ArrayD, ArrayView1, ArrayView2, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

/// Regressor artifact inside a saved Q model folder.
pub const GP_SAVE_NAME: &str = "gp_save.json";
/// Learning-rate state dict inside a saved Q model folder.
pub const SAVE_NAME: &str = "model.json";

/// Step size and discount rate persisted with a Q model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QLearningStateDict {
    pub step_size: f64,
    pub discount_rate: f64,
}

/// Q-learning where the Q function is the posterior mean of a regressor.
#[derive(Debug, Clone)]
pub struct GpQLearning<R> {
    space: StateActionSpace,
    gp: R,
    step_size: f64,
    discount_rate: f64,
}

/// Q-learning on the exact Matérn GP.
pub type MaternGpQLearning = GpQLearning<MaternGp>;

impl<R: Regressor> GpQLearning<R> {
    pub fn new(space: StateActionSpace, gp: R, step_size: f64, discount_rate: f64) -> Result<Self> {
        if !step_size.is_finite() || step_size <= 0.0 {
            bail!("q-learning step_size must be finite and > 0.0, got {step_size}");
        }
        if !discount_rate.is_finite() || !(0.0..=1.0).contains(&discount_rate) {
            bail!("q-learning discount_rate must be within [0.0, 1.0], got {discount_rate}");
        }
        if gp.input_dim() != space.dim() {
            bail!(
                "q-learning regressor input dimension {} does not match state-action dimension {}",
                gp.input_dim(),
                space.dim()
            );
        }
        Ok(Self {
            space,
            gp,
            step_size,
            discount_rate,
        })
    }

    pub fn space(&self) -> &StateActionSpace {
        &self.space
    }

    pub fn gp(&self) -> &R {
        &self.gp
    }

    pub fn state_dict(&self) -> QLearningStateDict {
        QLearningStateDict {
            step_size: self.step_size,
            discount_rate: self.discount_rate,
        }
    }

    pub fn q_value(&self, state: &[f64], action: &[f64]) -> Result<f64> {
        let point = self.space.stateaction(state, action)?;
        let prediction = self
            .gp
            .query(aview1(&point).insert_axis(Axis(0)), QueryOptions::mean_only())?;
        prediction
            .mean
            .first()
            .copied()
            .context("regressor returned no q-value")
    }

    /// Q-values of every action in `state`, shaped like the action grid.
    pub fn q_values(&self, state: &[f64]) -> Result<ArrayD<f64>> {
        let grid = self
            .space
            .grid_for_states(aview1(state).insert_axis(Axis(0)))?;
        let prediction = self.gp.query(grid.view(), QueryOptions::mean_only())?;
        let shape = self.space.action_space().shape();
        let q_values = prediction
            .mean
            .into_shape_with_order(IxDyn(&shape))
            .context("regressor returned a q-value batch of the wrong size")?;
        Ok(q_values)
    }

    /// Writes `Q(s, a) + step_size * (reward + discount_rate * max Q(s', .))`
    /// for `(state, action)` and returns it.
    #[instrument(level = "debug", skip(self))]
    pub fn update(
        &mut self,
        state: &[f64],
        action: &[f64],
        new_state: &[f64],
        reward: f64,
    ) -> Result<f64> {
        let next_best = self
            .q_values(new_state)?
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let target =
            self.q_value(state, action)? + self.step_size * (reward + self.discount_rate * next_best);
        if !target.is_finite() {
            bail!("q-learning update produced a non-finite target {target}");
        }
        let point = self.space.stateaction(state, action)?;
        self.gp.append_data(
            aview1(&point).insert_axis(Axis(0)),
            array![target].view(),
            &[RetentionFlags::permanent()],
        )?;
        debug!(target, "q-value updated");
        Ok(target)
    }
}

impl GpQLearning<MaternGp> {
    pub fn matern(
        space: StateActionSpace,
        step_size: f64,
        discount_rate: f64,
        x_seed: ArrayView2<'_, f64>,
        y_seed: ArrayView1<'_, f64>,
        config: MaternGpConfig,
    ) -> Result<Self> {
        let gp = MaternGp::new(x_seed, y_seed, config)?;
        Self::new(space, gp, step_size, discount_rate)
    }

    /// Writes `gp_save.json` and `model.json` into `folder`.
    pub fn save(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)
            .with_context(|| format!("failed to create {}", folder.display()))?;
        self.gp.save(&folder.join(GP_SAVE_NAME))?;
        let path = folder.join(SAVE_NAME);
        let bytes = serde_json::to_vec_pretty(&self.state_dict())
            .context("failed to serialize q-learning state dict")?;
        let temp_path = path.with_file_name(format!("{SAVE_NAME}.tmp.{}", std::process::id()));
        std::fs::write(&temp_path, bytes)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("failed to rename into {}", path.display()))?;
        Ok(())
    }

    /// Restores a Q model saved with [`MaternGpQLearning::save`], with its
    /// training rows unless `seed` replaces them.
    pub fn load(
        folder: &Path,
        space: StateActionSpace,
        seed: Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)>,
    ) -> Result<Self> {
        let path = folder.join(SAVE_NAME);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let state_dict: QLearningStateDict = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let load_data = seed.is_none();
        let gp = MaternGp::load(&folder.join(GP_SAVE_NAME), seed, load_data)?;
        Self::new(space, gp, state_dict.step_size, state_dict.discount_rate)
    }
}
