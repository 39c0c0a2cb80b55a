//! Online safety learning: agent, run configuration, and model folders.

use anyhow::Result;
use edge_envs::{DiscreteHovership, Environment};
use edge_safety::MaternSafety;
use edge_value::MaternGpQLearning;
use ndarray::{Array1, Array2};

mod config;
mod learner;
mod manifest;

pub use config::{LearnerConfig, QLearningConfig, SeedPoint};
pub use learner::{LearnerThresholds, SafetyLearner, StepOutcome, TrainingSummary, Q_MODEL_DIR};
pub use manifest::{
    load_run_manifest, save_run_manifest, RunManifest, CURRENT_MANIFEST_VERSION, MANIFEST_NAME,
};

/// Builds a hovership learner with fresh models from `config`.
pub fn build_hovership_learner(config: &LearnerConfig) -> Result<SafetyLearner<DiscreteHovership>> {
    config.validate()?;
    let env = DiscreteHovership::new(config.hovership.clone())?;
    let space = env.stateaction_space().clone();
    let (x_seed, y_seed) = config.seed_data()?;
    let safety = MaternSafety::matern(
        space.clone(),
        config.gamma_measure,
        x_seed.view(),
        y_seed.view(),
        config.safety_gp.clone(),
    )?;
    let q_model = match &config.q_learning {
        Some(q_learning) => Some(MaternGpQLearning::matern(
            space,
            q_learning.step_size,
            q_learning.discount_rate,
            Array2::<f64>::zeros((0, 2)).view(),
            Array1::<f64>::zeros(0).view(),
            q_learning.gp.clone(),
        )?),
        None => None,
    };
    let learner = SafetyLearner::new(
        env,
        safety,
        q_model,
        LearnerThresholds {
            gamma_cautious: config.gamma_cautious,
            gamma_optimistic: config.gamma_optimistic,
            lambda_cautious: config.lambda_cautious,
        },
        config.seed,
    )?
    .with_random_start(config.random_start)
    .with_max_episode_steps(config.max_episode_steps);
    Ok(learner)
}
