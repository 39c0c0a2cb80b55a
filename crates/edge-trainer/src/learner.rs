//! Agent that learns a safety measure (and optionally Q-values) online.

use anyhow::{bail, Context, Result};
use edge_envs::{Environment, Transition};
use edge_policy::{GreedyConstrained, SafetyActiveSampling, SafetyMaximization};
use edge_safety::{
    LevelSetOptions, MaternSafety, StateQuery, ThresholdPair, Thresholds, TransitionSample,
};
use edge_value::MaternGpQLearning;
use ndarray::{ArrayD, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Folder, relative to a checkpoint, holding the Q model.
pub const Q_MODEL_DIR: &str = "q_model";

/// Aggregate outcome of [`SafetyLearner::run_episodes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub episodes: usize,
    pub steps: usize,
    pub failures: usize,
    pub total_reward: f64,
}

/// One executed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: Vec<f64>,
    pub action: Vec<f64>,
    pub transition: Transition,
    /// Value written into the safety measure; `None` outside training mode.
    pub measure: Option<f64>,
}

/// Thresholds used to pick actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnerThresholds {
    pub gamma_cautious: f64,
    pub gamma_optimistic: f64,
    pub lambda_cautious: f64,
}

/// Safety-aware learner.
///
/// In training mode it samples the most uncertain action of the optimistic
/// set, falling back to the safest action. In evaluation mode it follows the
/// Q model inside the cautious set when there is one.
pub struct SafetyLearner<E> {
    env: E,
    safety: MaternSafety,
    q_model: Option<MaternGpQLearning>,
    thresholds: Thresholds,
    active_sampling: SafetyActiveSampling,
    safety_maximization: SafetyMaximization,
    greedy: GreedyConstrained,
    training_mode: bool,
    random_start: bool,
    max_episode_steps: usize,
    rng: ChaCha8Rng,
    last_action: Option<Vec<f64>>,
}

impl<E: Environment> SafetyLearner<E> {
    pub fn new(
        env: E,
        safety: MaternSafety,
        q_model: Option<MaternGpQLearning>,
        thresholds: LearnerThresholds,
        seed: u64,
    ) -> Result<Self> {
        if safety.space() != env.stateaction_space() {
            bail!("safety measure and environment use different state-action spaces");
        }
        if let Some(q_model) = &q_model {
            if q_model.space() != env.stateaction_space() {
                bail!("q model and environment use different state-action spaces");
            }
        }
        let thresholds = Thresholds::new(vec![
            ThresholdPair::new(thresholds.lambda_cautious, thresholds.gamma_cautious)?,
            ThresholdPair::new(0.0, thresholds.gamma_optimistic)?,
        ])?;
        let action_space = env.stateaction_space().action_space().clone();
        Ok(Self {
            env,
            safety,
            q_model,
            thresholds,
            active_sampling: SafetyActiveSampling::new(action_space.clone()),
            safety_maximization: SafetyMaximization::new(action_space.clone()),
            greedy: GreedyConstrained::new(action_space),
            training_mode: true,
            random_start: false,
            max_episode_steps: usize::MAX,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_action: None,
        })
    }

    pub fn with_random_start(mut self, random_start: bool) -> Self {
        self.random_start = random_start;
        self
    }

    pub fn with_max_episode_steps(mut self, max_episode_steps: usize) -> Self {
        self.max_episode_steps = max_episode_steps.max(1);
        self
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn safety(&self) -> &MaternSafety {
        &self.safety
    }

    pub fn q_model(&self) -> Option<&MaternGpQLearning> {
        self.q_model.as_ref()
    }

    pub fn state(&self) -> &[f64] {
        self.env.state()
    }

    pub fn last_action(&self) -> Option<&[f64]> {
        self.last_action.as_deref()
    }

    pub fn training_mode(&self) -> bool {
        self.training_mode
    }

    pub fn set_training_mode(&mut self, training_mode: bool) {
        self.training_mode = training_mode;
    }

    /// Starts a new episode, at a random non-failure grid state when random
    /// starts are enabled.
    pub fn reset(&mut self) -> Result<Vec<f64>> {
        self.last_action = None;
        if !self.random_start {
            return Ok(self.env.reset(None)?);
        }
        let states = self.env.stateaction_space().state_space().values();
        let candidates = states
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .filter(|state| !self.env.is_failure_state(state))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            bail!("every state of the environment is a failure state");
        }
        let start = candidates[self.rng.gen_range(0..candidates.len())].clone();
        Ok(self.env.reset(Some(&start))?)
    }

    /// Chooses the next action from one level-set evaluation of the current state.
    #[instrument(level = "debug", skip(self))]
    pub fn get_next_action(&mut self) -> Result<Vec<f64>> {
        let state = self.env.state().to_vec();
        let output = self.safety.level_set(
            StateQuery::from(state.as_slice()),
            &self.thresholds,
            LevelSetOptions::with_proba_and_covar(),
        )?;
        let cautious_set = first_state(&output.level_sets[0]);
        let optimistic_set = first_state(&output.level_sets[1]);
        let cautious_probability = output
            .probability()
            .map(first_state)
            .context("level set output is missing probabilities")?;
        let covariance = output
            .covariance
            .as_ref()
            .map(first_state)
            .context("level set output is missing covariance")?;

        if self.training_mode {
            if let Some(action) = self.active_sampling.get_action(
                covariance.view(),
                optimistic_set.view(),
                &mut self.rng,
            )? {
                return Ok(action);
            }
        } else if let Some(q_model) = &self.q_model {
            let q_values = q_model.q_values(&state)?;
            if let Some(action) = self
                .greedy
                .get_action(q_values.view(), cautious_set.view())?
            {
                return Ok(action);
            }
        }
        debug!("no admissible action; maximizing safety");
        self.safety_maximization
            .get_action(cautious_probability.view(), &mut self.rng)
    }

    /// Executes one action and, in training mode, updates the models.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let state = self.env.state().to_vec();
        let action = self.get_next_action()?;
        let transition = self.env.step(&action)?;
        self.last_action = Some(action.clone());

        let measure = if self.training_mode {
            let written = self.safety.update(
                TransitionSample {
                    state: &state,
                    action: &action,
                    new_state: &transition.new_state,
                    reward: transition.reward,
                    failed: transition.failed,
                    done: transition.done,
                },
                None,
            )?;
            if let Some(q_model) = &mut self.q_model {
                q_model.update(&state, &action, &transition.new_state, transition.reward)?;
            }
            written.first().copied()
        } else {
            None
        };
        Ok(StepOutcome {
            state,
            action,
            transition,
            measure,
        })
    }

    /// Runs `episodes` episodes from fresh resets.
    pub fn run_episodes(&mut self, episodes: usize) -> Result<TrainingSummary> {
        let mut summary = TrainingSummary::default();
        for episode in 0..episodes {
            self.reset()?;
            let mut episode_steps = 0;
            let mut episode_reward = 0.0;
            let mut failed = false;
            while episode_steps < self.max_episode_steps {
                let outcome = self.step()?;
                episode_steps += 1;
                episode_reward += outcome.transition.reward;
                failed = outcome.transition.failed;
                if outcome.transition.done {
                    break;
                }
            }
            summary.episodes += 1;
            summary.steps += episode_steps;
            summary.total_reward += episode_reward;
            if failed {
                summary.failures += 1;
            }
            info!(
                episode,
                steps = episode_steps,
                reward = episode_reward,
                failed,
                training = self.training_mode,
                "episode finished"
            );
        }
        Ok(summary)
    }

    /// Saves the safety measure into `folder` and the Q model into `folder/q_model`.
    #[instrument(skip(self), fields(folder = %folder.display()))]
    pub fn checkpoint(&self, folder: &Path) -> Result<()> {
        self.safety
            .save(folder)
            .with_context(|| format!("save safety measure to {}", folder.display()))?;
        if let Some(q_model) = &self.q_model {
            q_model.save(&folder.join(Q_MODEL_DIR))?;
        }
        Ok(())
    }
}

fn first_state<T: Clone>(values: &ArrayD<T>) -> ArrayD<T> {
    values.index_axis(Axis(0), 0).to_owned()
}
