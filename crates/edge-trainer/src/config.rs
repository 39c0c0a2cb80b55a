//! Run configuration for safety learning on the hovership.

use anyhow::{bail, Context, Result};
use edge_envs::HovershipParameters;
use edge_inference::MaternGpConfig;
use ndarray::{Array1, Array2};
use serde_json::{json, Map, Value};

/// One seed observation of the safety measure.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedPoint {
    pub stateaction: Vec<f64>,
    pub value: f64,
}

/// Optional Q-learning model trained alongside the safety measure.
#[derive(Debug, Clone, PartialEq)]
pub struct QLearningConfig {
    pub step_size: f64,
    pub discount_rate: f64,
    pub gp: MaternGpConfig,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            step_size: 0.3,
            discount_rate: 0.8,
            gp: MaternGpConfig::isotropic(1.5, 1.0, 0.05),
        }
    }
}

/// Hyperparameters of a [`crate::SafetyLearner`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerConfig {
    /// Probability threshold used when bootstrapping measure targets.
    pub gamma_measure: f64,
    pub gamma_cautious: f64,
    pub gamma_optimistic: f64,
    pub lambda_cautious: f64,
    pub safety_gp: MaternGpConfig,
    /// Seed observations; empty means "the ceiling is safe".
    pub safety_seed: Vec<SeedPoint>,
    pub q_learning: Option<QLearningConfig>,
    pub hovership: HovershipParameters,
    pub episodes: usize,
    /// Hard cap on steps per episode.
    pub max_episode_steps: usize,
    pub random_start: bool,
    pub seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            gamma_measure: 0.6,
            gamma_cautious: 0.75,
            gamma_optimistic: 0.6,
            lambda_cautious: 0.0,
            safety_gp: MaternGpConfig::isotropic(2.0, 1.0, 0.01),
            safety_seed: Vec::new(),
            q_learning: None,
            hovership: HovershipParameters::default(),
            episodes: 10,
            max_episode_steps: 30,
            random_start: true,
            seed: 0,
        }
    }
}

impl LearnerConfig {
    /// Parses `LearnerConfig` from a JSON object. Missing fields keep their defaults.
    #[tracing::instrument(level = "debug", skip(value))]
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .context("learner config JSON payload must be an object")?;
        let mut config = Self::default();

        if let Some(gamma_measure) = object.get("gamma_measure") {
            config.gamma_measure = gamma_measure
                .as_f64()
                .context("learner config field 'gamma_measure' must be numeric")?;
        }
        if let Some(gamma_cautious) = object.get("gamma_cautious") {
            config.gamma_cautious = gamma_cautious
                .as_f64()
                .context("learner config field 'gamma_cautious' must be numeric")?;
        }
        if let Some(gamma_optimistic) = object.get("gamma_optimistic") {
            config.gamma_optimistic = gamma_optimistic
                .as_f64()
                .context("learner config field 'gamma_optimistic' must be numeric")?;
        }
        if let Some(lambda_cautious) = object.get("lambda_cautious") {
            config.lambda_cautious = lambda_cautious
                .as_f64()
                .context("learner config field 'lambda_cautious' must be numeric")?;
        }
        if let Some(safety_gp) = object.get("safety_gp") {
            config.safety_gp = serde_json::from_value(safety_gp.clone())
                .context("learner config field 'safety_gp' is not a valid GP config")?;
        }
        if let Some(safety_seed) = object.get("safety_seed") {
            config.safety_seed = parse_seed(safety_seed)?;
        }
        if let Some(q_learning) = object.get("q_learning") {
            config.q_learning = if q_learning.is_null() {
                None
            } else {
                Some(parse_q_learning(q_learning)?)
            };
        }
        if let Some(hovership) = object.get("hovership") {
            config.hovership = serde_json::from_value(hovership.clone())
                .context("learner config field 'hovership' is not a valid hovership config")?;
        }
        if let Some(episodes) = object.get("episodes") {
            config.episodes = episodes
                .as_u64()
                .context("learner config field 'episodes' must be a non-negative integer")?
                as usize;
        }
        if let Some(max_episode_steps) = object.get("max_episode_steps") {
            config.max_episode_steps = max_episode_steps
                .as_u64()
                .context("learner config field 'max_episode_steps' must be a non-negative integer")?
                as usize;
        }
        if let Some(random_start) = object.get("random_start") {
            config.random_start = random_start
                .as_bool()
                .context("learner config field 'random_start' must be boolean")?;
        }
        if let Some(seed) = object.get("seed") {
            config.seed = seed
                .as_u64()
                .context("learner config field 'seed' must be a non-negative integer")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Serializes the config in the shape accepted by [`LearnerConfig::from_json`].
    pub fn to_json(&self) -> Result<Value> {
        let q_learning = match &self.q_learning {
            Some(q_learning) => json!({
                "step_size": q_learning.step_size,
                "discount_rate": q_learning.discount_rate,
                "gp": serde_json::to_value(&q_learning.gp).context("serialize q-learning gp")?,
            }),
            None => Value::Null,
        };
        Ok(json!({
            "gamma_measure": self.gamma_measure,
            "gamma_cautious": self.gamma_cautious,
            "gamma_optimistic": self.gamma_optimistic,
            "lambda_cautious": self.lambda_cautious,
            "safety_gp": serde_json::to_value(&self.safety_gp).context("serialize safety gp")?,
            "safety_seed": self
                .safety_seed
                .iter()
                .map(|point| json!({"stateaction": point.stateaction, "value": point.value}))
                .collect::<Vec<_>>(),
            "q_learning": q_learning,
            "hovership": serde_json::to_value(&self.hovership).context("serialize hovership")?,
            "episodes": self.episodes,
            "max_episode_steps": self.max_episode_steps,
            "random_start": self.random_start,
            "seed": self.seed,
        }))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.gamma_measure.is_finite() || self.gamma_measure <= 0.0 || self.gamma_measure > 1.0 {
            bail!("gamma_measure must be within (0.0, 1.0]");
        }
        for (name, value) in [
            ("gamma_cautious", self.gamma_cautious),
            ("gamma_optimistic", self.gamma_optimistic),
        ] {
            if !value.is_finite() || !(0.0..1.0).contains(&value) {
                bail!("{name} must be within [0.0, 1.0)");
            }
        }
        if self.gamma_optimistic > self.gamma_cautious {
            bail!("gamma_optimistic must not exceed gamma_cautious");
        }
        if !self.lambda_cautious.is_finite() {
            bail!("lambda_cautious must be finite");
        }
        if self.max_episode_steps == 0 {
            bail!("max_episode_steps must be greater than 0");
        }
        if let Some(point) = self
            .safety_seed
            .iter()
            .find(|point| point.stateaction.len() != 2 || !point.value.is_finite())
        {
            bail!(
                "safety_seed entries need 2 coordinates and a finite value, got {:?}",
                point
            );
        }
        Ok(())
    }

    /// Safety seed as GP training arrays.
    pub fn seed_data(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        let points = if self.safety_seed.is_empty() {
            let ceiling = f64::from(self.hovership.max_altitude);
            let max_thrust = f64::from(self.hovership.max_thrust);
            vec![
                SeedPoint {
                    stateaction: vec![ceiling, max_thrust],
                    value: 1.0,
                },
                SeedPoint {
                    stateaction: vec![ceiling, (max_thrust / 2.0).floor()],
                    value: 1.0,
                },
            ]
        } else {
            self.safety_seed.clone()
        };
        let values = points.iter().map(|point| point.value).collect::<Array1<f64>>();
        let flat = points
            .into_iter()
            .flat_map(|point| point.stateaction)
            .collect::<Vec<_>>();
        let inputs = Array2::from_shape_vec((values.len(), 2), flat)
            .context("safety seed coordinates do not form a (n, 2) array")?;
        Ok((inputs, values))
    }
}

fn parse_seed(value: &Value) -> Result<Vec<SeedPoint>> {
    let entries = value
        .as_array()
        .context("learner config field 'safety_seed' must be an array")?;
    entries
        .iter()
        .map(|entry| -> Result<SeedPoint> {
            let object = entry
                .as_object()
                .context("safety_seed entries must be objects")?;
            let stateaction = required_field(object, "stateaction")?
                .as_array()
                .context("safety_seed field 'stateaction' must be an array")?
                .iter()
                .map(|coordinate| {
                    coordinate
                        .as_f64()
                        .context("safety_seed coordinates must be numeric")
                })
                .collect::<Result<Vec<_>>>()?;
            let value = required_field(object, "value")?
                .as_f64()
                .context("safety_seed field 'value' must be numeric")?;
            Ok(SeedPoint { stateaction, value })
        })
        .collect()
}

fn parse_q_learning(value: &Value) -> Result<QLearningConfig> {
    let object = value
        .as_object()
        .context("learner config field 'q_learning' must be an object or null")?;
    let mut config = QLearningConfig::default();
    if let Some(step_size) = object.get("step_size") {
        config.step_size = step_size
            .as_f64()
            .context("q_learning field 'step_size' must be numeric")?;
    }
    if let Some(discount_rate) = object.get("discount_rate") {
        config.discount_rate = discount_rate
            .as_f64()
            .context("q_learning field 'discount_rate' must be numeric")?;
    }
    if let Some(gp) = object.get("gp") {
        config.gp = serde_json::from_value(gp.clone())
            .context("q_learning field 'gp' is not a valid GP config")?;
    }
    Ok(config)
}

fn required_field<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value> {
    object
        .get(field)
        .ok_or_else(|| anyhow::anyhow!("missing required field `{field}`"))
}
