//! Discrete control environments with explicit failure states.

use edge_space::{SpaceError, StateActionSpace};
use thiserror::Error;

mod hovership;

pub use hovership::{DiscreteHovership, HovershipParameters};

/// Result type for environment operations.
pub type EnvResult<T> = Result<T, EnvError>;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid environment parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// Outcome of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub new_state: Vec<f64>,
    pub reward: f64,
    /// `new_state` is a failure state.
    pub failed: bool,
    /// The episode is over.
    pub done: bool,
}

/// Episodic environment over a discretised state-action space.
pub trait Environment {
    fn stateaction_space(&self) -> &StateActionSpace;

    fn state(&self) -> &[f64];

    /// Starts a new episode from `state`, or from the default initial state.
    fn reset(&mut self, state: Option<&[f64]>) -> EnvResult<Vec<f64>>;

    fn step(&mut self, action: &[f64]) -> EnvResult<Transition>;

    fn is_failure_state(&self, state: &[f64]) -> bool;
}
