use edge_space::{Axis, ProductSpace, StateActionSpace};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EnvError, EnvResult, Environment, Transition};

/// Dynamics of the discrete hovership.
///
/// Gravity is `ground_gravity` at or above `minimum_gravity_altitude` and
/// grows by `gravity_gradient` per altitude unit down to
/// `maximum_gravity_altitude`, below which it stays constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HovershipParameters {
    pub ground_gravity: u32,
    pub gravity_gradient: u32,
    pub max_thrust: u32,
    pub max_altitude: u32,
    pub minimum_gravity_altitude: u32,
    pub maximum_gravity_altitude: u32,
    /// Episode length limit.
    pub steps_done_threshold: Option<usize>,
}

impl Default for HovershipParameters {
    fn default() -> Self {
        Self {
            ground_gravity: 1,
            gravity_gradient: 1,
            max_thrust: 5,
            max_altitude: 10,
            minimum_gravity_altitude: 9,
            maximum_gravity_altitude: 3,
            steps_done_threshold: None,
        }
    }
}

impl HovershipParameters {
    pub fn validate(&self) -> EnvResult<()> {
        if self.max_altitude == 0 {
            return Err(EnvError::InvalidParameter {
                name: "max_altitude",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.maximum_gravity_altitude > self.minimum_gravity_altitude {
            return Err(EnvError::InvalidParameter {
                name: "maximum_gravity_altitude",
                reason: format!(
                    "must not exceed minimum_gravity_altitude ({})",
                    self.minimum_gravity_altitude
                ),
            });
        }
        let gravity_span = self.minimum_gravity_altitude - self.maximum_gravity_altitude;
        if self
            .gravity_gradient
            .checked_mul(gravity_span)
            .and_then(|growth| growth.checked_add(self.ground_gravity))
            .is_none()
        {
            return Err(EnvError::InvalidParameter {
                name: "gravity_gradient",
                reason: format!(
                    "ground_gravity + gravity_gradient * {gravity_span} overflows u32"
                ),
            });
        }
        if self.max_altitude.checked_add(self.max_thrust).is_none() {
            return Err(EnvError::InvalidParameter {
                name: "max_thrust",
                reason: "max_altitude + max_thrust overflows u32".to_string(),
            });
        }
        if self.steps_done_threshold == Some(0) {
            return Err(EnvError::InvalidParameter {
                name: "steps_done_threshold",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    fn gravity(&self, altitude: u32) -> u32 {
        let clamped = altitude.clamp(self.maximum_gravity_altitude, self.minimum_gravity_altitude);
        self.gravity_gradient
            .saturating_mul(self.minimum_gravity_altitude - clamped)
            .saturating_add(self.ground_gravity)
    }
}

/// Hovering ship on an integer altitude grid. Touching the ground (altitude 0)
/// is a failure; reaching the ceiling is rewarded.
#[derive(Debug, Clone)]
pub struct DiscreteHovership {
    parameters: HovershipParameters,
    space: StateActionSpace,
    state: Vec<f64>,
    steps: usize,
}

impl DiscreteHovership {
    pub fn new(parameters: HovershipParameters) -> EnvResult<Self> {
        parameters.validate()?;
        let altitudes = Axis::discrete(parameters.max_altitude as usize + 1)?;
        let thrusts = Axis::discrete(parameters.max_thrust as usize + 1)?;
        let space = StateActionSpace::new(
            ProductSpace::new(vec![altitudes])?,
            ProductSpace::new(vec![thrusts])?,
        );
        let state = vec![f64::from(parameters.max_altitude)];
        Ok(Self {
            parameters,
            space,
            state,
            steps: 0,
        })
    }

    pub fn parameters(&self) -> &HovershipParameters {
        &self.parameters
    }

    pub fn default_initial_state(&self) -> Vec<f64> {
        vec![f64::from(self.parameters.max_altitude)]
    }

    /// Altitude reached from `altitude` with `thrust`.
    pub fn next_altitude(&self, altitude: u32, thrust: u32) -> u32 {
        if altitude == 0 {
            return 0;
        }
        let lifted = altitude.saturating_add(thrust);
        lifted
            .saturating_sub(self.parameters.gravity(altitude))
            .min(self.parameters.max_altitude)
    }

    fn grid_index(&self, space: &ProductSpace, values: &[f64]) -> EnvResult<u32> {
        space.ensure_contains(values)?;
        let index = space.indexof(values)?;
        Ok(index[0] as u32)
    }
}

impl Environment for DiscreteHovership {
    fn stateaction_space(&self) -> &StateActionSpace {
        &self.space
    }

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn reset(&mut self, state: Option<&[f64]>) -> EnvResult<Vec<f64>> {
        let state = match state {
            Some(state) => {
                let altitude = self.grid_index(self.space.state_space(), state)?;
                vec![f64::from(altitude)]
            }
            None => self.default_initial_state(),
        };
        self.state = state.clone();
        self.steps = 0;
        Ok(state)
    }

    fn step(&mut self, action: &[f64]) -> EnvResult<Transition> {
        let thrust = self.grid_index(self.space.action_space(), action)?;
        let altitude = self.grid_index(self.space.state_space(), &self.state)?;
        let new_altitude = self.next_altitude(altitude, thrust);
        self.state = vec![f64::from(new_altitude)];
        self.steps += 1;

        let failed = new_altitude == 0;
        let reward = if new_altitude == self.parameters.max_altitude {
            1.0
        } else {
            0.0
        };
        let out_of_steps = self
            .parameters
            .steps_done_threshold
            .is_some_and(|limit| self.steps >= limit);
        if failed {
            debug!(altitude, thrust, steps = self.steps, "hovership crashed");
        }
        Ok(Transition {
            new_state: self.state.clone(),
            reward,
            failed,
            done: failed || out_of_steps,
        })
    }

    fn is_failure_state(&self, state: &[f64]) -> bool {
        state.first().is_some_and(|altitude| *altitude == 0.0)
    }
}
