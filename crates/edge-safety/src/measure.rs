use edge_inference::{QueryOptions, Regressor, RetentionFlags};
use edge_space::StateActionSpace;
use ndarray::{aview1, array, Array1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::level_set::evaluate;
use crate::{LevelSetOptions, LevelSetOutput, SafetyError, SafetyResult, StateQuery, Thresholds};

/// Hyperparameters persisted next to the regressor artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyStateDict {
    pub gamma_measure: f64,
}

/// One observed environment transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionSample<'a> {
    pub state: &'a [f64],
    pub action: &'a [f64],
    pub new_state: &'a [f64],
    pub reward: f64,
    pub failed: bool,
    pub done: bool,
}

/// Safety measure learned by a regressor over a state-action space.
///
/// The regressor estimates, for every state-action pair, the fraction of the
/// next state's actions that keep the agent recoverable. Failures are recorded
/// as permanent zeros.
#[derive(Debug, Clone)]
pub struct SafetyMeasure<R> {
    space: StateActionSpace,
    gp: R,
    gamma_measure: f64,
}

impl<R: Regressor> SafetyMeasure<R> {
    pub fn new(space: StateActionSpace, gp: R, gamma_measure: f64) -> SafetyResult<Self> {
        if !(gamma_measure.is_finite() && gamma_measure > 0.0 && gamma_measure <= 1.0) {
            return Err(SafetyError::InvalidGammaMeasure(gamma_measure));
        }
        if gp.input_dim() != space.dim() {
            return Err(SafetyError::RegressorDimension {
                regressor: gp.input_dim(),
                space: space.dim(),
            });
        }
        Ok(Self {
            space,
            gp,
            gamma_measure,
        })
    }

    pub fn space(&self) -> &StateActionSpace {
        &self.space
    }

    pub fn gp(&self) -> &R {
        &self.gp
    }

    pub fn gamma_measure(&self) -> f64 {
        self.gamma_measure
    }

    pub fn state_dict(&self) -> SafetyStateDict {
        SafetyStateDict {
            gamma_measure: self.gamma_measure,
        }
    }

    /// Fraction of actions that are in the `(lambda, gamma)` level set, per state.
    ///
    /// `gamma_threshold` defaults to the measure's `gamma_measure`.
    pub fn measure(
        &self,
        states: StateQuery,
        lambda_threshold: f64,
        gamma_threshold: Option<f64>,
    ) -> SafetyResult<Array1<f64>> {
        let thresholds = Thresholds::single(
            lambda_threshold,
            gamma_threshold.unwrap_or(self.gamma_measure),
        )?;
        let output = self.level_set(states, &thresholds, LevelSetOptions::default())?;
        let level_set = output.level_set();
        let measure = level_set
            .axis_iter(Axis(0))
            .map(|actions| {
                let inside = actions.iter().filter(|inside| **inside).count();
                inside as f64 / actions.len() as f64
            })
            .collect::<Array1<f64>>();
        Ok(measure)
    }

    /// Whether a single state-action pair is in the `(lambda, gamma)` level set.
    pub fn is_in_level_set(
        &self,
        state: &[f64],
        action: &[f64],
        lambda_threshold: f64,
        gamma_threshold: f64,
    ) -> SafetyResult<bool> {
        let thresholds = Thresholds::single(lambda_threshold, gamma_threshold)?;
        let point = self.space.stateaction(state, action)?;
        let prediction = self.gp.query(
            aview1(&point).insert_axis(Axis(0)),
            QueryOptions::with_variance(),
        )?;
        let output = evaluate(prediction, &[1], &thresholds, LevelSetOptions::default())?;
        Ok(output.level_set().iter().any(|inside| *inside))
    }

    /// Evaluates every threshold pair on `states` paired with the whole
    /// action grid, from a single regressor inference.
    #[instrument(level = "debug", skip(self, thresholds), fields(pairs = thresholds.len()))]
    pub fn level_set(
        &self,
        states: StateQuery,
        thresholds: &Thresholds,
        options: LevelSetOptions,
    ) -> SafetyResult<LevelSetOutput> {
        let states = states.resolve(self.space.state_space())?;
        let grid = self.space.grid_for_states(states.view())?;
        let mut shape = vec![states.nrows()];
        shape.extend(self.space.action_space().shape());

        let prediction = self.gp.query(
            grid.view(),
            QueryOptions {
                variance: true,
                covariance_matrix: options.return_covar_matrix,
            },
        )?;
        evaluate(prediction, &shape, thresholds, options)
    }

    /// Records one transition and returns the value written for `(state, action)`.
    ///
    /// A failure writes `0.0` as a permanent row and ignores `measure`. Otherwise
    /// the target is `measure` when given, or the measure of `new_state`.
    pub fn update(
        &mut self,
        sample: TransitionSample<'_>,
        measure: Option<f64>,
    ) -> SafetyResult<Array1<f64>> {
        let target = if sample.failed {
            array![0.0]
        } else if let Some(value) = measure {
            array![value]
        } else {
            self.measure(StateQuery::from(sample.new_state), 0.0, None)?
        };
        let point = self.space.stateaction(sample.state, sample.action)?;
        let flags = RetentionFlags {
            forgettable: !sample.failed,
            make_forget: !sample.failed,
            unskippable: sample.failed,
        };
        let outcome =
            self.gp
                .append_data(aview1(&point).insert_axis(Axis(0)), target.view(), &[flags])?;
        debug!(
            failed = sample.failed,
            done = sample.done,
            reward = sample.reward,
            target = target[0],
            evicted = outcome.evicted,
            "safety measure updated"
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::{SafetyMeasure, TransitionSample};
    use crate::testing::{CapturedLogs, ScriptedRegressor};
    use crate::{LevelSetOptions, SafetyError, StateQuery, Thresholds};
    use edge_inference::RetentionFlags;
    use edge_space::{Axis, ProductSpace, StateActionSpace};
    use ndarray::array;
    use proptest::prelude::*;

    fn space() -> StateActionSpace {
        StateActionSpace::new(
            ProductSpace::new(vec![Axis::discrete(4).expect("axis")]).expect("state"),
            ProductSpace::new(vec![Axis::new(0.0, 1.0, 5).expect("axis")]).expect("action"),
        )
    }

    fn action_offset(offset: f64, variance: f64) -> ScriptedRegressor {
        ScriptedRegressor::new(2, variance, move |point| point[1] - offset)
    }

    #[test]
    fn spec_c01_confident_mean_decides_membership_for_any_gamma() {
        let above = SafetyMeasure::new(space(), ScriptedRegressor::new(2, 1e-10, |_| 0.5), 0.5)
            .expect("measure");
        let below = SafetyMeasure::new(space(), ScriptedRegressor::new(2, 1e-10, |_| 0.1), 0.5)
            .expect("measure");
        for gamma in [0.01, 0.5, 0.9, 0.999] {
            assert!(above
                .is_in_level_set(&[1.0], &[0.5], 0.2, gamma)
                .expect("query"));
            assert!(!below
                .is_in_level_set(&[1.0], &[0.5], 0.2, gamma)
                .expect("query"));
        }
    }

    #[test]
    fn spec_c02_multiple_thresholds_use_one_inference_and_match_single_calls() {
        let measure = SafetyMeasure::new(space(), action_offset(0.3, 0.04), 0.6).expect("measure");
        let thresholds = Thresholds::zip(&[0.0, 0.2, 0.5], &[0.6, 0.9, 0.3]).expect("thresholds");

        let before = measure.gp().calls();
        let joint = measure
            .level_set(StateQuery::All, &thresholds, LevelSetOptions::with_proba())
            .expect("joint");
        assert_eq!(measure.gp().calls() - before, 1);
        assert_eq!(joint.level_sets.len(), 3);

        let probabilities = joint.probabilities.as_ref().expect("probabilities");
        for (index, pair) in thresholds.pairs().iter().enumerate() {
            let single = measure
                .level_set(
                    StateQuery::All,
                    &Thresholds::single(pair.lambda(), pair.gamma()).expect("single"),
                    LevelSetOptions::with_proba(),
                )
                .expect("single call");
            assert_eq!(&joint.level_sets[index], single.level_set());
            assert_eq!(Some(&probabilities[index]), single.probability());
        }
        assert_eq!(measure.gp().calls() - before, 4);
    }

    #[test]
    fn spec_c03_failed_update_writes_permanent_zero_and_ignores_override() {
        let mut measure =
            SafetyMeasure::new(space(), action_offset(0.4, 1e-4), 0.5).expect("measure");
        let written = measure
            .update(
                TransitionSample {
                    state: &[1.0],
                    action: &[0.25],
                    new_state: &[0.0],
                    reward: 0.0,
                    failed: true,
                    done: true,
                },
                Some(0.9),
            )
            .expect("update");

        assert_eq!(written, array![0.0]);
        let appended = measure.gp().appended();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].0, vec![1.0, 0.25]);
        assert_eq!(appended[0].1, 0.0);
        assert_eq!(
            appended[0].2,
            RetentionFlags {
                forgettable: false,
                make_forget: false,
                unskippable: true,
            }
        );
    }

    #[test]
    fn spec_c04_successful_update_bootstraps_or_uses_override() {
        let mut measure =
            SafetyMeasure::new(space(), action_offset(0.4, 1e-4), 0.5).expect("measure");
        let sample = TransitionSample {
            state: &[2.0],
            action: &[0.75],
            new_state: &[3.0],
            reward: 1.0,
            failed: false,
            done: false,
        };

        let bootstrapped = measure.update(sample, None).expect("bootstrap");
        assert_eq!(bootstrapped, array![0.6]);

        let overridden = measure.update(sample, Some(0.7)).expect("override");
        assert_eq!(overridden, array![0.7]);

        let appended = measure.gp().appended();
        assert_eq!(appended[0].1, 0.6);
        assert_eq!(appended[1].1, 0.7);
        assert_eq!(
            appended[1].2,
            RetentionFlags {
                forgettable: true,
                make_forget: true,
                unskippable: false,
            }
        );
    }

    #[test]
    fn spec_c07_negative_variance_falls_back_to_absolute_value() {
        let measure = SafetyMeasure::new(space(), action_offset(0.5, -0.01), 0.5).expect("measure");
        let output = measure
            .level_set(
                StateQuery::Single(vec![1.0]),
                &Thresholds::single(0.0, 0.5).expect("thresholds"),
                LevelSetOptions::with_proba_and_covar(),
            )
            .expect("level set");

        let diagnostic = output.diagnostic.expect("diagnostic");
        assert_eq!(diagnostic.negative_entries, 5);
        assert_eq!(diagnostic.most_negative, -0.01);

        let probability = output.probability().expect("probability");
        // mean - lambda = action - 0.5
        let expected = crate::normal::standard_normal_cdf(0.5 / 0.01_f64.sqrt());
        assert!((probability[[0, 4]] - expected).abs() < 1e-12);
        assert_eq!(probability[[0, 2]], 0.5);
        assert_eq!(
            output.level_set().iter().copied().collect::<Vec<_>>(),
            vec![false, false, false, true, true]
        );
    }

    #[test]
    fn spec_c07_degenerate_variance_warns_once_per_level_set_call() {
        let measure = SafetyMeasure::new(space(), action_offset(0.5, -0.01), 0.5).expect("measure");
        let thresholds = Thresholds::zip(&[0.0, 0.2], &[0.5, 0.9]).expect("thresholds");
        let logs = CapturedLogs::default();
        logs.capture(|| {
            measure
                .level_set(StateQuery::All, &thresholds, LevelSetOptions::default())
                .expect("level set");
        });
        assert_eq!(logs.count("degenerate posterior variance"), 1);

        let values = logs.capture(|| {
            measure
                .measure(StateQuery::All, 0.0, None)
                .expect("measure")
        });
        assert_eq!(logs.count("degenerate posterior variance"), 2);
        assert_eq!(values.len(), 4);

        let healthy = SafetyMeasure::new(space(), action_offset(0.5, 0.01), 0.5).expect("measure");
        let quiet = CapturedLogs::default();
        quiet.capture(|| {
            healthy
                .measure(StateQuery::All, 0.0, None)
                .expect("measure")
        });
        assert_eq!(quiet.count("degenerate posterior variance"), 0);
    }

    #[test]
    fn regression_nan_variance_is_never_in_the_level_set() {
        let gp = ScriptedRegressor::new(2, f64::NAN, |_| 0.2);
        let measure = SafetyMeasure::new(space(), gp, 0.99).expect("measure");
        let output = measure
            .level_set(
                StateQuery::Single(vec![1.0]),
                &Thresholds::single(0.0, 0.99).expect("thresholds"),
                LevelSetOptions::with_proba(),
            )
            .expect("level set");
        assert!(output.level_set().iter().all(|inside| !*inside));
        assert!(output
            .probability()
            .expect("probability")
            .iter()
            .all(|probability| probability.is_nan()));
        let diagnostic = output.diagnostic.expect("diagnostic");
        assert_eq!(diagnostic.non_finite_entries, 5);
        assert_eq!(diagnostic.negative_entries, 0);

        assert_eq!(
            measure.measure(StateQuery::Single(vec![1.0]), 0.0, None).expect("measure"),
            array![0.0]
        );
        assert!(!measure
            .is_in_level_set(&[1.0], &[0.5], 0.0, 0.5)
            .expect("query"));
    }

    #[test]
    fn unit_measure_averages_level_set_over_actions() {
        let measure = SafetyMeasure::new(space(), action_offset(0.4, 1e-4), 0.5).expect("measure");
        let values = measure.measure(StateQuery::All, 0.0, None).expect("measure");
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|value| *value == 0.6));

        let single = measure
            .measure(StateQuery::Single(vec![2.0]), 0.0, Some(0.5))
            .expect("single");
        assert_eq!(single, array![0.6]);
    }

    #[test]
    fn unit_covariance_matrix_is_returned_only_on_request() {
        let measure = SafetyMeasure::new(space(), action_offset(0.4, 1e-2), 0.5).expect("measure");
        let thresholds = Thresholds::single(0.0, 0.5).expect("thresholds");
        let plain = measure
            .level_set(StateQuery::Range(0..2), &thresholds, LevelSetOptions::default())
            .expect("plain");
        assert!(plain.covariance_matrix.is_none());
        assert!(plain.probabilities.is_none());

        let full = measure
            .level_set(
                StateQuery::Range(0..2),
                &thresholds,
                LevelSetOptions {
                    return_covar_matrix: true,
                    ..LevelSetOptions::default()
                },
            )
            .expect("full");
        let matrix = full.covariance_matrix.as_ref().expect("matrix");
        assert_eq!(matrix.dim(), (10, 10));
        assert_eq!(full.level_set().shape(), &[2, 5]);
    }

    #[test]
    fn regression_invalid_gamma_and_dimension_are_rejected() {
        for gamma in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                SafetyMeasure::new(space(), ScriptedRegressor::new(2, 0.1, |_| 0.0), gamma),
                Err(SafetyError::InvalidGammaMeasure(_))
            ));
        }
        assert!(matches!(
            SafetyMeasure::new(space(), ScriptedRegressor::new(3, 0.1, |_| 0.0), 0.5),
            Err(SafetyError::RegressorDimension {
                regressor: 3,
                space: 2
            })
        ));
    }

    #[test]
    fn regression_update_outside_space_is_a_space_error() {
        let mut measure =
            SafetyMeasure::new(space(), action_offset(0.4, 1e-4), 0.5).expect("measure");
        let error = measure
            .update(
                TransitionSample {
                    state: &[1.0, 2.0],
                    action: &[0.5],
                    new_state: &[1.0],
                    reward: 0.0,
                    failed: true,
                    done: true,
                },
                None,
            )
            .expect_err("state has two coordinates");
        assert!(matches!(error, SafetyError::Space(_)));
        assert!(measure.gp().appended().is_empty());
    }

    proptest! {
        #[test]
        fn property_measure_stays_within_unit_interval(
            offset in -2.0f64..2.0,
            variance in -1.0f64..1.0,
            lambda in -1.0f64..1.0,
            gamma in 0.01f64..1.0,
        ) {
            let measure = SafetyMeasure::new(space(), action_offset(offset, variance), gamma)
                .expect("measure");
            let values = measure.measure(StateQuery::All, lambda, None).expect("measure");
            prop_assert_eq!(values.len(), 4);
            for value in values.iter() {
                prop_assert!((0.0..=1.0).contains(value));
            }
        }
    }
}
