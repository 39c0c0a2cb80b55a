use crate::{SafetyError, SafetyResult};

/// One `(lambda, gamma)` query: "is `P(measure >= lambda)` above `gamma`?".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPair {
    lambda: f64,
    gamma: f64,
}

impl ThresholdPair {
    pub fn new(lambda: f64, gamma: f64) -> SafetyResult<Self> {
        if !lambda.is_finite() {
            return Err(SafetyError::InvalidThreshold {
                name: "lambda",
                value: lambda,
            });
        }
        if !gamma.is_finite() {
            return Err(SafetyError::InvalidThreshold {
                name: "gamma",
                value: gamma,
            });
        }
        Ok(Self { lambda, gamma })
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

/// Non-empty ordered sequence of threshold pairs evaluated against a single
/// regressor inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pairs: Vec<ThresholdPair>,
}

impl Thresholds {
    pub fn new(pairs: Vec<ThresholdPair>) -> SafetyResult<Self> {
        if pairs.is_empty() {
            return Err(SafetyError::EmptyThresholds);
        }
        Ok(Self { pairs })
    }

    pub fn single(lambda: f64, gamma: f64) -> SafetyResult<Self> {
        Ok(Self {
            pairs: vec![ThresholdPair::new(lambda, gamma)?],
        })
    }

    /// Pairs `lambdas[i]` with `gammas[i]`; both lists must have the same length.
    pub fn zip(lambdas: &[f64], gammas: &[f64]) -> SafetyResult<Self> {
        if lambdas.len() != gammas.len() {
            return Err(SafetyError::ThresholdLengthMismatch {
                lambda: lambdas.len(),
                gamma: gammas.len(),
            });
        }
        let pairs = lambdas
            .iter()
            .zip(gammas)
            .map(|(lambda, gamma)| ThresholdPair::new(*lambda, *gamma))
            .collect::<SafetyResult<Vec<_>>>()?;
        Self::new(pairs)
    }

    pub fn pairs(&self) -> &[ThresholdPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
