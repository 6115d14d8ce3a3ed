//! Two-parameter logistic IRT kernel: Fisher information and MAP ability
//! estimation under a standard-normal prior.

use crate::catalog::AssessmentItem;
use crate::errors::AssessmentError;

/// Logit clip bound; keeps exp() away from overflow.
const Z_CLIP: f64 = 30.0;
/// Ability estimates stay inside this range.
const THETA_CLIP: f64 = 10.0;
const SE_MIN: f64 = 0.01;
const SE_MAX: f64 = 2.0;
const MAX_ITERATIONS: usize = 50;
const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Converged ability estimate with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub standard_error: f64,
}

impl AbilityEstimate {
    /// Estimate returned before any response exists: prior mean, maximal
    /// uncertainty.
    pub fn prior() -> Self {
        Self {
            theta: 0.0,
            standard_error: SE_MAX,
        }
    }
}

/// Psychometric calculations the adaptive engine depends on.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PsychometricModel: Send + Sync {
    /// Fisher information of `item` at `ability`.
    fn information(&self, ability: f64, item: &AssessmentItem) -> Result<f64, AssessmentError>;

    /// MAP ability estimate from response scores and the items they answered.
    /// `scores[i]` must correspond to `items[i]`.
    fn estimate_ability(
        &self,
        scores: &[f64],
        items: &[AssessmentItem],
    ) -> Result<AbilityEstimate, AssessmentError>;
}

/// 2PL model with a N(prior_mean, prior_variance) prior on ability.
#[derive(Debug, Clone, Copy)]
pub struct TwoPlModel {
    prior_mean: f64,
    prior_variance: f64,
}

impl Default for TwoPlModel {
    fn default() -> Self {
        Self {
            prior_mean: 0.0,
            prior_variance: 1.0,
        }
    }
}

impl TwoPlModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probability of a correct response under the 2PL model, computed in the
    /// numerically stable branch.
    fn probability(&self, ability: f64, discrimination: f64, difficulty: f64) -> f64 {
        let z = (discrimination * (ability - difficulty)).clamp(-Z_CLIP, Z_CLIP);
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        }
    }

    /// Second derivative of the log-posterior at `theta` (always < 0 thanks to
    /// the prior term).
    fn log_posterior_curvature(&self, theta: f64, items: &[AssessmentItem]) -> f64 {
        let mut curvature = 0.0;
        for item in items {
            let a = item.discrimination();
            let p = self.probability(theta, a, item.difficulty());
            curvature -= a * a * p * (1.0 - p);
        }
        curvature - 1.0 / self.prior_variance
    }

    fn validate_inputs(
        &self,
        scores: &[f64],
        items: &[AssessmentItem],
    ) -> Result<(), AssessmentError> {
        if scores.len() != items.len() {
            return Err(AssessmentError::InvalidInput(format!(
                "response count {} does not match item count {}",
                scores.len(),
                items.len()
            )));
        }
        for item in items {
            item.parameters.validate()?;
        }
        for score in scores {
            if !score.is_finite() {
                return Err(AssessmentError::InvalidInput(
                    "non-finite response score".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl PsychometricModel for TwoPlModel {
    fn information(&self, ability: f64, item: &AssessmentItem) -> Result<f64, AssessmentError> {
        item.parameters.validate()?;
        if !ability.is_finite() {
            return Err(AssessmentError::InvalidInput(
                "non-finite ability estimate".to_string(),
            ));
        }

        let a = item.discrimination();
        let p = self.probability(ability, a, item.difficulty());
        Ok((a * a * p * (1.0 - p)).max(0.0))
    }

    fn estimate_ability(
        &self,
        scores: &[f64],
        items: &[AssessmentItem],
    ) -> Result<AbilityEstimate, AssessmentError> {
        self.validate_inputs(scores, items)?;

        if scores.is_empty() {
            return Ok(AbilityEstimate::prior());
        }

        // Newton-Raphson on the log-posterior, starting at the prior mean.
        let mut theta = self.prior_mean;

        for _ in 0..MAX_ITERATIONS {
            let mut first_deriv = 0.0;
            let mut second_deriv = 0.0;

            for (score, item) in scores.iter().zip(items) {
                let a = item.discrimination();
                let p = self.probability(theta, a, item.difficulty());
                first_deriv += a * (score - p);
                second_deriv -= a * a * p * (1.0 - p);
            }

            first_deriv -= (theta - self.prior_mean) / self.prior_variance;
            second_deriv -= 1.0 / self.prior_variance;

            // Non-concave step: stop moving and report the current estimate.
            if second_deriv >= 0.0 {
                break;
            }

            let theta_new = (theta - first_deriv / second_deriv).clamp(-THETA_CLIP, THETA_CLIP);

            if (theta_new - theta).abs() < CONVERGENCE_TOLERANCE {
                theta = theta_new;
                break;
            }
            theta = theta_new;
        }

        let information = -self.log_posterior_curvature(theta, items);
        let standard_error = if information > 0.0 {
            (1.0 / information.sqrt()).clamp(SE_MIN, SE_MAX)
        } else {
            SE_MAX
        };

        Ok(AbilityEstimate {
            theta,
            standard_error,
        })
    }
}
