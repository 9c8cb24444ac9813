//! Risk penalties on quantile estimates.
use anyhow::Result;
use candle_core::Tensor;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A correction applied to the expected values of actions.
pub trait PenaltyTerm {
    /// Returns `values` corrected with the penalty.
    ///
    /// `quantiles` has shape `(batch, n_quantiles, n_actions)` and `values`
    /// has shape `(batch, n_actions)`.
    fn apply(&self, quantiles: &Tensor, values: &Tensor) -> Result<Tensor>;
}

/// Subtracts `weight` times the standard deviation of the quantiles.
///
/// The standard deviation is the unbiased estimate (denominator
/// `n_quantiles - 1`). It is zero for a single quantile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariancePenalty {
    /// Weight of the standard deviation.
    pub weight: f64,
}

impl PenaltyTerm for VariancePenalty {
    fn apply(&self, quantiles: &Tensor, values: &Tensor) -> Result<Tensor> {
        let n_quantiles = quantiles.dim(1)?;
        if n_quantiles < 2 {
            return Ok(values.clone());
        }
        let centered = quantiles.broadcast_sub(&quantiles.mean_keepdim(1)?)?;
        let std = (centered.sqr()?.sum(1)? / (n_quantiles - 1) as f64)?.sqrt()?;
        Ok((values - (std * self.weight)?)?)
    }
}

/// Subtracts `weight` from the value of every action.
///
/// The correction is uniform across actions, so it never changes the
/// greedy action on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyPenalty {
    /// Subtracted constant.
    pub weight: f64,
}

impl PenaltyTerm for EntropyPenalty {
    fn apply(&self, _quantiles: &Tensor, values: &Tensor) -> Result<Tensor> {
        Ok((values - self.weight)?)
    }
}

/// Risk adjustment of the greedy criterion.
///
/// ```rust
/// use qrdqn_candle_agent::qrdqn::RiskPenaltyConfig;
/// use std::collections::HashMap;
///
/// let mut map = HashMap::new();
/// map.insert("var_penal".to_string(), 0.5);
/// let risk = RiskPenaltyConfig::from_map(&map);
/// assert_eq!(risk, RiskPenaltyConfig::Variance { weight: 0.5 });
/// ```
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum RiskPenaltyConfig {
    /// Risk-neutral: the value of an action is the mean of its quantiles.
    None,

    /// Mean minus `weight` times the standard deviation.
    Variance {
        /// Weight of the standard deviation.
        weight: f64,
    },

    /// Mean minus the constant `weight`.
    Entropy {
        /// Subtracted constant.
        weight: f64,
    },

    /// The variance penalty followed by the entropy penalty.
    Combined {
        /// Weight of the standard deviation.
        variance: f64,

        /// Subtracted constant.
        entropy: f64,
    },
}

impl Default for RiskPenaltyConfig {
    fn default() -> Self {
        Self::None
    }
}

impl RiskPenaltyConfig {
    /// Key of the variance penalty weight in legacy maps.
    pub const VAR_PENAL: &'static str = "var_penal";

    /// Key of the entropy penalty weight in legacy maps.
    pub const ENT_PENAL: &'static str = "ent_penal";

    /// Builds the configuration from a key-value map.
    ///
    /// Recognized keys are `var_penal` and `ent_penal`. Other keys are ignored.
    pub fn from_map(map: &HashMap<String, f64>) -> Self {
        for k in map.keys() {
            if k != Self::VAR_PENAL && k != Self::ENT_PENAL {
                warn!("Ignored unknown risk penalty key {:?}", k);
            }
        }

        match (map.get(Self::VAR_PENAL), map.get(Self::ENT_PENAL)) {
            (None, None) => Self::None,
            (Some(&weight), None) => Self::Variance { weight },
            (None, Some(&weight)) => Self::Entropy { weight },
            (Some(&variance), Some(&entropy)) => Self::Combined { variance, entropy },
        }
    }

    /// Weight of the variance penalty, zero if absent.
    pub fn variance_weight(&self) -> f64 {
        match self {
            Self::Variance { weight } => *weight,
            Self::Combined { variance, .. } => *variance,
            _ => 0.0,
        }
    }

    /// Returns the penalty terms in the order they are applied.
    pub fn terms(&self) -> Vec<Box<dyn PenaltyTerm>> {
        match *self {
            Self::None => vec![],
            Self::Variance { weight } => vec![Box::new(VariancePenalty { weight })],
            Self::Entropy { weight } => vec![Box::new(EntropyPenalty { weight })],
            Self::Combined { variance, entropy } => vec![
                Box::new(VariancePenalty { weight: variance }),
                Box::new(EntropyPenalty { weight: entropy }),
            ],
        }
    }

    /// Returns the risk-adjusted value of every action.
    ///
    /// `quantiles` has shape `(batch, n_quantiles, n_actions)`; the result has
    /// shape `(batch, n_actions)`.
    pub fn action_values(&self, quantiles: &Tensor) -> Result<Tensor> {
        let mut values = quantiles.mean(1)?;
        for term in self.terms().iter() {
            values = term.apply(quantiles, &values)?;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn quantiles() -> Result<Tensor> {
        // One state, three quantiles, two actions:
        // action 0: (0, 2, 4), mean 2, std 2
        // action 1: (1, 1, 1), mean 1, std 0
        Ok(Tensor::from_slice(
            &[0f32, 1., 2., 1., 4., 1.],
            (1, 3, 2),
            &Device::Cpu,
        )?)
    }

    #[test]
    fn from_map_recognizes_keys() {
        let mut map = HashMap::new();
        assert_eq!(RiskPenaltyConfig::from_map(&map), RiskPenaltyConfig::None);

        map.insert("ent_penal".to_string(), 0.1);
        map.insert("unknown".to_string(), 3.0);
        assert_eq!(
            RiskPenaltyConfig::from_map(&map),
            RiskPenaltyConfig::Entropy { weight: 0.1 }
        );

        map.insert("var_penal".to_string(), 0.5);
        assert_eq!(
            RiskPenaltyConfig::from_map(&map),
            RiskPenaltyConfig::Combined {
                variance: 0.5,
                entropy: 0.1
            }
        );
    }

    #[test]
    fn variance_penalty_uses_unbiased_std() -> Result<()> {
        let values = RiskPenaltyConfig::Variance { weight: 0.5 }
            .action_values(&quantiles()?)?
            .to_vec2::<f32>()?;
        assert!((values[0][0] - 1.0).abs() < 1e-6);
        assert!((values[0][1] - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn combined_applies_both_terms() -> Result<()> {
        let risk = RiskPenaltyConfig::Combined {
            variance: 1.0,
            entropy: 0.25,
        };
        let values = risk.action_values(&quantiles()?)?.to_vec2::<f32>()?;
        assert!((values[0][0] - (2.0 - 2.0 - 0.25)).abs() < 1e-6);
        assert!((values[0][1] - (1.0 - 0.25)).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn single_quantile_has_no_variance_penalty() -> Result<()> {
        let q = Tensor::from_slice(&[3f32, -1.], (1, 1, 2), &Device::Cpu)?;
        let values = RiskPenaltyConfig::Variance { weight: 10.0 }
            .action_values(&q)?
            .to_vec2::<f32>()?;
        assert_eq!(values, vec![vec![3.0, -1.0]]);
        Ok(())
    }
}
