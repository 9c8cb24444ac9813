//! Configuration of QR-DQN agent.
use super::{ExplorationScheduler, QrdqnModelConfig, RiskPenaltyConfig};
use crate::{opt::OptimizerConfig, util::OutDim, Device};
use anyhow::Result;
use log::info;
use qrdqn_core::error::CoreError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Qrdqn`](super::Qrdqn) agent.
///
/// `C` is the configuration of the network mapping observations to quantiles.
pub struct QrdqnConfig<C>
where
    C: OutDim,
{
    pub(super) model_config: QrdqnModelConfig<C>,
    pub(super) opt_config: OptimizerConfig,
    pub(super) batch_size: usize,
    pub(super) gradient_steps: usize,
    pub(super) discount_factor: f64,
    pub(super) tau: f64,
    pub(super) target_update_interval: usize,
    pub(super) learning_starts: usize,
    pub(super) exploration: ExplorationScheduler,
    pub(super) max_grad_norm: Option<f64>,
    #[serde(default)]
    pub(super) risk: RiskPenaltyConfig,
    pub(super) seed: u64,
    pub(super) train: bool,
    pub device: Device,
}

impl<C> Default for QrdqnConfig<C>
where
    C: OutDim,
{
    fn default() -> Self {
        Self {
            model_config: Default::default(),
            opt_config: OptimizerConfig::qrdqn_default(32),
            batch_size: 32,
            gradient_steps: 1,
            discount_factor: 0.99,
            tau: 1.0,
            target_update_interval: 10_000,
            learning_starts: 50_000,
            exploration: ExplorationScheduler::default(),
            max_grad_norm: None,
            risk: RiskPenaltyConfig::None,
            seed: 42,
            train: false,
            device: Device::Cpu,
        }
    }
}

impl<C> QrdqnConfig<C>
where
    C: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the model.
    pub fn model_config(mut self, model_config: QrdqnModelConfig<C>) -> Self {
        self.model_config = model_config;
        self
    }

    /// Sets the configuration of the optimizer.
    pub fn opt_config(mut self, opt_config: OptimizerConfig) -> Self {
        self.opt_config = opt_config;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of gradient steps per optimization.
    pub fn gradient_steps(mut self, v: usize) -> Self {
        self.gradient_steps = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the Polyak coefficient of target updates.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the interval of target updates in environment steps.
    pub fn target_update_interval(mut self, v: usize) -> Self {
        self.target_update_interval = v;
        self
    }

    /// Sets the number of environment steps with uniformly random actions.
    ///
    /// Typically equal to
    /// [`TrainerConfig::learning_starts`](qrdqn_core::TrainerConfig).
    pub fn learning_starts(mut self, v: usize) -> Self {
        self.learning_starts = v;
        self
    }

    /// Sets the exploration schedule.
    pub fn exploration(mut self, v: ExplorationScheduler) -> Self {
        self.exploration = v;
        self
    }

    /// Sets the maximum global norm of gradients.
    pub fn max_grad_norm(mut self, v: Option<f64>) -> Self {
        self.max_grad_norm = v;
        self
    }

    /// Sets the risk penalty of the greedy criterion.
    pub fn risk(mut self, v: RiskPenaltyConfig) -> Self {
        self.risk = v;
        self
    }

    /// Sets the random seed of exploration.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Returns the risk penalty.
    pub fn get_risk(&self) -> &RiskPenaltyConfig {
        &self.risk
    }

    /// Returns the discount factor.
    pub fn get_discount_factor(&self) -> f64 {
        self.discount_factor
    }

    /// Checks the ranges of the parameters.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(CoreError::InvalidConfig(format!(
                "tau = {} is out of [0, 1]",
                self.tau
            )));
        }
        if self.batch_size == 0 || self.target_update_interval == 0 {
            return Err(CoreError::InvalidConfig(
                "batch_size and target_update_interval must be positive".to_string(),
            ));
        }
        let ExplorationScheduler {
            eps_initial,
            eps_final,
            exploration_fraction,
        } = self.exploration;
        if !(0.0..=1.0).contains(&eps_initial) || !(0.0..=1.0).contains(&eps_final) {
            return Err(CoreError::InvalidConfig(format!(
                "exploration rates ({}, {}) are out of [0, 1]",
                eps_initial, eps_final
            )));
        }
        if !(0.0..=1.0).contains(&exploration_fraction) {
            return Err(CoreError::InvalidConfig(format!(
                "exploration_fraction = {} is out of [0, 1]",
                exploration_fraction
            )));
        }
        if self.model_config.n_quantiles == 0 {
            return Err(CoreError::InvalidConfig(
                "n_quantiles must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Constructs [`QrdqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b: Self = serde_yaml::from_reader(rdr)?;
        b.validate()?;
        info!("Load config of QR-DQN agent from {}", path_.to_str().unwrap_or("?"));
        Ok(b)
    }

    /// Saves [`QrdqnConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of QR-DQN agent into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_serde_qrdqn_config() -> Result<()> {
        let config = QrdqnConfig::default()
            .model_config(
                QrdqnModelConfig::default()
                    .q_config(MlpConfig::new(4, vec![64, 64], 0))
                    .n_quantiles(50),
            )
            .risk(RiskPenaltyConfig::Variance { weight: 0.5 })
            .max_grad_norm(Some(10.0))
            .tau(0.5);

        let dir = TempDir::new("qrdqn_config")?;
        let path = dir.path().join("qrdqn_config.yaml");
        config.save(&path)?;
        let config_ = QrdqnConfig::<MlpConfig>::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn tau_out_of_range_is_rejected() {
        let config = QrdqnConfig::<MlpConfig>::default().tau(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn exploration_out_of_range_is_rejected() {
        let config = QrdqnConfig::<MlpConfig>::default()
            .exploration(ExplorationScheduler::new(1.0, 0.05, -0.1));
        assert!(config.validate().is_err());
        let config = QrdqnConfig::<MlpConfig>::default()
            .exploration(ExplorationScheduler::new(1.5, 0.05, 0.1));
        assert!(config.validate().is_err());
        let config = QrdqnConfig::<MlpConfig>::default()
            .exploration(ExplorationScheduler::new(1.0, 0.05, f64::NAN));
        assert!(config.validate().is_err());
        let config = QrdqnConfig::<MlpConfig>::default()
            .exploration(ExplorationScheduler::new(1.0, 0.05, 0.0));
        assert!(config.validate().is_ok());
    }
}
