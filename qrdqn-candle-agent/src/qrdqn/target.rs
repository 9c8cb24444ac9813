use super::{QrdqnModel, QrdqnModelConfig};
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{copy_vars, track, OutDim},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use log::{info, trace};
use qrdqn_core::{error::CoreError, ActionSpace};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

/// Selects one of the networks of [`TargetNetworkManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    /// The network trained by gradient descent.
    Online,

    /// The network providing TD targets.
    Target,
}

/// Owns the online and target quantile networks and the optimizer of the online one.
///
/// The target network is updated only by [`TargetNetworkManager::sync_hard`]
/// and [`TargetNetworkManager::sync_soft`].
pub struct TargetNetworkManager<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    online: QrdqnModel<Q>,
    target: QrdqnModel<Q>,
    opt: Optimizer,
}

impl<Q> TargetNetworkManager<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Builds both networks and copies the online parameters into the target.
    pub fn build(
        model_config: QrdqnModelConfig<Q::Config>,
        opt_config: &OptimizerConfig,
        action_space: &ActionSpace,
        device: Device,
    ) -> Result<Self> {
        let online = QrdqnModel::build(model_config.clone(), action_space, device.clone())?;
        let target = QrdqnModel::build(model_config, action_space, device)?;
        let opt = opt_config.build(online.get_varmap().all_vars())?;
        let manager = Self {
            online,
            target,
            opt,
        };
        manager.sync_hard()?;
        Ok(manager)
    }

    /// Copies the online parameters into the target network.
    pub fn sync_hard(&self) -> Result<()> {
        trace!("Hard update of the target network");
        copy_vars(self.target.get_varmap(), self.online.get_varmap())
    }

    /// Polyak update: `target = tau * online + (1 - tau) * target`.
    ///
    /// `tau = 1` is a hard copy and `tau = 0` leaves the target unchanged.
    pub fn sync_soft(&self, tau: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&tau) {
            return Err(CoreError::InvalidConfig(format!("tau = {} is out of [0, 1]", tau)).into());
        }
        if tau == 1.0 {
            self.sync_hard()
        } else if tau == 0.0 {
            Ok(())
        } else {
            trace!("Soft update of the target network, tau = {}", tau);
            track(self.target.get_varmap(), self.online.get_varmap(), tau)
        }
    }

    /// Returns quantile estimates of the selected network.
    pub fn forward(&self, which: Which, obs: &Tensor) -> Result<Tensor> {
        match which {
            Which::Online => self.online.forward(obs),
            Which::Target => self.target.forward(obs),
        }
    }

    /// Updates the online network to decrease `loss`.
    ///
    /// Returns the gradient norm before clipping.
    pub fn backward_step(&mut self, loss: &Tensor, max_grad_norm: Option<f64>) -> Result<f32> {
        self.opt.backward_step(loss, max_grad_norm)
    }

    /// Returns the online network.
    pub fn online(&self) -> &QrdqnModel<Q> {
        &self.online
    }

    /// Returns the target network.
    pub fn target(&self) -> &QrdqnModel<Q> {
        &self.target
    }

    /// Saves both networks in `dir` as `online.safetensors` and `target.safetensors`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.online.save(dir.join("online.safetensors"))?;
        self.target.save(dir.join("target.safetensors"))?;
        info!("Save online and target networks to {:?}", dir);
        Ok(())
    }

    /// Loads both networks saved with [`TargetNetworkManager::save`].
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.online.load(dir.join("online.safetensors"))?;
        self.target.load(dir.join("target.safetensors"))?;
        info!("Load online and target networks from {:?}", dir);
        Ok(())
    }
}
