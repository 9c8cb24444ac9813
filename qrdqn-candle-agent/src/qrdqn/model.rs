use crate::{model::SubModel1, util::OutDim};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use qrdqn_core::ActionSpace;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`QrdqnModel`].
pub struct QrdqnModelConfig<Q>
where
    Q: OutDim,
{
    pub(super) q_config: Option<Q>,
    pub(super) n_quantiles: usize,
}

impl<Q> Default for QrdqnModelConfig<Q>
where
    Q: OutDim,
{
    fn default() -> Self {
        Self {
            q_config: None,
            n_quantiles: 200,
        }
    }
}

impl<Q> QrdqnModelConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations of the network mapping features to quantiles.
    ///
    /// Its output dimension is overwritten with `n_quantiles * n_actions`
    /// when the model is built.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the number of quantiles.
    pub fn n_quantiles(mut self, v: usize) -> Self {
        self.n_quantiles = v;
        self
    }

    /// Returns the number of quantiles.
    pub fn get_n_quantiles(&self) -> usize {
        self.n_quantiles
    }

    /// Constructs [`QrdqnModelConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`QrdqnModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Quantile network.
///
/// Maps a batch of observations to quantile estimates of shape
/// `(batch, n_quantiles, n_actions)`. The output of the inner network
/// is reshaped row-major, quantile-major.
pub struct QrdqnModel<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    device: Device,
    varmap: VarMap,
    n_quantiles: usize,
    n_actions: usize,
    q: Q,
}

impl<Q> QrdqnModel<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`QrdqnModel`].
    ///
    /// Fails if `action_space` is not discrete.
    pub fn build(
        config: QrdqnModelConfig<Q::Config>,
        action_space: &ActionSpace,
        device: Device,
    ) -> Result<Self> {
        let n_actions = action_space.n_discrete()?;
        let n_quantiles = config.n_quantiles;
        let mut q_config = config.q_config.context("q_config is not set.")?;
        q_config.set_out_dim(n_quantiles * n_actions);

        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, q_config)?
        };

        Ok(Self {
            device,
            varmap,
            n_quantiles,
            n_actions,
            q,
        })
    }

    /// Returns quantile estimates of shape `(batch, n_quantiles, n_actions)`.
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        let batch_size = obs.dim(0)?;
        let xs = self.q.forward(obs)?;
        Ok(xs.reshape((batch_size, self.n_quantiles, self.n_actions))?)
    }

    /// Returns the number of quantiles.
    pub fn n_quantiles(&self) -> usize {
        self.n_quantiles
    }

    /// Returns the number of actions.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Returns the device of the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns the parameters.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters in the safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save qrdqn model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters saved with [`QrdqnModel::save`].
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load qrdqn model from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};

    fn config() -> QrdqnModelConfig<MlpConfig> {
        QrdqnModelConfig::default()
            .q_config(MlpConfig::new(4, vec![16], 0))
            .n_quantiles(7)
    }

    #[test]
    fn output_shape() -> Result<()> {
        let model = QrdqnModel::<Mlp>::build(config(), &ActionSpace::Discrete(3), Device::Cpu)?;
        let obs = Tensor::zeros((5, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(model.forward(&obs)?.dims(), &[5, 7, 3]);
        Ok(())
    }

    #[test]
    fn continuous_action_space_is_rejected() {
        let model =
            QrdqnModel::<Mlp>::build(config(), &ActionSpace::Continuous { dim: 2 }, Device::Cpu);
        assert!(model.is_err());
    }
}
