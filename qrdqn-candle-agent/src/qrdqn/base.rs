//! QR-DQN agent implemented with candle.
use super::{
    config::QrdqnConfig, select_action, ActionMask, DiagnosticsExporter, ExplorationScheduler,
    MaskSource, MaskTable, RiskPenaltyConfig, TargetNetworkManager, Which,
};
use crate::{
    model::SubModel1,
    util::{quantile_huber_loss, OutDim},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use log::debug;
use qrdqn_core::{
    error::CoreError,
    record::{Record, RecordValue},
    ActionSpace, Agent, Env, Policy, ReplayBufferBase, TransitionBatch,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    convert::TryInto,
    marker::PhantomData,
    path::{Path, PathBuf},
};

/// Risk-sensitive QR-DQN agent.
///
/// Observations and actions are exchanged as tensors: an observation is a
/// batch of feature vectors of shape `(batch, obs_dim)` and an action is an
/// `i64` tensor of shape `(batch,)`.
pub struct Qrdqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    R: ReplayBufferBase,
{
    nets: TargetNetworkManager<Q>,
    n_actions: usize,
    batch_size: usize,
    gradient_steps: usize,
    discount_factor: f64,
    tau: f64,
    target_update_interval: usize,
    learning_starts: usize,
    max_grad_norm: Option<f64>,
    risk: RiskPenaltyConfig,
    exploration: ExplorationScheduler,
    exploration_rate: f64,
    mask_source: Option<Box<dyn MaskSource>>,
    env_steps: usize,
    n_updates: usize,
    train: bool,
    device: Device,
    rng: SmallRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, R> Qrdqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    R: ReplayBufferBase,
{
    /// Constructs QR-DQN agent.
    ///
    /// Fails if `action_space` is not discrete or the configuration is out of range.
    pub fn build(config: QrdqnConfig<Q::Config>, action_space: &ActionSpace) -> Result<Self> {
        config.validate()?;
        let device = config.device.to_candle()?;
        let n_actions = action_space.n_discrete()?;
        let nets = TargetNetworkManager::build(
            config.model_config,
            &config.opt_config,
            action_space,
            device.clone(),
        )?;

        Ok(Self {
            nets,
            n_actions,
            batch_size: config.batch_size,
            gradient_steps: config.gradient_steps,
            discount_factor: config.discount_factor,
            tau: config.tau,
            target_update_interval: config.target_update_interval,
            learning_starts: config.learning_starts,
            max_grad_norm: config.max_grad_norm,
            risk: config.risk,
            exploration_rate: config.exploration.eps_initial,
            exploration: config.exploration,
            mask_source: None,
            env_steps: 0,
            n_updates: 0,
            train: config.train,
            device,
            rng: SmallRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        })
    }

    /// Sets the source of action masks of next states used for TD targets.
    pub fn with_mask_source(mut self, mask_source: Box<dyn MaskSource>) -> Self {
        self.mask_source = Some(mask_source);
        self
    }

    /// Returns the online and target networks.
    pub fn nets(&self) -> &TargetNetworkManager<Q> {
        &self.nets
    }

    /// Returns the risk penalty.
    pub fn risk(&self) -> &RiskPenaltyConfig {
        &self.risk
    }

    /// Returns the current exploration rate.
    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// Returns the number of gradient steps performed so far.
    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    /// Returns quantile estimates of the selected network, detached from the graph.
    pub fn quantiles(&self, which: Which, obs: &Tensor) -> Result<Tensor> {
        Ok(self.nets.forward(which, &obs.to_device(&self.device)?)?.detach())
    }

    fn check_mask(&self, batch_size: usize, mask: Option<&ActionMask>) -> Result<()> {
        match mask {
            Some(mask) if mask.shape() != (batch_size, self.n_actions) => {
                Err(CoreError::InvalidActionMask(format!(
                    "mask of shape {:?} for {} observations and {} actions",
                    mask.shape(),
                    batch_size,
                    self.n_actions
                ))
                .into())
            }
            _ => Ok(()),
        }
    }

    fn random_actions(&mut self, batch_size: usize, mask: Option<&ActionMask>) -> Result<Tensor> {
        let mut actions = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let a = match mask {
                Some(mask) => {
                    let valid = mask
                        .row(i)
                        .iter()
                        .enumerate()
                        .filter_map(|(a, v)| if *v { Some(a) } else { None })
                        .collect::<Vec<_>>();
                    valid[self.rng.gen_range(0..valid.len())]
                }
                None => self.rng.gen_range(0..self.n_actions),
            };
            actions.push(a as i64);
        }
        Ok(Tensor::from_vec(actions, (batch_size,), &self.device)?)
    }

    /// Returns actions for a batch of observations.
    ///
    /// Unless `deterministic`, a uniformly random valid action is taken with
    /// probability equal to the exploration rate. Otherwise the action is
    /// greedy on the online network under the risk penalty.
    pub fn predict(
        &mut self,
        obs: &Tensor,
        deterministic: bool,
        mask: Option<&ActionMask>,
    ) -> Result<Tensor> {
        let batch_size = obs.dim(0)?;
        self.check_mask(batch_size, mask)?;
        if !deterministic && self.rng.gen::<f64>() < self.exploration_rate {
            self.random_actions(batch_size, mask)
        } else {
            let quantiles = self.quantiles(Which::Online, obs)?;
            select_action(&quantiles, &self.risk, mask)
        }
    }

    /// Returns TD targets of shape `(batch, n_quantiles)`.
    ///
    /// The next action is greedy on the target network under the risk penalty,
    /// restricted by the mask source if any. Truncated transitions bootstrap;
    /// only `is_terminated` cuts the return.
    pub fn td_target(
        &self,
        next_obs: &Tensor,
        reward: &[f32],
        is_terminated: &[i8],
    ) -> Result<Tensor> {
        let next_quantiles = self.quantiles(Which::Target, next_obs)?;
        let (batch_size, n_quantiles, _) = next_quantiles.dims3()?;

        let mask = match &self.mask_source {
            Some(source) => Some(source.masks(next_obs)?),
            None => None,
        };
        let next_act = select_action(&next_quantiles, &self.risk, mask.as_ref())?
            .reshape((batch_size, 1, 1))?
            .broadcast_as((batch_size, n_quantiles, 1))?
            .contiguous()?;
        let next_quantiles = next_quantiles.gather(&next_act, 2)?.squeeze(2)?;

        let reward = Tensor::from_slice(reward, (batch_size, 1), &self.device)?;
        let not_done = is_terminated
            .iter()
            .map(|d| 1f32 - *d as f32)
            .collect::<Vec<_>>();
        let not_done = Tensor::from_vec(not_done, (batch_size, 1), &self.device)?;
        let tgt = reward.broadcast_add(
            &(not_done.broadcast_mul(&next_quantiles)? * self.discount_factor)?,
        )?;

        Ok(tgt.detach())
    }

    fn update(
        &mut self,
        obs: Tensor,
        act: Tensor,
        next_obs: Tensor,
        reward: Vec<f32>,
        is_terminated: Vec<i8>,
    ) -> Result<f32> {
        let obs = obs.to_device(&self.device)?;
        let next_obs = next_obs.to_device(&self.device)?;
        let tgt = self.td_target(&next_obs, &reward, &is_terminated)?;

        let pred = {
            let quantiles = self.nets.forward(Which::Online, &obs)?;
            let (batch_size, n_quantiles, _) = quantiles.dims3()?;
            let act = act
                .to_device(&self.device)?
                .to_dtype(DType::I64)?
                .reshape((batch_size, 1, 1))?
                .broadcast_as((batch_size, n_quantiles, 1))?
                .contiguous()?;
            quantiles.gather(&act, 2)?.squeeze(2)?
        };

        let loss = quantile_huber_loss(&pred, &tgt, true)?;
        let grad_norm = self.nets.backward_step(&loss, self.max_grad_norm)?;
        let loss = loss.to_scalar::<f32>()?;
        debug!("loss = {}, grad_norm = {}", loss, grad_norm);
        Ok(loss)
    }

    /// Performs `gradient_steps` gradient steps on batches of `batch_size` transitions.
    ///
    /// Returns `train/loss`, the mean loss over the steps, and `train/n_updates`,
    /// the number of gradient steps since construction.
    pub fn train_steps(
        &mut self,
        buffer: &mut R,
        gradient_steps: usize,
        batch_size: usize,
    ) -> Result<Record>
    where
        <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
        <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
    {
        let mut losses = Vec::with_capacity(gradient_steps);

        for _ in 0..gradient_steps {
            let batch = buffer.batch(batch_size)?;
            let (obs, act, next_obs, reward, is_terminated, _is_truncated) = batch.unpack();
            let loss = self.update(
                obs.try_into()?,
                act.try_into()?,
                next_obs.try_into()?,
                reward,
                is_terminated,
            )?;
            losses.push(loss);
            self.n_updates += 1;
        }

        let mut record = Record::empty();
        if !losses.is_empty() {
            let loss = losses.iter().sum::<f32>() / losses.len() as f32;
            record.insert("train/loss", RecordValue::Scalar(loss));
        }
        record.insert("train/n_updates", RecordValue::Scalar(self.n_updates as f32));
        Ok(record)
    }

    /// Writes the target network's quantiles of every state of `table`
    /// with [`DiagnosticsExporter`].
    pub fn export_diagnostics(
        &self,
        exporter: &DiagnosticsExporter,
        table: &MaskTable,
    ) -> Result<(Vec<PathBuf>, Record)> {
        let obs = table.all_states(&self.device)?;
        let quantiles = self.quantiles(Which::Target, &obs)?;
        exporter.export(&quantiles, table, self.risk.variance_weight(), self.discount_factor)
    }
}

impl<E, Q, R> Policy<E> for Qrdqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
{
    /// Samples an action.
    ///
    /// In training mode, actions are uniformly random until `learning_starts`
    /// environment steps, then epsilon-greedy. In evaluation mode, actions are greedy.
    fn sample(&mut self, obs: &E::Obs, valid_actions: Option<&[bool]>) -> Result<E::Act> {
        let obs: Tensor = obs.clone().into();
        let batch_size = obs.dim(0)?;
        let mask = match valid_actions {
            Some(v) => Some(ActionMask::broadcast(v, batch_size)?),
            None => None,
        };
        self.check_mask(batch_size, mask.as_ref())?;

        let act = if self.train && self.env_steps < self.learning_starts {
            self.random_actions(batch_size, mask.as_ref())?
        } else {
            self.predict(&obs, !self.train, mask.as_ref())?
        };
        Ok(act.into())
    }
}

impl<E, Q, R> Agent<E, R> for Qrdqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
    <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        self.train_steps(buffer, self.gradient_steps, self.batch_size)
    }

    fn on_env_step(&mut self, env_steps: usize, progress_remaining: f64) -> Result<Record> {
        self.env_steps = env_steps;
        if env_steps % self.target_update_interval == 0 {
            self.nets.sync_soft(self.tau)?;
        }
        self.exploration_rate = self.exploration.rate(progress_remaining);

        Ok(Record::from_scalar(
            "rollout/exploration_rate",
            self.exploration_rate as f32,
        ))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.nets.save(path)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.nets.load(path)
    }
}
