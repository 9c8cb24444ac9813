//! A corridor environment for tests.
#![allow(dead_code)]
use anyhow::Result;
use candle_core::{Device, Tensor};
use qrdqn_candle_agent::{
    mlp::{Mlp, MlpConfig},
    opt::OptimizerConfig,
    qrdqn::{ExplorationScheduler, MaskTable, Qrdqn, QrdqnConfig, QrdqnModelConfig, StateEncoding},
    TensorBatch,
};
use qrdqn_core::{
    record::Record,
    replay_buffer::{SimpleReplayBuffer, SimpleStepProcessor},
    ActionSpace, Env, Step,
};

pub const N_STATES: usize = 5;
pub const N_ACTIONS: usize = 2;

#[derive(Clone, Debug)]
pub struct CorridorConfig {
    pub max_steps: usize,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self { max_steps: 20 }
    }
}

/// States `0..N_STATES` on a line; action 0 moves left, action 1 moves right.
///
/// Reaching the last state terminates the episode with reward 1, every other
/// step costs 0.01. Moving left is invalid in the first state. Observations
/// are one-hot rows of shape `(1, N_STATES)` and actions are `i64` tensors of
/// shape `(1,)`.
pub struct Corridor {
    state: usize,
    steps: usize,
    max_steps: usize,
}

impl Corridor {
    fn obs(&self) -> Result<Tensor> {
        StateEncoding::OneHot.encode(&[self.state], N_STATES, &Device::Cpu)
    }

    pub fn mask_table() -> MaskTable {
        let mut table = vec![vec![true; N_ACTIONS]; N_STATES];
        table[0][0] = false;
        MaskTable::new(table, StateEncoding::OneHot).unwrap()
    }
}

impl Env for Corridor {
    type Config = CorridorConfig;
    type Obs = Tensor;
    type Act = Tensor;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            state: 0,
            steps: 0,
            max_steps: config.max_steps,
        })
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete(N_ACTIONS)
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.state = 0;
        self.steps = 0;
        self.obs()
    }

    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        let a = a.flatten_all()?.to_vec1::<i64>()?[0];
        assert!(a != 0 || self.state != 0, "invalid action taken");
        self.state = match a {
            0 => self.state - 1,
            _ => self.state + 1,
        };
        self.steps += 1;

        let is_terminated = (self.state == N_STATES - 1) as i8;
        let is_truncated = (is_terminated == 0 && self.steps >= self.max_steps) as i8;
        let reward = if is_terminated == 1 { 1.0 } else { -0.01 };
        let step = Step::new(self.obs()?, a_tensor(a)?, reward, is_terminated, is_truncated);
        Ok((step, Record::empty()))
    }

    fn valid_actions(&self) -> Option<Vec<bool>> {
        Corridor::mask_table()
            .valid_actions(self.state)
            .map(|v| v.to_vec())
    }
}

pub fn a_tensor(a: i64) -> Result<Tensor> {
    Ok(Tensor::from_vec(vec![a], (1,), &Device::Cpu)?)
}

pub type ReplayBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;
pub type StepProc = SimpleStepProcessor<Corridor, TensorBatch, TensorBatch>;
pub type CorridorAgent = Qrdqn<Corridor, Mlp, ReplayBuffer>;

pub fn qrdqn_config(n_quantiles: usize) -> QrdqnConfig<MlpConfig> {
    QrdqnConfig::default()
        .model_config(
            QrdqnModelConfig::default()
                .q_config(MlpConfig::new(N_STATES, vec![16, 16], 0))
                .n_quantiles(n_quantiles),
        )
        .opt_config(OptimizerConfig::Adam { lr: 1e-2, eps: 1e-8 })
        .batch_size(8)
        .learning_starts(0)
        .target_update_interval(10)
        .exploration(ExplorationScheduler::new(1.0, 0.05, 0.5))
}

pub fn one_hot(states: &[usize]) -> Result<Tensor> {
    StateEncoding::OneHot.encode(states, N_STATES, &Device::Cpu)
}

/// Parameters of a network as `(name, values)`, sorted by name.
pub fn params(varmap: &candle_nn::VarMap) -> Result<Vec<(String, Vec<f32>)>> {
    let data = varmap.data().lock().unwrap();
    let mut params = vec![];
    for (k, v) in data.iter() {
        params.push((k.clone(), v.as_tensor().flatten_all()?.to_vec1::<f32>()?));
    }
    params.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(params)
}
