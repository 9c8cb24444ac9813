use anyhow::Result;
use candle_core::{Device, Tensor};
use clap::Parser;
use qrdqn_candle_agent::{
    mlp::{Mlp, MlpConfig},
    opt::OptimizerConfig,
    qrdqn::{
        DiagnosticsExporter, ExplorationScheduler, MaskTable, Qrdqn, QrdqnConfig,
        QrdqnModelConfig, RiskPenaltyConfig, StateEncoding,
    },
    TensorBatch,
};
use qrdqn_core::{
    record::{BufferedRecorder, Record},
    replay_buffer::{
        SimpleReplayBuffer, SimpleReplayBufferConfig, SimpleStepProcessor,
        SimpleStepProcessorConfig,
    },
    ActionSpace, Env, ReplayBufferBase, Step, Trainer, TrainerConfig,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::HashMap;

const N_ROWS: usize = 3;
const N_COLS: usize = 5;
const N_STATES: usize = N_ROWS * N_COLS;
const N_ACTIONS: usize = 4;
const START: (usize, usize) = (N_ROWS - 1, 0);
const GOAL: (usize, usize) = (N_ROWS - 1, N_COLS - 1);
const BATCH_SIZE: usize = 32;
const REPLAY_BUFFER_CAPACITY: usize = 10000;

mod cliff {
    use super::*;

    #[derive(Clone, Debug)]
    pub struct CliffConfig {
        pub slip_prob: f64,
        pub max_steps: usize,
    }

    impl Default for CliffConfig {
        fn default() -> Self {
            Self {
                slip_prob: 0.1,
                max_steps: 50,
            }
        }
    }

    /// A grid whose bottom row runs along a cliff.
    ///
    /// The agent starts in the bottom-left cell and the goal is the
    /// bottom-right cell. Walking right in the bottom row slips into the cliff
    /// with probability `slip_prob` (reward -1, episode ends). Reaching the
    /// goal gives reward 1, every other step costs 0.01. Actions are up, down,
    /// left and right; moves into the border are invalid.
    pub struct Cliff {
        pos: (usize, usize),
        steps: usize,
        config: CliffConfig,
        rng: SmallRng,
    }

    pub fn state_id(pos: (usize, usize)) -> usize {
        pos.0 * N_COLS + pos.1
    }

    pub fn valid_actions_at(pos: (usize, usize)) -> Vec<bool> {
        vec![pos.0 > 0, pos.0 < N_ROWS - 1, pos.1 > 0, pos.1 < N_COLS - 1]
    }

    pub fn mask_table() -> Result<MaskTable> {
        let table = (0..N_STATES)
            .map(|s| valid_actions_at((s / N_COLS, s % N_COLS)))
            .collect();
        Ok(MaskTable::new(table, StateEncoding::OneHot)?)
    }

    impl Cliff {
        fn obs(&self) -> Result<Tensor> {
            StateEncoding::OneHot.encode(&[state_id(self.pos)], N_STATES, &Device::Cpu)
        }
    }

    impl Env for Cliff {
        type Config = CliffConfig;
        type Obs = Tensor;
        type Act = Tensor;

        fn build(config: &Self::Config, seed: i64) -> Result<Self> {
            Ok(Self {
                pos: START,
                steps: 0,
                config: config.clone(),
                rng: SmallRng::seed_from_u64(seed as u64),
            })
        }

        fn action_space(&self) -> ActionSpace {
            ActionSpace::Discrete(N_ACTIONS)
        }

        fn reset(&mut self) -> Result<Tensor> {
            self.pos = START;
            self.steps = 0;
            self.obs()
        }

        fn step(&mut self, act: &Tensor) -> Result<(Step<Self>, Record)> {
            let a = act.flatten_all()?.to_vec1::<i64>()?[0];
            if !valid_actions_at(self.pos)[a as usize] {
                anyhow::bail!("Invalid action {} at {:?}", a, self.pos);
            }
            let (r, c) = self.pos;
            self.pos = match a {
                0 => (r - 1, c),
                1 => (r + 1, c),
                2 => (r, c - 1),
                _ => (r, c + 1),
            };
            self.steps += 1;

            let fell = r == N_ROWS - 1 && a == 3 && self.rng.gen::<f64>() < self.config.slip_prob;
            let (reward, is_terminated) = if fell {
                (-1.0, 1)
            } else if self.pos == GOAL {
                (1.0, 1)
            } else {
                (-0.01, 0)
            };
            let is_truncated = (is_terminated == 0 && self.steps >= self.config.max_steps) as i8;
            let act = Tensor::from_vec(vec![a], (1,), &Device::Cpu)?;
            let step = Step::new(self.obs()?, act, reward, is_terminated, is_truncated);
            Ok((step, Record::empty()))
        }

        fn valid_actions(&self) -> Option<Vec<bool>> {
            Some(valid_actions_at(self.pos))
        }
    }
}

use cliff::{Cliff, CliffConfig};

type ReplayBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;
type StepProc = SimpleStepProcessor<Cliff, TensorBatch, TensorBatch>;
type CliffAgent = Qrdqn<Cliff, Mlp, ReplayBuffer>;

fn parse_key_val(s: &str) -> Result<(String, f64), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    let v = v.parse::<f64>().map_err(|e| e.to_string())?;
    Ok((k.to_string(), v))
}

/// Train a risk-sensitive QR-DQN agent on a cliff walk and export its return distributions
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Risk penalty weights, e.g. `--risk var_penal=0.5`
    #[arg(long, value_parser = parse_key_val)]
    risk: Vec<(String, f64)>,

    /// Discount factor
    #[arg(long, default_value_t = 0.99)]
    gamma: f64,

    /// Number of environment steps
    #[arg(long, default_value_t = 20000)]
    total_timesteps: usize,

    /// Number of quantiles
    #[arg(long, default_value_t = 50)]
    n_quantiles: usize,

    /// Directory of the saved model and the exported distributions
    #[arg(long, default_value = "./model/qrdqn_cliff")]
    out_dir: String,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn agent_config(args: &Args) -> QrdqnConfig<MlpConfig> {
    let risk = RiskPenaltyConfig::from_map(&args.risk.iter().cloned().collect::<HashMap<_, _>>());
    let model_config = QrdqnModelConfig::default()
        .q_config(MlpConfig::new(N_STATES, vec![64, 64], 0))
        .n_quantiles(args.n_quantiles);

    QrdqnConfig::default()
        .model_config(model_config)
        .opt_config(OptimizerConfig::Adam {
            lr: 1e-3,
            eps: 0.01 / BATCH_SIZE as f64,
        })
        .batch_size(BATCH_SIZE)
        .discount_factor(args.gamma)
        .learning_starts(1000)
        .target_update_interval(500)
        .exploration(ExplorationScheduler::new(1.0, 0.05, 0.3))
        .risk(risk)
        .seed(args.seed)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let table = cliff::mask_table()?;

    let trainer_config = TrainerConfig::default()
        .total_timesteps(args.total_timesteps)
        .learning_starts(1000)
        .train_freq(4)
        .flush_interval(1000)
        .seed(args.seed as i64)
        .model_dir(args.out_dir.clone());
    let mut trainer = Trainer::<Cliff, StepProc, ReplayBuffer>::build(
        trainer_config,
        CliffConfig::default(),
        SimpleStepProcessorConfig::default(),
    );
    let mut agent = CliffAgent::build(agent_config(&args), &ActionSpace::Discrete(N_ACTIONS))?
        .with_mask_source(Box::new(table.clone()));
    let mut buffer =
        ReplayBuffer::build(&SimpleReplayBufferConfig::default().capacity(REPLAY_BUFFER_CAPACITY));
    let mut recorder = BufferedRecorder::new();

    trainer.train(&mut agent, &mut buffer, &mut recorder)?;

    let exporter = DiagnosticsExporter::new(&args.out_dir);
    let (paths, _) = agent.export_diagnostics(&exporter, &table)?;
    log::info!("Wrote {} files into {}", paths.len(), args.out_dir);

    Ok(())
}
