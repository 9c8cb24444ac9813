//! Train [`Agent`].
mod config;
mod sampler;
use crate::{
    record::{
        AggregateRecorder,
        RecordValue::{DateTime, Scalar},
    },
    Agent, Env, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;
use chrono::Local;
pub use config::TrainerConfig;
use log::info;
pub use sampler::Sampler;
use std::path::Path;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the off-policy training loop.
///
/// # Training loop
///
/// 1. Build [`Env`] with `seed` and [`StepProcessor`], and wrap them in a [`Sampler`].
/// 2. For `env_steps` in `1..=total_timesteps`:
///     1. Sample an action with [`Policy::sample`](crate::Policy::sample), passing
///        [`Env::valid_actions`] as the action mask, step the environment and push
///        the transition into the replay buffer.
///     2. Call [`Agent::on_env_step`] with `progress_remaining = 1 - env_steps / total_timesteps`.
///     3. If `env_steps > learning_starts` and `env_steps % train_freq == 0`,
///        call [`Agent::opt_with_record`].
///     4. Store the records in the recorder and flush it every `flush_interval`
///        environment steps. The first record carries `train/start_time`.
/// 3. Save the agent in `model_dir`, if given.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|Env::Act|B[Env]
///     B -->|Env::Obs, valid actions|A
///     B -->|"Step&lt;E: Env&gt;"|C[StepProcessor]
///     C -->|ExperienceBufferBase::Item|D[ReplayBufferBase]
///     D -->|ReplayBufferBase::Batch|A
/// ```
pub struct Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    config: TrainerConfig,
    env_config: E::Config,
    step_proc_config: P::Config,
    phantom: std::marker::PhantomData<R>,
}

impl<E, P, R> Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig, env_config: E::Config, step_proc_config: P::Config) -> Self {
        Self {
            config,
            env_config,
            step_proc_config,
            phantom: std::marker::PhantomData,
        }
    }

    /// Returns `true` if an optimization step is due after `env_steps` environment steps.
    fn is_opt_step(&self, env_steps: usize) -> bool {
        env_steps > self.config.learning_starts && env_steps % self.config.train_freq == 0
    }

    /// Train the agent.
    ///
    /// Returns the number of optimization steps performed.
    pub fn train<A>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<usize>
    where
        A: Agent<E, R>,
    {
        self.config.validate()?;
        let env = E::build(&self.env_config, self.config.seed)?;
        let step_proc = P::build(&self.step_proc_config);
        let mut sampler = Sampler::new(env, step_proc);
        let total = self.config.total_timesteps;
        let mut opt_steps = 0;
        agent.train();
        info!("Start training for {} environment steps", total);

        for env_steps in 1..=total {
            let mut record = sampler.sample_and_push(agent, buffer)?;
            if env_steps == 1 {
                record.insert("train/start_time", DateTime(Local::now()));
            }

            let progress_remaining = 1.0 - env_steps as f64 / total as f64;
            record.merge_inplace(agent.on_env_step(env_steps, progress_remaining)?);

            if self.is_opt_step(env_steps) {
                record.merge_inplace(agent.opt_with_record(buffer)?);
                opt_steps += 1;
                record.insert("train/opt_steps", Scalar(opt_steps as f32));
            }

            if !record.is_empty() {
                recorder.store(record);
            }

            if env_steps % self.config.flush_interval == 0 {
                recorder.flush(env_steps as _);
            }
        }
        recorder.flush(total as _);

        if let Some(model_dir) = &self.config.model_dir {
            agent.save_params(Path::new(model_dir))?;
            info!("Saved the model in {:?}", model_dir);
        }

        Ok(opt_steps)
    }
}
