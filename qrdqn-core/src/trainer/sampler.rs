//! Interaction with the environment.
use crate::{
    record::{Record, RecordValue::Scalar},
    Agent, Env, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;

/// Runs the agent in the environment and pushes transitions into a replay buffer.
///
/// The environment is reset at the first call of [`Sampler::sample_and_push`]
/// and whenever an episode ends.
pub struct Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    env: E,
    prev_obs: Option<E::Obs>,
    step_processor: P,
    episode_return: f32,
    episode_length: usize,
}

impl<E, P> Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    /// Creates a sampler.
    pub fn new(env: E, step_processor: P) -> Self {
        Self {
            env,
            prev_obs: None,
            step_processor,
            episode_return: 0.0,
            episode_length: 0,
        }
    }

    fn reset(&mut self) -> Result<E::Obs> {
        let obs = self.env.reset()?;
        self.step_processor.reset(obs.clone());
        self.episode_return = 0.0;
        self.episode_length = 0;
        Ok(obs)
    }

    /// Samples a transition and pushes it into the buffer.
    ///
    /// When the episode ends, the returned record holds `rollout/ep_return`
    /// and `rollout/ep_length`.
    pub fn sample_and_push<A, R>(&mut self, agent: &mut A, buffer: &mut R) -> Result<Record>
    where
        A: Agent<E, R>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
    {
        let obs = match self.prev_obs.take() {
            Some(obs) => obs,
            None => self.reset()?,
        };

        let valid_actions = self.env.valid_actions();
        let act = agent.sample(&obs, valid_actions.as_deref())?;
        let (step, mut record) = self.env.step(&act)?;
        let is_done = step.is_done();
        self.episode_return += step.reward;
        self.episode_length += 1;
        let next_obs = step.obs.clone();

        if let Some(transition) = self.step_processor.process(step) {
            buffer.push(transition)?;
        }

        if is_done {
            record.insert("rollout/ep_return", Scalar(self.episode_return));
            record.insert("rollout/ep_length", Scalar(self.episode_length as f32));
            self.prev_obs = None;
        } else {
            self.prev_obs = Some(next_obs);
        }

        Ok(record)
    }
}
