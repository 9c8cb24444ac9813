//! Converts environment steps into transitions.
use super::{BatchBase, GenericTransitionBatch};
use crate::{Env, Step, StepProcessor};
use std::{default::Default, marker::PhantomData};

/// Configuration of [`SimpleStepProcessor`].
#[derive(Clone, Debug, Default)]
pub struct SimpleStepProcessorConfig {}

/// Produces 1-step transitions from [`Step`] objects.
///
/// The processor remembers the previous observation. [`StepProcessor::reset`]
/// must be called with the first observation of every episode.
pub struct SimpleStepProcessor<E, O, A> {
    prev_obs: Option<O>,
    phantom: PhantomData<(E, A)>,
}

impl<E, O, A> StepProcessor<E> for SimpleStepProcessor<E, O, A>
where
    E: Env,
    O: BatchBase + From<E::Obs>,
    A: BatchBase + From<E::Act>,
{
    type Config = SimpleStepProcessorConfig;
    type Output = GenericTransitionBatch<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            prev_obs: None,
            phantom: PhantomData,
        }
    }

    fn reset(&mut self, init_obs: E::Obs) {
        self.prev_obs = Some(init_obs.into());
    }

    fn process(&mut self, step: Step<E>) -> Option<Self::Output> {
        let next_obs: O = step.obs.clone().into();
        let obs = self.prev_obs.replace(step.obs.into())?;

        Some(GenericTransitionBatch {
            obs,
            act: step.act.into(),
            next_obs,
            reward: vec![step.reward],
            is_terminated: vec![step.is_terminated],
            is_truncated: vec![step.is_truncated],
        })
    }
}
