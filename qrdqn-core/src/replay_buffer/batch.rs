//! Transition batches over generic containers.
use crate::TransitionBatch;
use anyhow::Result;

/// Basic operations of a container of observations or actions.
///
/// The replay buffer allocates one container per field with [`BatchBase::new`],
/// writes incoming items at ring indices with [`BatchBase::push`], and gathers
/// rows with [`BatchBase::sample`].
pub trait BatchBase: Sized {
    /// Creates an empty container for `capacity` items.
    fn new(capacity: usize) -> Self;

    /// Writes `data` starting at index `ix`, wrapping around at the capacity.
    fn push(&mut self, ix: usize, data: Self) -> Result<()>;

    /// Gathers the items at `ixs` into a new container.
    fn sample(&self, ixs: &[usize]) -> Result<Self>;
}

/// Transitions `(o_t, a_t, o_t+1, r_t, is_terminated_t, is_truncated_t)`.
///
/// Used both as the item pushed into [`SimpleReplayBuffer`](super::SimpleReplayBuffer)
/// and as the batch it samples.
pub struct GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Observations.
    pub obs: O,

    /// Actions.
    pub act: A,

    /// Next observations.
    pub next_obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags.
    pub is_terminated: Vec<i8>,

    /// Truncation flags.
    pub is_truncated: Vec<i8>,
}

impl<O, A> TransitionBatch for GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Self::ObsBatch {
        &self.obs
    }

    fn act(&self) -> &Self::ActBatch {
        &self.act
    }
}

impl<O, A> GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates an empty batch with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: Vec::with_capacity(capacity),
            is_terminated: Vec::with_capacity(capacity),
            is_truncated: Vec::with_capacity(capacity),
        }
    }
}
