use super::{BatchBase, GenericTransitionBatch, SimpleReplayBufferConfig};
use crate::{error::CoreError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A ring buffer of transitions with uniform sampling.
///
/// When the buffer is full, new transitions overwrite the oldest ones.
/// Indices of a batch are drawn uniformly with replacement from the stored
/// transitions.
pub struct SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    capacity: usize,
    i: usize,
    size: usize,
    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<i8>,
    is_truncated: Vec<i8>,
    rng: StdRng,
}

impl<O, A> SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    #[inline]
    fn push_ring<T: Copy>(buf: &mut [T], i: usize, items: &[T]) {
        let capacity = buf.len();
        let mut j = i;
        for x in items.iter() {
            buf[j] = *x;
            j += 1;
            if j == capacity {
                j = 0;
            }
        }
    }

    fn sample_vec<T: Copy>(buf: &[T], ixs: &[usize]) -> Vec<T> {
        ixs.iter().map(|ix| buf[*ix]).collect()
    }

    /// Returns the capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of stored transitions flagged as terminated.
    pub fn num_terminated_flags(&self) -> usize {
        self.is_terminated[..self.size]
            .iter()
            .map(|f| *f as usize)
            .sum()
    }

    /// Returns the sum of the stored rewards.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }
}

impl<O, A> ExperienceBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.size
    }

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        let len = tr.len();
        let (obs, act, next_obs, reward, is_terminated, is_truncated) = tr.unpack();
        self.obs.push(self.i, obs)?;
        self.act.push(self.i, act)?;
        self.next_obs.push(self.i, next_obs)?;
        Self::push_ring(&mut self.reward, self.i, &reward);
        Self::push_ring(&mut self.is_terminated, self.i, &is_terminated);
        Self::push_ring(&mut self.is_truncated, self.i, &is_truncated);

        self.i = (self.i + len) % self.capacity;
        self.size = (self.size + len).min(self.capacity);

        Ok(())
    }
}

impl<O, A> ReplayBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = SimpleReplayBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity;

        Self {
            capacity,
            i: 0,
            size: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![0; capacity],
            is_truncated: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        if size > self.size || self.size == 0 {
            return Err(CoreError::InsufficientTransitions {
                requested: size,
                stored: self.size,
            }
            .into());
        }

        let ixs = (0..size)
            .map(|_| self.rng.gen_range(0..self.size))
            .collect::<Vec<_>>();

        Ok(Self::Batch {
            obs: self.obs.sample(&ixs)?,
            act: self.act.sample(&ixs)?,
            next_obs: self.next_obs.sample(&ixs)?,
            reward: Self::sample_vec(&self.reward, &ixs),
            is_terminated: Self::sample_vec(&self.is_terminated, &ixs),
            is_truncated: Self::sample_vec(&self.is_truncated, &ixs),
        })
    }
}
