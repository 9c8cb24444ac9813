//! Replay buffer interface.
use super::TransitionBatch;
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if nothing has been pushed yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch: TransitionBatch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Samples a batch of `size` transitions.
    ///
    /// Implementations fail with
    /// [`CoreError::InsufficientTransitions`](crate::error::CoreError::InsufficientTransitions)
    /// when fewer than `size` transitions are stored.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;
}
