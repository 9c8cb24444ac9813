//! A uniform replay buffer over generic observation and action batches.
//!
//! [`SimpleReplayBuffer`] stores transitions in a ring of fixed capacity and
//! samples batches uniformly at random. Observations and actions are stored in
//! containers implementing [`BatchBase`], which lets backend crates keep them
//! as tensors.
mod base;
mod batch;
mod config;
mod step_proc;
pub use base::SimpleReplayBuffer;
pub use batch::{BatchBase, GenericTransitionBatch};
pub use config::SimpleReplayBufferConfig;
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
