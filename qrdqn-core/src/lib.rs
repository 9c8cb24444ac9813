#![warn(missing_docs)]
//! Core abstractions for training a quantile regression DQN agent.
//!
//! This crate is backend-agnostic: it defines how an agent, an environment and
//! a replay buffer talk to each other, and provides a uniform replay buffer and
//! an off-policy training loop. Neural networks live in backend crates such as
//! `qrdqn-candle-agent`.
pub mod error;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{
    ActionSpace, Agent, Env, ExperienceBufferBase, Policy, ReplayBufferBase, Step, StepProcessor,
    TransitionBatch,
};

mod trainer;
pub use trainer::{Sampler, Trainer, TrainerConfig};
