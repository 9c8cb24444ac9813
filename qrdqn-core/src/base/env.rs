//! Environment.
use super::Step;
use crate::{error::CoreError, record::Record};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Action space of an environment.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum ActionSpace {
    /// `n` discrete actions, indexed from `0` to `n - 1`.
    Discrete(usize),

    /// Real-valued actions of the given dimension.
    Continuous {
        /// Dimension of the action vector.
        dim: usize,
    },
}

impl ActionSpace {
    /// Returns the number of actions of a discrete action space.
    ///
    /// Fails with [`CoreError::UnsupportedActionSpace`] for continuous spaces.
    pub fn n_discrete(&self) -> Result<usize, CoreError> {
        match self {
            Self::Discrete(n) => Ok(*n),
            Self::Continuous { dim } => Err(CoreError::UnsupportedActionSpace(format!(
                "continuous action space of dimension {}",
                dim
            ))),
        }
    }
}

/// Represents an environment, typically an MDP.
///
/// Vectorized environments are not supported; an observation holds a single
/// state.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Clone + Debug;

    /// Action of the environment.
    type Act: Clone + Debug;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Returns the action space.
    fn action_space(&self) -> ActionSpace;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Performes an environment step.
    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)>
    where
        Self: Sized;

    /// Returns the validity of each action in the current state.
    ///
    /// Environments without action masking return `None`.
    fn valid_actions(&self) -> Option<Vec<bool>> {
        None
    }
}
