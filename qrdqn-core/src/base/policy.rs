//! Policy.
use super::Env;
use anyhow::Result;

/// A policy on an environment.
///
/// Policy is a mapping from an observation to an action.
/// The mapping can be either of deterministic or stochastic.
pub trait Policy<E: Env> {
    /// Sample an action given an observation.
    ///
    /// When `valid_actions` is given, actions flagged `false` must not be chosen.
    fn sample(&mut self, obs: &E::Obs, valid_actions: Option<&[bool]>) -> Result<E::Act>;
}
