//! Exploration rate schedule.
use serde::{Deserialize, Serialize};

/// Linearly decays the exploration rate with training progress.
///
/// The rate goes from `eps_initial` to `eps_final` during the first
/// `exploration_fraction` of the training and stays at `eps_final` afterwards.
///
/// ```rust
/// use qrdqn_candle_agent::qrdqn::ExplorationScheduler;
///
/// let s = ExplorationScheduler::new(1.0, 0.1, 0.5);
/// assert_eq!(s.rate(1.0), 1.0);
/// assert!((s.rate(0.75) - 0.55).abs() < 1e-12);
/// assert_eq!(s.rate(0.2), 0.1);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ExplorationScheduler {
    /// Rate at the start of training.
    pub eps_initial: f64,

    /// Rate after the decay.
    pub eps_final: f64,

    /// Fraction of the training during which the rate decays.
    pub exploration_fraction: f64,
}

impl Default for ExplorationScheduler {
    fn default() -> Self {
        Self {
            eps_initial: 1.0,
            eps_final: 0.01,
            exploration_fraction: 0.005,
        }
    }
}

impl ExplorationScheduler {
    /// Constructs the scheduler.
    pub fn new(eps_initial: f64, eps_final: f64, exploration_fraction: f64) -> Self {
        Self {
            eps_initial,
            eps_final,
            exploration_fraction,
        }
    }

    /// Returns the exploration rate.
    ///
    /// `progress_remaining` goes from 1 at the start of training to 0 at the end.
    /// The result stays in the range spanned by `eps_initial` and `eps_final`;
    /// a non-positive `exploration_fraction` gives `eps_final` right away.
    pub fn rate(&self, progress_remaining: f64) -> f64 {
        let elapsed = 1.0 - progress_remaining;
        if self.exploration_fraction <= 0.0 || elapsed >= self.exploration_fraction {
            return self.eps_final;
        }
        let fraction = (elapsed / self.exploration_fraction).max(0.0);
        self.eps_initial + fraction * (self.eps_final - self.eps_initial)
    }
}
