//! Risk-sensitive quantile regression DQN agent.
//!
//! The agent learns `n_quantiles` estimates of the return distribution for
//! every discrete action. Actions are chosen greedily with respect to the
//! mean of the distribution, optionally adjusted by a risk penalty
//! ([`RiskPenaltyConfig`]) and restricted by an [`ActionMask`].
mod base;
mod config;
mod diagnostics;
mod explorer;
mod mask;
mod model;
mod risk;
mod selector;
mod target;
pub use base::Qrdqn;
pub use config::QrdqnConfig;
pub use diagnostics::DiagnosticsExporter;
pub use explorer::ExplorationScheduler;
pub use mask::{ActionMask, MaskSource, MaskTable, StateEncoding, MASKED_ACTION_VALUE};
pub use model::{QrdqnModel, QrdqnModelConfig};
pub use risk::{EntropyPenalty, PenaltyTerm, RiskPenaltyConfig, VariancePenalty};
pub use selector::select_action;
pub use target::{TargetNetworkManager, Which};
