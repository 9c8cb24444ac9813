//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// The replay buffer holds fewer transitions than a batch needs.
    #[error("Requested {requested} transitions, but the buffer stores only {stored}")]
    InsufficientTransitions {
        /// Requested batch size.
        requested: usize,

        /// Number of stored transitions.
        stored: usize,
    },

    /// The action space is not supported by the agent.
    #[error("Unsupported action space: {0}")]
    UnsupportedActionSpace(String),

    /// Action mask has a wrong shape or excludes every action.
    #[error("Invalid action mask: {0}")]
    InvalidActionMask(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
