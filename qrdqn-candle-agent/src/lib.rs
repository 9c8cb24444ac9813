//! Risk-sensitive QR-DQN agent implemented with [candle](https://crates.io/crates/candle-core).
//!
//! The agent lives in [`qrdqn`]. The other modules provide building blocks:
//! a multilayer perceptron ([`mlp`]), optimizers with gradient clipping ([`opt`]),
//! parameter tracking and the quantile Huber loss ([`util`]).
pub mod mlp;
pub mod model;
pub mod opt;
pub mod qrdqn;
mod tensor_batch;
pub mod util;
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Device {
    /// Returns [`candle_core::Device`].
    ///
    /// Fails if the CUDA device is not available.
    pub fn to_candle(self) -> candle_core::Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Activation functions of hidden layers.
pub enum Activation {
    /// No activation.
    None,

    /// Rectified linear unit.
    ReLU,

    /// Hyperbolic tangent.
    Tanh,
}

impl Activation {
    /// Applies the activation function.
    pub fn forward(&self, xs: &candle_core::Tensor) -> candle_core::Result<candle_core::Tensor> {
        match self {
            Self::None => Ok(xs.clone()),
            Self::ReLU => xs.relu(),
            Self::Tanh => xs.tanh(),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::ReLU
    }
}
