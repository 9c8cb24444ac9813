//! Multilayer perceptron.
mod base;
mod config;
use crate::Activation;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{Linear, Module};
pub use config::MlpConfig;

fn mlp_forward(xs: Tensor, layers: &[Linear], activation: &Activation) -> candle_core::Result<Tensor> {
    let n_layers = layers.len();
    let mut xs = xs;

    for layer in layers[..n_layers - 1].iter() {
        xs = activation.forward(&layer.forward(&xs)?)?;
    }

    layers[n_layers - 1].forward(&xs)
}
