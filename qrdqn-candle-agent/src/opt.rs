//! Optimizers.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Configuration of optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        #[allow(missing_docs)]
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[allow(missing_docs)]
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[allow(missing_docs)]
        #[serde(default = "default_eps")]
        eps: f64,
        #[allow(missing_docs)]
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,

        /// Term added to the denominator for numerical stability.
        #[serde(default = "default_adam_eps")]
        eps: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

fn default_adam_eps() -> f64 {
    ParamsAdam::default().eps
}

impl OptimizerConfig {
    /// Adam with the learning rate and epsilon of the QR-DQN paper
    /// (`lr = 5e-5`, `eps = 0.01 / batch_size`).
    pub fn qrdqn_default(batch_size: usize) -> Self {
        Self::Adam {
            lr: 5e-5,
            eps: 0.01 / batch_size as f64,
        }
    }

    /// Constructs an optimizer over the given variables.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                let opt = AdamW::new(vars.clone(), params)?;
                Ok(Optimizer::AdamW(opt, vars))
            }
            OptimizerConfig::Adam { lr, eps } => {
                let params = ParamsAdam {
                    lr: *lr,
                    eps: *eps,
                    ..ParamsAdam::default()
                };
                let opt = Adam::new(vars.clone(), params)?;
                Ok(Optimizer::Adam(opt, vars))
            }
        }
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _, eps } => Self::Adam { lr, eps },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::qrdqn_default(32)
    }
}

/// Optimizers.
///
/// Each variant keeps the optimized variables for gradient clipping.
pub enum Optimizer {
    /// AdamW optimizer.
    AdamW(AdamW, Vec<Var>),

    /// Adam optimizer.
    Adam(Adam, Vec<Var>),
}

impl Optimizer {
    fn vars(&self) -> &[Var] {
        match self {
            Self::AdamW(_, vars) => vars,
            Self::Adam(_, vars) => vars,
        }
    }

    /// Applies one optimizer step with the given gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::AdamW(opt, _) => Ok(opt.step(grads)?),
            Self::Adam(opt, _) => Ok(opt.step(grads)?),
        }
    }

    /// Computes gradients of `loss`, clips them and applies an optimizer step.
    ///
    /// If `max_grad_norm` is given, the gradients are rescaled so that their
    /// global L2 norm does not exceed it. Returns the norm before clipping.
    pub fn backward_step(&mut self, loss: &Tensor, max_grad_norm: Option<f64>) -> Result<f32> {
        let mut grads = loss.backward()?;
        let norm = clip_grad_norm(&mut grads, self.vars(), max_grad_norm)?;
        self.step(&grads)?;
        Ok(norm)
    }
}

/// Rescales gradients in place so that their global L2 norm is at most `max_norm`.
///
/// Returns the global norm before rescaling.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: Option<f64>) -> Result<f32> {
    let mut sq_sum = 0f32;
    for var in vars.iter() {
        if let Some(g) = grads.get(var.as_tensor()) {
            sq_sum += g.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let norm = sq_sum.sqrt();

    if let Some(max_norm) = max_norm {
        let scale = max_norm / (norm as f64 + 1e-6);
        if scale < 1.0 {
            for var in vars.iter() {
                if let Some(g) = grads.get(var.as_tensor()) {
                    let g = (g * scale)?;
                    grads.insert(var.as_tensor(), g);
                }
            }
        }
    }

    Ok(norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn clipping_bounds_global_norm() -> Result<()> {
        let w = Var::from_tensor(&Tensor::new(&[3f32, 4.], &Device::Cpu)?)?;
        // d/dw sum(w * w) = 2w, norm 10
        let loss = w.as_tensor().sqr()?.sum_all()?;
        let mut grads = loss.backward()?;
        let vars = vec![w.clone()];
        let norm = clip_grad_norm(&mut grads, &vars, Some(1.0))?;
        assert!((norm - 10.0).abs() < 1e-4);

        let g = grads.get(w.as_tensor()).unwrap().to_vec1::<f32>()?;
        let clipped = (g[0] * g[0] + g[1] * g[1]).sqrt();
        assert!((clipped - 1.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn adam_step_moves_parameters() -> Result<()> {
        let w = Var::zeros(2, DType::F32, &Device::Cpu)?;
        let mut opt = OptimizerConfig::Adam { lr: 0.1, eps: 1e-8 }.build(vec![w.clone()])?;
        let target = Tensor::new(&[1f32, -1.], &Device::Cpu)?;
        let loss = (w.as_tensor() - &target)?.sqr()?.sum_all()?;
        opt.backward_step(&loss, None)?;
        let w = w.as_tensor().to_vec1::<f32>()?;
        assert!(w[0] > 0.0 && w[1] < 0.0);
        Ok(())
    }
}
