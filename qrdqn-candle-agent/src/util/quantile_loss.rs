//! Quantile loss.
use anyhow::Result;
use candle_core::{DType, Tensor};

/// Returns the quantile Huber loss between current and target quantiles.
///
/// `current` has shape `(batch, n_quantiles)` and `target` has shape
/// `(batch, n_target_quantiles)`. Quantile fractions of `current` are the
/// midpoints `tau_i = (i + 0.5) / n_quantiles`. The Huber threshold is 1.
///
/// The pairwise loss has shape `(batch, n_quantiles, n_target_quantiles)`.
/// With `sum_over_quantiles`, it is summed over the current quantiles and
/// averaged over the rest, otherwise averaged over all elements.
pub fn quantile_huber_loss(
    current: &Tensor,
    target: &Tensor,
    sum_over_quantiles: bool,
) -> Result<Tensor> {
    let (batch_size, n_quantiles) = current.dims2()?;
    let (batch_size_tgt, _) = target.dims2()?;
    if batch_size != batch_size_tgt {
        anyhow::bail!(
            "Batch sizes of current ({}) and target ({}) quantiles differ",
            batch_size,
            batch_size_tgt
        );
    }

    let device = current.device();
    let cum_prob = (0..n_quantiles)
        .map(|i| (i as f32 + 0.5) / n_quantiles as f32)
        .collect::<Vec<_>>();
    let cum_prob = Tensor::from_vec(cum_prob, (1, n_quantiles, 1), device)?;

    // (batch, n_quantiles, n_target_quantiles)
    let delta = target.unsqueeze(1)?.broadcast_sub(&current.unsqueeze(2)?)?;
    let abs_delta = delta.abs()?;
    let huber = abs_delta
        .gt(1.0)?
        .where_cond(&(&abs_delta - 0.5)?, &(delta.sqr()? * 0.5)?)?;
    let lt_0 = delta.detach().lt(0.0)?.to_dtype(DType::F32)?;
    let weight = cum_prob.broadcast_sub(&lt_0)?.abs()?;
    let loss = (weight * huber)?;

    let loss = match sum_over_quantiles {
        true => loss.sum(1)?.mean_all()?,
        false => loss.mean_all()?,
    };
    Ok(loss)
}
