use super::{ActionMask, RiskPenaltyConfig};
use anyhow::Result;
use candle_core::{DType, Tensor, D};

/// Selects the greedy action for every item of a batch of quantile estimates.
///
/// `quantiles` has shape `(batch, n_quantiles, n_actions)`. The value of an
/// action is the mean of its quantiles adjusted by `risk`. Masked actions are
/// never selected. Returns an `i64` tensor of shape `(batch,)`.
pub fn select_action(
    quantiles: &Tensor,
    risk: &RiskPenaltyConfig,
    mask: Option<&ActionMask>,
) -> Result<Tensor> {
    let values = risk.action_values(quantiles)?;
    let values = match mask {
        Some(mask) => mask.apply(&values)?,
        None => values,
    };
    Ok(values.argmax(D::Minus1)?.to_dtype(DType::I64)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn argmax_of_mean() -> Result<()> {
        // batch 2, 2 quantiles, 3 actions
        let q = Tensor::from_slice(
            &[
                0f32, 1., 2., //
                0., 1., 2., //
                5., 1., 0., //
                5., 1., 0.,
            ],
            (2, 2, 3),
            &Device::Cpu,
        )?;
        let a = select_action(&q, &RiskPenaltyConfig::None, None)?;
        assert_eq!(a.to_vec1::<i64>()?, vec![2, 0]);

        let mask = ActionMask::new(vec![vec![true, true, false], vec![false, true, true]])?;
        let a = select_action(&q, &RiskPenaltyConfig::None, Some(&mask))?;
        assert_eq!(a.to_vec1::<i64>()?, vec![1, 1]);
        Ok(())
    }
}
