use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use qrdqn_core::replay_buffer::BatchBase;
use std::convert::TryFrom;

/// A buffer consisting of a [`Tensor`].
///
/// The first dimension of the tensor is the batch dimension. The storage is
/// allocated at the first push, with the shape and dtype of the pushed data.
///
/// [`Tensor`]: https://docs.rs/candle-core/0.8.4/candle_core/struct.Tensor.html
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Returns the inner tensor.
    ///
    /// Fails if nothing has been pushed.
    pub fn into_tensor(self) -> Result<Tensor> {
        self.buf.ok_or_else(|| anyhow!("TensorBatch is empty"))
    }

    /// Moves the inner tensor to the given device.
    pub fn to(&mut self, device: &Device) -> Result<()> {
        if let Some(buf) = &self.buf {
            self.buf = Some(buf.to_device(device)?);
        }
        Ok(())
    }
}

impl From<Tensor> for TensorBatch {
    fn from(t: Tensor) -> Self {
        let capacity = t.dims().first().copied().unwrap_or(0);
        Self {
            buf: Some(t),
            capacity,
        }
    }
}

impl TryFrom<TensorBatch> for Tensor {
    type Error = anyhow::Error;

    fn try_from(b: TensorBatch) -> Result<Self> {
        b.into_tensor()
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    /// Pushes given data.
    ///
    /// If the internal buffer is empty, it will be initialized with the shape
    /// `[capacity, data.dims()[1..]]`. Data running past the capacity wraps
    /// around to the beginning.
    fn push(&mut self, index: usize, data: Self) -> Result<()> {
        let data = match data.buf {
            Some(data) => data,
            None => return Ok(()),
        };
        let batch_size = data.dim(0)?;
        if batch_size == 0 {
            return Ok(());
        }

        let capacity = self.capacity;
        if self.buf.is_none() {
            let mut shape = data.dims().to_vec();
            shape[0] = capacity;
            self.buf = Some(Tensor::zeros(shape, data.dtype(), &Device::Cpu)?);
        }
        let buf = self
            .buf
            .as_ref()
            .ok_or_else(|| anyhow!("TensorBatch is not allocated"))?;
        let data = data.to_device(&Device::Cpu)?.contiguous()?;

        if index + batch_size > capacity {
            let n = capacity - index;
            buf.slice_set(&data.i((..n,))?.contiguous()?, 0, index)?;
            buf.slice_set(&data.i((n..,))?.contiguous()?, 0, 0)?;
        } else {
            buf.slice_set(&data, 0, index)?;
        }
        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Result<Self> {
        let buf = self
            .buf
            .as_ref()
            .ok_or_else(|| anyhow!("Sampling from an empty TensorBatch"))?;
        let capacity = ixs.len();
        let ixs = {
            let ixs = ixs.iter().map(|x| *x as u32).collect::<Vec<_>>();
            Tensor::from_vec(ixs, &[capacity], buf.device())?
        };
        Ok(Self {
            buf: Some(buf.index_select(&ixs, 0)?),
            capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_wraps_and_sample_gathers_rows() -> Result<()> {
        let mut batch = TensorBatch::new(3);
        for i in 0..4 {
            let row = Tensor::from_vec(vec![i as f32, 10. * i as f32], (1, 2), &Device::Cpu)?;
            batch.push(i % 3, row.into())?;
        }
        let sampled = batch.sample(&[0, 2])?.into_tensor()?;
        assert_eq!(sampled.to_vec2::<f32>()?, vec![vec![3., 30.], vec![2., 20.]]);
        Ok(())
    }
}
