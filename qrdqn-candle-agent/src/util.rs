//! Utilities.
mod quantile_loss;
use anyhow::{anyhow, Result};
use candle_nn::VarMap;
use log::trace;
pub use quantile_loss::quantile_huber_loss;

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("track: tau = {}", tau);
    let dest = dest.data().lock().map_err(|e| anyhow!("{}", e))?;
    let src = src.data().lock().map_err(|e| anyhow!("{}", e))?;

    for (k_dest, v_dest) in dest.iter() {
        let v_src = src
            .get(k_dest)
            .ok_or_else(|| anyhow!("Variable {} is missing in the source", k_dest))?;
        let t_dest = ((v_src.as_tensor() * tau)? + (v_dest.as_tensor() * (1.0 - tau))?)?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Copies variables of `src` into `dest` verbatim.
///
/// Variables are identified by their names.
pub fn copy_vars(dest: &VarMap, src: &VarMap) -> Result<()> {
    trace!("copy_vars");
    let dest = dest.data().lock().map_err(|e| anyhow!("{}", e))?;
    let src = src.data().lock().map_err(|e| anyhow!("{}", e))?;

    for (k_dest, v_dest) in dest.iter() {
        let v_src = src
            .get(k_dest)
            .ok_or_else(|| anyhow!("Variable {} is missing in the source", k_dest))?;
        v_dest.set(v_src.as_tensor())?;
    }

    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: usize);
}
