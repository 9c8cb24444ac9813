//! Export of learned return distributions.
use super::MaskTable;
use anyhow::Result;
use candle_core::Tensor;
use log::info;
use qrdqn_core::record::{Record, RecordValue};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Writes quantile estimates of every valid state-action pair as CSV files.
///
/// For state `s` and action `a`, the file
/// `state_{s}_action_{a}_varpenal{w}_gamma{g}.csv` holds one quantile per line,
/// where `w` is the variance penalty weight and `g` the discount factor.
/// Density plots are made from these files offline.
pub struct DiagnosticsExporter {
    out_dir: PathBuf,
}

impl DiagnosticsExporter {
    /// Creates an exporter writing into `out_dir`.
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_owned(),
        }
    }

    /// Returns the file name for a state-action pair.
    pub fn file_name(state: usize, action: usize, var_penal: f64, gamma: f64) -> String {
        format!(
            "state_{}_action_{}_varpenal{:?}_gamma{:?}.csv",
            state, action, var_penal, gamma
        )
    }

    /// Writes the quantiles of the valid actions of every state in `table`.
    ///
    /// `quantiles` has shape `(n_states, n_quantiles, n_actions)`, rows in the
    /// order of the states. Returns the written paths and a record with the
    /// variance of each distribution under `var/state_{s}/action_{a}`.
    pub fn export(
        &self,
        quantiles: &Tensor,
        table: &MaskTable,
        var_penal: f64,
        gamma: f64,
    ) -> Result<(Vec<PathBuf>, Record)> {
        fs::create_dir_all(&self.out_dir)?;
        let (n_states, _, _) = quantiles.dims3()?;
        if n_states != table.n_states() {
            anyhow::bail!(
                "Quantiles of {} states given for a table of {} states",
                n_states,
                table.n_states()
            );
        }

        let mut paths = vec![];
        let mut record = Record::empty();

        for state in 0..n_states {
            let valid = match table.valid_actions(state) {
                Some(valid) => valid,
                None => continue,
            };
            // (n_actions, n_quantiles)
            let points = quantiles.get(state)?.t()?.contiguous()?.to_vec2::<f32>()?;

            for (action, points) in points.iter().enumerate() {
                if !valid.get(action).copied().unwrap_or(false) {
                    continue;
                }
                let path = self
                    .out_dir
                    .join(Self::file_name(state, action, var_penal, gamma));
                let mut wtr = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_path(&path)?;
                for p in points.iter() {
                    wtr.write_record(&[p.to_string()])?;
                }
                wtr.flush()?;

                let mean = points.iter().sum::<f32>() / points.len() as f32;
                let var = points.iter().map(|p| (p - mean).powi(2)).sum::<f32>()
                    / points.len() as f32;
                record.insert(
                    format!("var/state_{}/action_{}", state, action),
                    RecordValue::Scalar(var),
                );
                paths.push(path);
            }
        }

        info!("Exported {} distributions to {:?}", paths.len(), self.out_dir);
        Ok((paths, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qrdqn::StateEncoding;
    use candle_core::Device;
    use tempdir::TempDir;

    #[test]
    fn writes_valid_pairs_only() -> Result<()> {
        let dir = TempDir::new("diagnostics")?;
        let table = MaskTable::new(
            vec![vec![true, false], vec![true, true]],
            StateEncoding::Index,
        )?;
        // (2 states, 3 quantiles, 2 actions)
        let quantiles = Tensor::from_slice(
            &[
                1f32, 9., 2., 9., 3., 9., //
                0., 5., 0., 5., 0., 5.,
            ],
            (2, 3, 2),
            &Device::Cpu,
        )?;
        let exporter = DiagnosticsExporter::new(dir.path());
        let (paths, record) = exporter.export(&quantiles, &table, 0.5, 0.99)?;

        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("state_0_action_0_varpenal0.5_gamma0.99.csv"));
        let content = fs::read_to_string(&paths[0])?;
        assert_eq!(content, "1\n2\n3\n");
        let var = record.get_scalar("var/state_0/action_0")?;
        assert!((var - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(record.get_scalar("var/state_1/action_1")?, 0.0);
        Ok(())
    }
}
