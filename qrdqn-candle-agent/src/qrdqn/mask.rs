//! Action masks.
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use qrdqn_core::error::CoreError;
use serde::{Deserialize, Serialize};

/// Value given to masked actions before taking the argmax.
pub const MASKED_ACTION_VALUE: f32 = f32::MIN;

/// Validity of actions for a batch of states, of shape `(batch, n_actions)`.
///
/// Every row must allow at least one action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMask {
    mask: Vec<bool>,
    batch_size: usize,
    n_actions: usize,
}

impl ActionMask {
    /// Creates a mask from rows of validity flags.
    pub fn new(rows: Vec<Vec<bool>>) -> Result<Self, CoreError> {
        let batch_size = rows.len();
        let n_actions = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut mask = Vec::with_capacity(batch_size * n_actions);

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_actions {
                return Err(CoreError::InvalidActionMask(format!(
                    "row {} has {} actions, expected {}",
                    i,
                    row.len(),
                    n_actions
                )));
            }
            if !row.iter().any(|v| *v) {
                return Err(CoreError::InvalidActionMask(format!(
                    "row {} has no valid action",
                    i
                )));
            }
            mask.extend(row);
        }

        Ok(Self {
            mask,
            batch_size,
            n_actions,
        })
    }

    /// Repeats a single row of validity flags `batch_size` times.
    pub fn broadcast(row: &[bool], batch_size: usize) -> Result<Self, CoreError> {
        Self::new(vec![row.to_vec(); batch_size])
    }

    /// Returns `(batch_size, n_actions)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.batch_size, self.n_actions)
    }

    /// Returns the validity flags of the `i`-th row.
    pub fn row(&self, i: usize) -> &[bool] {
        &self.mask[i * self.n_actions..(i + 1) * self.n_actions]
    }

    /// Returns the mask as a `u8` tensor of shape `(batch_size, n_actions)`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let data = self.mask.iter().map(|v| *v as u8).collect::<Vec<_>>();
        Ok(Tensor::from_vec(
            data,
            (self.batch_size, self.n_actions),
            device,
        )?)
    }

    /// Replaces the values of masked actions with [`MASKED_ACTION_VALUE`].
    ///
    /// `values` must have shape `(batch_size, n_actions)`.
    pub fn apply(&self, values: &Tensor) -> Result<Tensor> {
        let shape = values.dims2()?;
        if shape != self.shape() {
            return Err(CoreError::InvalidActionMask(format!(
                "mask of shape {:?} applied to values of shape {:?}",
                self.shape(),
                shape
            ))
            .into());
        }
        let masked = Tensor::full(MASKED_ACTION_VALUE, shape, values.device())?
            .to_dtype(values.dtype())?;
        Ok(self.to_tensor(values.device())?.where_cond(values, &masked)?)
    }
}

/// Provides action masks for batches of observations.
pub trait MaskSource {
    /// Returns the mask of valid actions for every observation in the batch.
    fn masks(&self, obs: &Tensor) -> Result<ActionMask>;
}

/// How the state of a tabular environment is encoded in an observation.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum StateEncoding {
    /// The first column of the observation holds the state index.
    Index,

    /// The observation is a one-hot vector over the states.
    OneHot,
}

impl StateEncoding {
    /// Encodes state indices as a batch of observations.
    pub fn encode(&self, states: &[usize], n_states: usize, device: &Device) -> Result<Tensor> {
        let batch_size = states.len();
        let t = match self {
            Self::Index => {
                let data = states.iter().map(|s| *s as f32).collect::<Vec<_>>();
                Tensor::from_vec(data, (batch_size, 1), device)?
            }
            Self::OneHot => {
                let mut data = vec![0f32; batch_size * n_states];
                for (i, s) in states.iter().enumerate() {
                    data[i * n_states + s] = 1.0;
                }
                Tensor::from_vec(data, (batch_size, n_states), device)?
            }
        };
        Ok(t)
    }

    /// Decodes state indices from a batch of observations.
    pub fn decode(&self, obs: &Tensor) -> Result<Vec<usize>> {
        let states = match self {
            Self::Index => obs
                .narrow(1, 0, 1)?
                .squeeze(1)?
                .to_dtype(DType::F32)?
                .to_vec1::<f32>()?
                .into_iter()
                .map(|s| s.round() as usize)
                .collect(),
            Self::OneHot => obs
                .argmax(D::Minus1)?
                .to_vec1::<u32>()?
                .into_iter()
                .map(|s| s as usize)
                .collect(),
        };
        Ok(states)
    }
}

/// Per-state validity table of a tabular environment.
///
/// ```rust
/// use qrdqn_candle_agent::qrdqn::{MaskTable, StateEncoding};
///
/// let table = MaskTable::new(
///     vec![vec![true, false], vec![true, true]],
///     StateEncoding::Index,
/// ).unwrap();
/// assert_eq!(table.valid_actions(0), Some(&[true, false][..]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MaskTable {
    table: Vec<Vec<bool>>,
    encoding: StateEncoding,
}

impl MaskTable {
    /// Creates a table; every state must allow at least one action.
    pub fn new(table: Vec<Vec<bool>>, encoding: StateEncoding) -> Result<Self, CoreError> {
        // Validates the rows
        let _ = ActionMask::new(table.clone())?;
        Ok(Self { table, encoding })
    }

    /// Returns the number of states.
    pub fn n_states(&self) -> usize {
        self.table.len()
    }

    /// Returns the encoding of states in observations.
    pub fn encoding(&self) -> StateEncoding {
        self.encoding
    }

    /// Returns the validity flags of a state.
    pub fn valid_actions(&self, state: usize) -> Option<&[bool]> {
        self.table.get(state).map(|r| r.as_slice())
    }

    /// Returns the observation of every state, in order.
    pub fn all_states(&self, device: &Device) -> Result<Tensor> {
        let states = (0..self.n_states()).collect::<Vec<_>>();
        self.encoding.encode(&states, self.n_states(), device)
    }
}

impl MaskSource for MaskTable {
    fn masks(&self, obs: &Tensor) -> Result<ActionMask> {
        let states = self.encoding.decode(obs)?;
        let mut rows = Vec::with_capacity(states.len());
        for s in states.into_iter() {
            let row = self.valid_actions(s).ok_or_else(|| {
                CoreError::InvalidActionMask(format!(
                    "state {} is out of the table of {} states",
                    s,
                    self.n_states()
                ))
            })?;
            rows.push(row.to_vec());
        }
        Ok(ActionMask::new(rows)?)
    }
}
