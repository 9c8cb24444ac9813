//! Types and traits for recording training metrics.
//!
//! Agents and the [`Trainer`](crate::Trainer) report metrics as [`Record`]s,
//! key-value maps of [`RecordValue`]s. A [`Recorder`] writes a record
//! immediately, while an [`AggregateRecorder`] stores records and writes them
//! out when flushed.
//!
//! ```rust
//! use qrdqn_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("train/loss", RecordValue::Scalar(0.25));
//! record.insert("train/n_updates", RecordValue::Scalar(10.0));
//! assert_eq!(record.get_scalar("train/loss").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
