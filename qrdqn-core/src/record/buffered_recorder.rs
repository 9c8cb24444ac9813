use super::{AggregateRecorder, Record, RecordValue, Recorder};
use log::info;

/// Buffered recorder.
///
/// Keeps every record in memory. Stored records are averaged per scalar key
/// on [`AggregateRecorder::flush`], logged with `info!` and appended to the
/// buffer together with the step number under the key `"step"`.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    pending: Vec<Record>,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Returns the values of a scalar key over all written records, in order.
    pub fn scalars(&self, key: &str) -> Vec<f32> {
        self.buf
            .iter()
            .filter_map(|r| r.get_scalar(key).ok())
            .collect()
    }
}

impl Recorder for BufferedRecorder {
    /// Write a [`Record`] to the buffer.
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.pending.push(record);
    }

    fn flush(&mut self, step: i64) {
        if self.pending.is_empty() {
            return;
        }

        let mut sums: Vec<(String, f32, usize)> = Vec::new();
        let mut other = Record::empty();
        for record in self.pending.drain(..) {
            for (k, v) in record.into_iter_in_record() {
                match v {
                    RecordValue::Scalar(x) => match sums.iter_mut().find(|e| e.0 == k) {
                        Some(e) => {
                            e.1 += x;
                            e.2 += 1;
                        }
                        None => sums.push((k, x, 1)),
                    },
                    v => other.insert(k, v),
                }
            }
        }

        let mut aggregated = other;
        for (k, sum, n) in sums.into_iter() {
            let mean = sum / n as f32;
            info!("step {}: {} = {}", step, k, mean);
            aggregated.insert(k, RecordValue::Scalar(mean));
        }
        aggregated.insert("step", RecordValue::Scalar(step as f32));
        self.buf.push(aggregated);
    }
}
