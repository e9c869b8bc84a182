//! Consumers and producers of columnar batches.
//!
//! File formats live outside this crate; they plug in by implementing
//! [`Sink`] (receives result batches) or [`Source`] (feeds bulk loads).

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ColumnBatch, ColumnDescriptor, ColumnInfo};

/// Receives the batches of one result set.
pub trait Sink {
    /// Called once before the first batch. `append` asks the sink to add to
    /// existing data instead of replacing it.
    fn begin(&mut self, columns: &[ColumnDescriptor], append: bool) -> Result<()>;

    fn write_batch(&mut self, batch: ColumnBatch) -> Result<()>;

    /// Called once after the last batch.
    fn finish(&mut self) -> Result<()>;
}

/// Produces batches for a bulk load.
pub trait Source {
    /// Next batch, or `None` when the source is drained.
    fn next_batch(&mut self) -> Result<Option<ColumnBatch>>;
}

/// Sink collecting everything into one batch.
#[derive(Debug, Default)]
pub struct MemorySink {
    batch: Option<ColumnBatch>,
    batches_written: usize,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_batch` calls received.
    pub fn batches_written(&self) -> usize {
        self.batches_written
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rows collected so far.
    pub fn num_rows(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.num_rows())
    }

    /// The collected data, if `begin` was called.
    pub fn batch(&self) -> Option<&ColumnBatch> {
        self.batch.as_ref()
    }

    pub fn into_batch(self) -> Option<ColumnBatch> {
        self.batch
    }
}

impl Sink for MemorySink {
    fn begin(&mut self, columns: &[ColumnDescriptor], append: bool) -> Result<()> {
        self.finished = false;
        match &self.batch {
            Some(existing) if append => {
                if existing.num_columns() != columns.len() {
                    return Err(Error::invalid_state(format!(
                        "cannot append {} columns to {} collected columns",
                        columns.len(),
                        existing.num_columns()
                    )));
                }
            }
            _ => {
                let info = Arc::new(ColumnInfo::new(columns.to_vec()));
                self.batch = Some(ColumnBatch::empty(info));
                self.batches_written = 0;
            }
        }
        Ok(())
    }

    fn write_batch(&mut self, batch: ColumnBatch) -> Result<()> {
        let target = self
            .batch
            .as_mut()
            .ok_or_else(|| Error::invalid_state("write_batch called before begin"))?;
        target.extend(batch)?;
        self.batches_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Source replaying a list of batches.
#[derive(Debug, Default)]
pub struct BatchSource {
    batches: VecDeque<ColumnBatch>,
}

impl BatchSource {
    pub fn new(batches: impl IntoIterator<Item = ColumnBatch>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }
}

impl Source for BatchSource {
    fn next_batch(&mut self) -> Result<Option<ColumnBatch>> {
        Ok(self.batches.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDescription, Resolution, SqlDataType, TypeRegistry, Value};

    fn info() -> Arc<ColumnInfo> {
        let desc = ColumnDescription::new("id", SqlDataType::INTEGER, 10);
        let resolution: Resolution = TypeRegistry::default().resolve(&desc);
        Arc::new(ColumnInfo::new(vec![ColumnDescriptor::new(1, &desc, resolution)]))
    }

    fn batch(values: &[i32]) -> ColumnBatch {
        let rows: Vec<Vec<Value>> = values.iter().map(|v| vec![Value::I32(*v)]).collect();
        ColumnBatch::from_rows(info(), &rows).unwrap()
    }

    #[test]
    fn test_memory_sink_collects_and_appends() {
        let mut sink = MemorySink::new();
        assert!(sink.write_batch(batch(&[1])).is_err());

        sink.begin(&info().columns, false).unwrap();
        sink.write_batch(batch(&[1, 2])).unwrap();
        sink.write_batch(batch(&[3])).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.num_rows(), 3);
        assert_eq!(sink.batches_written(), 2);
        assert!(sink.is_finished());

        sink.begin(&info().columns, true).unwrap();
        sink.write_batch(batch(&[4])).unwrap();
        assert_eq!(sink.num_rows(), 4);

        sink.begin(&info().columns, false).unwrap();
        assert_eq!(sink.num_rows(), 0);
    }

    #[test]
    fn test_batch_source_drains_in_order() {
        let mut source = BatchSource::new(vec![batch(&[1]), batch(&[2, 3])]);
        assert_eq!(source.next_batch().unwrap().unwrap().num_rows(), 1);
        assert_eq!(source.next_batch().unwrap().unwrap().num_rows(), 2);
        assert!(source.next_batch().unwrap().is_none());
    }
}
