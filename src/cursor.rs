//! Streaming result cursors.
//!
//! A `ResultCursor` describes its columns once, binds one buffer per column
//! and fetches blocks of `fetch_size` rows into them. Each block is exposed
//! as a [`BatchView`] borrowing the cursor's buffers, so variable data is
//! read in place; the borrow ends before the next fetch overwrites it.
//! `RowCursor` layers row-at-a-time iteration on top.
//!
//! The `Cursor` trait gives both the same interface:
//!
//! ```no_run
//! use cli_columnar_rs::{Connection, ConnectTarget, Cursor, MemoryDriver, Options};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Arc::new(MemoryDriver::new());
//!     let conn = Connection::connect(driver, &ConnectTarget::dsn("memory"), Options::default())?;
//!
//!     let mut cursor = conn.open_cursor("SELECT * FROM users")?;
//!     while let Some(batch) = cursor.next()? {
//!         println!("{} rows", batch.num_rows());
//!     }
//!     Ok(())
//! }
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::buffer::{decode_text, decode_value, BufferSet};
use crate::error::{Diagnostic, Error, Result};
use crate::handle::{Chunk, StatementHandle};
use crate::sink::Sink;
use crate::types::{
    ColumnBatch, ColumnData, ColumnDescriptor, ColumnInfo, NativeType, Row, TypeRegistry, Value,
    NULL_DATA,
};

/// Payload bytes requested per `get_data` call during truncation recovery.
const RECOVERY_CHUNK: usize = 4096;

/// Largest cell recovered from a driver that never reports the cell length.
const MAX_RECOVERED_CELL: usize = 1 << 31;

/// Base trait for all cursor types.
///
/// Each cursor holds its statement exclusively, so only one cursor is open
/// on a statement at a time.
pub trait Cursor {
    /// The type of item this cursor yields.
    type Item;

    /// Column descriptors of the result set.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Number of rows fetched so far.
    fn rowcount(&self) -> u64;

    fn is_closed(&self) -> bool;

    /// Check if more items may be available (buffered or on the driver).
    fn has_more(&self) -> bool;

    /// Rows requested per fetch.
    fn fetch_size(&self) -> usize;

    /// Set the fetch size; buffers are reallocated on the next fetch.
    fn set_fetch_size(&mut self, size: usize) -> Result<()>;

    /// Close the cursor and release its buffers. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Get the next item, fetching when needed.
    ///
    /// Returns `Ok(None)` when exhausted.
    fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Fetch all remaining items. The cursor is closed afterwards.
    fn fetch_all(&mut self) -> Result<Vec<Self::Item>>;
}

/// Statement a cursor reads from: its own, or one borrowed from a
/// prepared statement that outlives the cursor.
pub(crate) enum StatementSlot<'s, 'c> {
    Owned(StatementHandle<'c>),
    Borrowed(&'s mut StatementHandle<'c>),
}

impl<'s, 'c> StatementSlot<'s, 'c> {
    fn get(&self) -> &StatementHandle<'c> {
        match self {
            StatementSlot::Owned(s) => s,
            StatementSlot::Borrowed(s) => s,
        }
    }

    fn get_mut(&mut self) -> &mut StatementHandle<'c> {
        match self {
            StatementSlot::Owned(s) => s,
            StatementSlot::Borrowed(s) => s,
        }
    }
}

/// Lifecycle of a result cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Created,
    DescribingColumns,
    /// Columns described and buffers allocated, nothing fetched yet.
    Fetching,
    /// The last fetch returned rows.
    MoreRows,
    Exhausted,
    Closed,
}

/// Forward-only cursor yielding one `ColumnBatch` per fetch.
pub struct ResultCursor<'s, 'c> {
    statement: StatementSlot<'s, 'c>,
    info: Arc<ColumnInfo>,
    buffers: Option<BufferSet>,
    state: CursorState,
    fetch_size: usize,
    rows_fetched: u64,
}

impl std::fmt::Debug for ResultCursor<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("columns", &self.info.column_names())
            .field("state", &self.state)
            .field("fetch_size", &self.fetch_size)
            .field("rows_fetched", &self.rows_fetched)
            .finish()
    }
}

impl<'s, 'c> ResultCursor<'s, 'c> {
    /// Describe the result columns of an executed statement and allocate
    /// buffers for `fetch_size` rows.
    pub(crate) fn new(
        statement: StatementSlot<'s, 'c>,
        registry: &TypeRegistry,
        fetch_size: usize,
    ) -> Result<Self> {
        let mut cursor = Self {
            statement,
            info: Arc::new(ColumnInfo::new(Vec::new())),
            buffers: None,
            state: CursorState::Created,
            fetch_size,
            rows_fetched: 0,
        };
        cursor.state = CursorState::DescribingColumns;
        let stmt = cursor.statement.get();
        let count = stmt.num_result_cols()?;
        if count == 0 {
            return Err(Error::invalid_state("statement did not produce a result set"));
        }
        let mut columns = Vec::with_capacity(count as usize);
        for ordinal in 1..=count {
            let desc = stmt.describe_col(ordinal)?;
            let resolution = registry.resolve_checked(&desc)?;
            if resolution.fallback {
                warn!(
                    "column {} ({}) has unknown SQL type {}, reading it as {}",
                    ordinal, desc.name, desc.data_type, resolution.native
                );
            }
            columns.push(ColumnDescriptor::new(ordinal, &desc, resolution));
        }
        cursor.info = Arc::new(ColumnInfo::new(columns));
        debug!(
            "described {} columns: {:?}",
            count,
            cursor.info.column_names()
        );
        cursor.buffers = Some(BufferSet::allocate(&cursor.info.native_types(), fetch_size)?);
        cursor.state = CursorState::Fetching;
        Ok(cursor)
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Shared column information.
    pub fn info(&self) -> &Arc<ColumnInfo> {
        &self.info
    }

    /// Fetch the next block and expose it in place.
    ///
    /// Truncated variable cells are re-read in full before the view is
    /// returned. Returns `Ok(None)` once the result is exhausted or the
    /// cursor is closed.
    pub fn next_view(&mut self) -> Result<Option<BatchView<'_>>> {
        if matches!(self.state, CursorState::Exhausted | CursorState::Closed) {
            return Ok(None);
        }
        match self.fetch_block() {
            Ok(Some(rows)) => {
                let buffers = self
                    .buffers
                    .as_ref()
                    .ok_or_else(|| Error::invalid_state("cursor buffers released"))?;
                Ok(Some(BatchView {
                    info: &self.info,
                    buffers,
                    num_rows: rows,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Fetch the next block as an owned batch.
    pub fn next_batch(&mut self) -> Result<Option<ColumnBatch>> {
        match self.next_view()? {
            Some(view) => view.to_batch().map(Some),
            None => Ok(None),
        }
    }

    fn fetch_block(&mut self) -> Result<Option<usize>> {
        let fetch_size = self.fetch_size;
        let stmt = self.statement.get_mut();
        let buffers = self
            .buffers
            .as_mut()
            .ok_or_else(|| Error::invalid_state("cursor buffers released"))?;

        if buffers.batch_size() != fetch_size {
            stmt.unbind_cols()?;
            buffers.rebind(fetch_size)?;
            debug!("rebinding cursor buffers for {} rows", fetch_size);
        }
        if buffers.needs_binding() {
            buffers.bind_columns(stmt)?;
        }
        buffers.clear_overflow();

        let fetched = match stmt.fetch()? {
            Some(fetched) => fetched,
            None => {
                trace!("cursor exhausted after {} rows", self.rows_fetched);
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
        };
        let rows = fetched.rows.min(buffers.batch_size());
        for (index, descriptor) in self.info.columns.iter().enumerate() {
            if !descriptor.native.is_variable() {
                continue;
            }
            for row in 0..rows {
                let truncated = buffers
                    .column(index)
                    .map_or(false, |c| c.is_truncated(row));
                if truncated {
                    let bytes = recover_truncated(stmt, descriptor, row, MAX_RECOVERED_CELL)?;
                    warn!(
                        "column {} row {} exceeded its {} byte buffer, recovered {} bytes",
                        descriptor.name,
                        self.rows_fetched as usize + row + 1,
                        descriptor.native.capacity(),
                        bytes.len()
                    );
                    buffers.set_overflow(row, index, bytes);
                }
            }
        }
        self.rows_fetched += rows as u64;
        self.state = CursorState::MoreRows;
        trace!("fetched block of {} rows", rows);
        Ok(Some(rows))
    }

    /// Release buffers and close after a failed fetch.
    fn fail(&mut self) {
        if let Err(e) = self.release() {
            debug!("error while releasing failed cursor: {}", e);
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        self.state = CursorState::Closed;
        let stmt = self.statement.get_mut();
        let unbind = stmt.unbind_cols();
        let close = stmt.close_cursor();
        self.buffers = None;
        unbind.and(close)
    }

    /// Stream every remaining batch into `sink`. Returns the rows written.
    pub fn write_to(&mut self, sink: &mut dyn Sink, append: bool) -> Result<u64> {
        sink.begin(&self.info.columns, append)?;
        let mut written = 0u64;
        while let Some(batch) = self.next_batch()? {
            written += batch.num_rows() as u64;
            sink.write_batch(batch)?;
        }
        sink.finish()?;
        debug!("wrote {} rows to sink", written);
        Ok(written)
    }

    /// Iterate row by row.
    pub fn into_rows(self) -> RowCursor<'s, 'c> {
        RowCursor::new(self)
    }
}

/// Re-read one truncated cell with chunked `get_data` calls.
///
/// The cell may not grow past the length the driver last reported for it,
/// nor past `limit` when the driver never reports one. Every chunk must
/// make progress.
fn recover_truncated(
    stmt: &StatementHandle<'_>,
    descriptor: &ColumnDescriptor,
    row: usize,
    limit: usize,
) -> Result<Bytes> {
    let c_type = descriptor.native.c_type();
    let terminator = c_type.terminator_len();
    let mut chunk = vec![0u8; RECOVERY_CHUNK + terminator];
    let room = RECOVERY_CHUNK;
    let mut out = BytesMut::with_capacity(descriptor.native.capacity() * 2);
    let mut expected: Option<usize> = None;
    let truncation = |message: String| Error::TruncatedData {
        column: descriptor.ordinal,
        row,
        diagnostic: Diagnostic::new("HY000", 0, message),
    };

    loop {
        let chunk_result = stmt.get_data(row, descriptor.ordinal, c_type, &mut chunk);
        let (indicator, more) = match chunk_result {
            Ok(Chunk::Done) => break,
            Ok(Chunk::Data { indicator, more }) => (indicator, more),
            Err(Error::QueryExecutionFailed { diagnostic, .. }) => {
                return Err(Error::TruncatedData {
                    column: descriptor.ordinal,
                    row,
                    diagnostic,
                })
            }
            Err(e) => return Err(e),
        };
        if indicator == NULL_DATA {
            break;
        }
        let len = if indicator >= 0 {
            // the indicator counts what is left from this chunk on
            let remaining = indicator as usize;
            let total = out.len().saturating_add(remaining);
            expected = Some(expected.map_or(total, |e| e.min(total)));
            remaining.min(room)
        } else {
            room
        };
        if more && len == 0 {
            return Err(truncation("get_data made no progress".to_string()));
        }
        out.extend_from_slice(&chunk[..len]);
        let bound = expected.unwrap_or(limit).min(limit);
        if out.len() > bound {
            return Err(truncation(format!(
                "get_data returned more than the {} bytes expected",
                bound
            )));
        }
        if !more {
            break;
        }
    }
    Ok(out.freeze())
}

impl Drop for ResultCursor<'_, '_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            debug!("error while dropping cursor: {}", e);
        }
    }
}

impl Cursor for ResultCursor<'_, '_> {
    type Item = ColumnBatch;

    fn columns(&self) -> &[ColumnDescriptor] {
        &self.info.columns
    }

    fn rowcount(&self) -> u64 {
        self.rows_fetched
    }

    fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    fn has_more(&self) -> bool {
        matches!(self.state, CursorState::Fetching | CursorState::MoreRows)
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn set_fetch_size(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::InvalidBatchSize { batch_size: size });
        }
        self.fetch_size = size;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.release()
    }

    fn next(&mut self) -> Result<Option<ColumnBatch>> {
        self.next_batch()
    }

    fn fetch_all(&mut self) -> Result<Vec<ColumnBatch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next_batch()? {
            batches.push(batch);
        }
        self.close()?;
        Ok(batches)
    }
}

/// One fetched block, read in place from the cursor's buffers.
#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a> {
    info: &'a Arc<ColumnInfo>,
    buffers: &'a BufferSet,
    num_rows: usize,
}

impl<'a> BatchView<'a> {
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.info.len()
    }

    pub fn descriptors(&self) -> &'a [ColumnDescriptor] {
        &self.info.columns
    }

    fn check(&self, column: usize, row: usize) -> Result<&'a ColumnDescriptor> {
        let count = self.info.len();
        let descriptor = self
            .info
            .get(column)
            .ok_or(Error::ColumnIndexOutOfBounds {
                index: column,
                count,
            })?;
        if row >= self.num_rows {
            return Err(Error::invalid_state(format!(
                "row {} out of range for a batch of {}",
                row, self.num_rows
            )));
        }
        Ok(descriptor)
    }

    pub fn is_null(&self, column: usize, row: usize) -> Result<bool> {
        self.check(column, row)?;
        Ok(self.buffers.payload(column, row).is_none())
    }

    /// Raw payload of a cell, `None` for NULL. Borrowed from the buffers.
    pub fn bytes(&self, column: usize, row: usize) -> Result<Option<&'a [u8]>> {
        self.check(column, row)?;
        Ok(self.buffers.payload(column, row))
    }

    /// Text of a character cell. Narrow text is borrowed; wide text is
    /// converted from UTF-16.
    pub fn text(&self, column: usize, row: usize) -> Result<Option<Cow<'a, str>>> {
        let descriptor = self.check(column, row)?;
        let Some(bytes) = self.buffers.payload(column, row) else {
            return Ok(None);
        };
        match descriptor.native {
            NativeType::Text { wide: false, .. } | NativeType::Decimal { .. } => {
                std::str::from_utf8(bytes)
                    .map(|s| Some(Cow::Borrowed(s)))
                    .map_err(|e| Error::type_conversion(format!("Invalid UTF-8: {}", e)))
            }
            NativeType::Text { wide: true, .. } => Ok(Some(Cow::Owned(decode_text(bytes, true)?))),
            other => Err(Error::type_conversion(format!(
                "Column {} is {}, not text",
                descriptor.name, other
            ))),
        }
    }

    /// A single cell as a dynamic value.
    pub fn value(&self, column: usize, row: usize) -> Result<Value> {
        let descriptor = self.check(column, row)?;
        match self.buffers.payload(column, row) {
            Some(bytes) => decode_value(&descriptor.native, bytes),
            None => Ok(Value::Null),
        }
    }

    /// Copy one column out of the buffers.
    pub fn column(&self, column: usize) -> Result<ColumnData> {
        self.buffers.materialize(column, self.num_rows)
    }

    /// Copy the whole block out of the buffers.
    pub fn to_batch(&self) -> Result<ColumnBatch> {
        let columns = (0..self.num_columns())
            .map(|c| self.buffers.materialize(c, self.num_rows))
            .collect::<Result<Vec<_>>>()?;
        ColumnBatch::new(Arc::clone(self.info), columns)
    }
}

/// Row-by-row cursor over a `ResultCursor`.
///
/// Rows are assembled from the current batch, which is fetched one block at
/// a time.
#[derive(Debug)]
pub struct RowCursor<'s, 'c> {
    inner: ResultCursor<'s, 'c>,
    batch: Option<ColumnBatch>,
    position: usize,
    rows_returned: u64,
}

impl<'s, 'c> RowCursor<'s, 'c> {
    pub(crate) fn new(inner: ResultCursor<'s, 'c>) -> Self {
        Self {
            inner,
            batch: None,
            position: 0,
            rows_returned: 0,
        }
    }

    fn buffered(&self) -> usize {
        self.batch
            .as_ref()
            .map_or(0, |b| b.num_rows().saturating_sub(self.position))
    }
}

impl Cursor for RowCursor<'_, '_> {
    type Item = Row;

    fn columns(&self) -> &[ColumnDescriptor] {
        self.inner.columns()
    }

    /// Rows returned by `next` so far.
    fn rowcount(&self) -> u64 {
        self.rows_returned
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn has_more(&self) -> bool {
        self.buffered() > 0 || self.inner.has_more()
    }

    fn fetch_size(&self) -> usize {
        self.inner.fetch_size()
    }

    fn set_fetch_size(&mut self, size: usize) -> Result<()> {
        self.inner.set_fetch_size(size)
    }

    fn close(&mut self) -> Result<()> {
        self.batch = None;
        self.inner.close()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.batch.as_ref().and_then(|b| b.row(self.position)) {
                self.position += 1;
                self.rows_returned += 1;
                return Ok(Some(row));
            }
            match self.inner.next_batch()? {
                Some(batch) => {
                    self.batch = Some(batch);
                    self.position = 0;
                }
                None => {
                    self.batch = None;
                    return Ok(None);
                }
            }
        }
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next()? {
            rows.push(row);
        }
        self.close()?;
        Ok(rows)
    }
}
