//! Typed, nullable column vectors and the batches they travel in.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use super::column::{ColumnDescriptor, ColumnInfo};
use super::native::NativeType;
use super::row::Row;
use super::value::Value;
use crate::error::{Error, Result};

/// Values of one column, one typed vector per native type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bit(Vec<Option<bool>>),
    I8(Vec<Option<i8>>),
    I16(Vec<Option<i16>>),
    I32(Vec<Option<i32>>),
    I64(Vec<Option<i64>>),
    F32(Vec<Option<f32>>),
    F64(Vec<Option<f64>>),
    Decimal(Vec<Option<Decimal>>),
    Text(Vec<Option<String>>),
    /// Fixed and variable binary alike.
    Binary(Vec<Option<Vec<u8>>>),
    Date(Vec<Option<NaiveDate>>),
    Time(Vec<Option<NaiveTime>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

/// Expands `$body` once per variant with `$v` bound to the inner vector.
macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bit($v) => $body,
            ColumnData::I8($v) => $body,
            ColumnData::I16($v) => $body,
            ColumnData::I32($v) => $body,
            ColumnData::I64($v) => $body,
            ColumnData::F32($v) => $body,
            ColumnData::F64($v) => $body,
            ColumnData::Decimal($v) => $body,
            ColumnData::Text($v) => $body,
            ColumnData::Binary($v) => $body,
            ColumnData::Date($v) => $body,
            ColumnData::Time($v) => $body,
            ColumnData::Timestamp($v) => $body,
        }
    };
}

impl ColumnData {
    /// Create an empty column able to hold values of `native`.
    pub fn with_capacity(native: &NativeType, capacity: usize) -> Self {
        match native {
            NativeType::Bit => ColumnData::Bit(Vec::with_capacity(capacity)),
            NativeType::I8 => ColumnData::I8(Vec::with_capacity(capacity)),
            NativeType::I16 => ColumnData::I16(Vec::with_capacity(capacity)),
            NativeType::I32 => ColumnData::I32(Vec::with_capacity(capacity)),
            NativeType::I64 => ColumnData::I64(Vec::with_capacity(capacity)),
            NativeType::F32 => ColumnData::F32(Vec::with_capacity(capacity)),
            NativeType::F64 => ColumnData::F64(Vec::with_capacity(capacity)),
            NativeType::Decimal { .. } => ColumnData::Decimal(Vec::with_capacity(capacity)),
            NativeType::Text { .. } => ColumnData::Text(Vec::with_capacity(capacity)),
            NativeType::Binary { .. } | NativeType::VarBinary { .. } => {
                ColumnData::Binary(Vec::with_capacity(capacity))
            }
            NativeType::Date => ColumnData::Date(Vec::with_capacity(capacity)),
            NativeType::Time => ColumnData::Time(Vec::with_capacity(capacity)),
            NativeType::Timestamp { .. } => ColumnData::Timestamp(Vec::with_capacity(capacity)),
        }
    }

    /// Number of values, NULLs included.
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the value at `index` is NULL. Out of range counts as NULL.
    pub fn is_null(&self, index: usize) -> bool {
        each_variant!(self, v => v.get(index).map_or(true, |x| x.is_none()))
    }

    /// Number of NULL values.
    pub fn null_count(&self) -> usize {
        each_variant!(self, v => v.iter().filter(|x| x.is_none()).count())
    }

    /// Value at `index` as a dynamic value.
    pub fn get(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        let value = match self {
            ColumnData::Bit(v) => v[index].map(Value::Bool),
            ColumnData::I8(v) => v[index].map(Value::I8),
            ColumnData::I16(v) => v[index].map(Value::I16),
            ColumnData::I32(v) => v[index].map(Value::I32),
            ColumnData::I64(v) => v[index].map(Value::I64),
            ColumnData::F32(v) => v[index].map(Value::F32),
            ColumnData::F64(v) => v[index].map(Value::F64),
            ColumnData::Decimal(v) => v[index].map(Value::Decimal),
            ColumnData::Text(v) => v[index].clone().map(Value::Text),
            ColumnData::Binary(v) => v[index].clone().map(Value::Binary),
            ColumnData::Date(v) => v[index].map(Value::Date),
            ColumnData::Time(v) => v[index].map(Value::Time),
            ColumnData::Timestamp(v) => v[index].map(Value::Timestamp),
        };
        Some(value.unwrap_or(Value::Null))
    }

    /// Text at `index`, borrowed. `None` for NULL, out of range or a
    /// non-text column.
    pub fn text(&self, index: usize) -> Option<&str> {
        match self {
            ColumnData::Text(v) => v.get(index)?.as_deref(),
            _ => None,
        }
    }

    /// Bytes at `index`, borrowed. `None` for NULL, out of range or a
    /// non-binary column.
    pub fn bytes(&self, index: usize) -> Option<&[u8]> {
        match self {
            ColumnData::Binary(v) => v.get(index)?.as_deref(),
            _ => None,
        }
    }

    /// Append a NULL.
    pub fn push_null(&mut self) {
        each_variant!(self, v => v.push(None))
    }

    /// Append a dynamic value, converting it to the column's type.
    ///
    /// Lossless widenings are accepted (an `I16` into an `I64` column); any
    /// other mismatch is a `TypeConversion` error.
    pub fn push(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }
        let kind = self.kind();
        let mismatch = || {
            Error::type_conversion(format!(
                "Cannot store {} value in {} column",
                value.kind(),
                kind
            ))
        };
        match self {
            ColumnData::Bit(v) => match value {
                Value::Bool(b) => v.push(Some(*b)),
                other => v.push(Some(other.to_i64().ok_or_else(mismatch)? != 0)),
            },
            ColumnData::I8(v) => {
                let n = value.to_i64().ok_or_else(mismatch)?;
                v.push(Some(i8::try_from(n).map_err(|_| mismatch())?));
            }
            ColumnData::I16(v) => {
                let n = value.to_i64().ok_or_else(mismatch)?;
                v.push(Some(i16::try_from(n).map_err(|_| mismatch())?));
            }
            ColumnData::I32(v) => {
                let n = value.to_i64().ok_or_else(mismatch)?;
                v.push(Some(i32::try_from(n).map_err(|_| mismatch())?));
            }
            ColumnData::I64(v) => v.push(Some(value.to_i64().ok_or_else(mismatch)?)),
            ColumnData::F32(v) => match value {
                Value::F32(f) => v.push(Some(*f)),
                other => v.push(Some(other.to_f64().ok_or_else(mismatch)? as f32)),
            },
            ColumnData::F64(v) => v.push(Some(value.to_f64().ok_or_else(mismatch)?)),
            ColumnData::Decimal(v) => v.push(Some(value.to_decimal().ok_or_else(mismatch)?)),
            ColumnData::Text(v) => match value {
                Value::Text(s) => v.push(Some(s.clone())),
                _ => return Err(mismatch()),
            },
            ColumnData::Binary(v) => match value {
                Value::Binary(b) => v.push(Some(b.clone())),
                _ => return Err(mismatch()),
            },
            ColumnData::Date(v) => match value {
                Value::Date(d) => v.push(Some(*d)),
                _ => return Err(mismatch()),
            },
            ColumnData::Time(v) => match value {
                Value::Time(t) => v.push(Some(*t)),
                _ => return Err(mismatch()),
            },
            ColumnData::Timestamp(v) => match value {
                Value::Timestamp(ts) => v.push(Some(*ts)),
                _ => return Err(mismatch()),
            },
        }
        Ok(())
    }

    /// Append every value of `other`, which must be the same variant.
    pub fn extend(&mut self, other: ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Bit(a), ColumnData::Bit(b)) => a.extend(b),
            (ColumnData::I8(a), ColumnData::I8(b)) => a.extend(b),
            (ColumnData::I16(a), ColumnData::I16(b)) => a.extend(b),
            (ColumnData::I32(a), ColumnData::I32(b)) => a.extend(b),
            (ColumnData::I64(a), ColumnData::I64(b)) => a.extend(b),
            (ColumnData::F32(a), ColumnData::F32(b)) => a.extend(b),
            (ColumnData::F64(a), ColumnData::F64(b)) => a.extend(b),
            (ColumnData::Decimal(a), ColumnData::Decimal(b)) => a.extend(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
            (ColumnData::Binary(a), ColumnData::Binary(b)) => a.extend(b),
            (ColumnData::Date(a), ColumnData::Date(b)) => a.extend(b),
            (ColumnData::Time(a), ColumnData::Time(b)) => a.extend(b),
            (ColumnData::Timestamp(a), ColumnData::Timestamp(b)) => a.extend(b),
            (a, b) => {
                return Err(Error::type_conversion(format!(
                    "Cannot append {} column to {} column",
                    b.kind(),
                    a.kind()
                )))
            }
        }
        Ok(())
    }

    /// Name of the element type.
    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Bit(_) => "bool",
            ColumnData::I8(_) => "i8",
            ColumnData::I16(_) => "i16",
            ColumnData::I32(_) => "i32",
            ColumnData::I64(_) => "i64",
            ColumnData::F32(_) => "f32",
            ColumnData::F64(_) => "f64",
            ColumnData::Decimal(_) => "decimal",
            ColumnData::Text(_) => "text",
            ColumnData::Binary(_) => "binary",
            ColumnData::Date(_) => "date",
            ColumnData::Time(_) => "time",
            ColumnData::Timestamp(_) => "timestamp",
        }
    }
}

/// A column descriptor together with its values.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedColumn {
    pub descriptor: ColumnDescriptor,
    pub data: ColumnData,
}

impl TypedColumn {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The columns produced by one fetch round trip, all of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBatch {
    info: Arc<ColumnInfo>,
    /// Shared with the rows handed out from this batch.
    columns: Arc<Vec<ColumnData>>,
    num_rows: usize,
}

impl ColumnBatch {
    /// Assemble a batch, checking that every column has `num_rows` values.
    pub fn new(info: Arc<ColumnInfo>, columns: Vec<ColumnData>) -> Result<Self> {
        if columns.len() != info.len() {
            return Err(Error::invalid_state(format!(
                "Batch has {} columns, metadata describes {}",
                columns.len(),
                info.len()
            )));
        }
        let num_rows = columns.first().map_or(0, |c| c.len());
        if let Some(bad) = columns.iter().position(|c| c.len() != num_rows) {
            return Err(Error::invalid_state(format!(
                "Column {} has {} values, expected {}",
                bad + 1,
                columns[bad].len(),
                num_rows
            )));
        }
        Ok(Self {
            info,
            columns: Arc::new(columns),
            num_rows,
        })
    }

    /// An empty batch shaped after `info`.
    pub fn empty(info: Arc<ColumnInfo>) -> Self {
        let columns = info
            .columns
            .iter()
            .map(|c| ColumnData::with_capacity(&c.native, 0))
            .collect();
        Self {
            info,
            columns: Arc::new(columns),
            num_rows: 0,
        }
    }

    /// Build a batch from row-major values.
    pub fn from_rows(info: Arc<ColumnInfo>, rows: &[Vec<Value>]) -> Result<Self> {
        let mut columns: Vec<ColumnData> = info
            .columns
            .iter()
            .map(|c| ColumnData::with_capacity(&c.native, rows.len()))
            .collect();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::invalid_state(format!(
                    "Row {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value)?;
            }
        }
        Ok(Self {
            info,
            columns: Arc::new(columns),
            num_rows: rows.len(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Shared column information.
    pub fn info(&self) -> &Arc<ColumnInfo> {
        &self.info
    }

    pub fn descriptors(&self) -> &[ColumnDescriptor] {
        &self.info.columns
    }

    /// Column values by index (0-based).
    pub fn column(&self, index: usize) -> Option<&ColumnData> {
        self.columns.get(index)
    }

    /// Column values by name (case-insensitive).
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnData> {
        self.info
            .find_by_name(name)
            .and_then(|idx| self.columns.get(idx))
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    /// Row `index`, sharing this batch's columns.
    pub fn row(&self, index: usize) -> Option<Row> {
        if index >= self.num_rows {
            return None;
        }
        Some(Row::new(
            Arc::clone(&self.columns),
            Arc::clone(&self.info),
            index,
        ))
    }

    /// Iterate over the rows of the batch.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.num_rows).filter_map(move |i| self.row(i))
    }

    /// Append the rows of `other`, which must share the column layout.
    pub fn extend(&mut self, other: ColumnBatch) -> Result<()> {
        if other.columns.len() != self.columns.len() {
            return Err(Error::invalid_state(format!(
                "Cannot append a batch of {} columns to one of {}",
                other.columns.len(),
                self.columns.len()
            )));
        }
        let theirs = Arc::try_unwrap(other.columns).unwrap_or_else(|shared| (*shared).clone());
        // rows handed out earlier keep the columns as they were
        let columns = Arc::make_mut(&mut self.columns);
        for (mine, theirs) in columns.iter_mut().zip(theirs) {
            mine.extend(theirs)?;
        }
        self.num_rows += other.num_rows;
        Ok(())
    }

    /// Split into descriptor-carrying columns.
    pub fn into_typed_columns(self) -> Vec<TypedColumn> {
        let columns = Arc::try_unwrap(self.columns).unwrap_or_else(|shared| (*shared).clone());
        self.info
            .columns
            .iter()
            .cloned()
            .zip(columns)
            .map(|(descriptor, data)| TypedColumn { descriptor, data })
            .collect()
    }
}
