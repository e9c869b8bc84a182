//! Column-wise buffers bound to statements.
//!
//! A `ColumnBuffer` is one contiguous region of `batch_size` elements plus
//! a parallel indicator array. A `BufferSet` groups the buffers of every
//! result column (or parameter) of a statement, along with the overflow
//! slots holding cells recovered after truncation.

use std::collections::HashMap;

use bytes::Bytes;

use crate::driver::ParameterBinding;
use crate::error::{Error, Result};
use crate::handle::StatementHandle;
use crate::types::temporal::{
    decode_date, decode_time, decode_timestamp, encode_date, encode_time, encode_timestamp,
};
use crate::types::value::parse_decimal;
use crate::types::{ColumnData, ElementWidth, NativeType, Value, NO_TOTAL, NULL_DATA};

/// Allocate `len` zeroed values without aborting on failure.
fn try_zeroed<T: Clone + Default>(len: usize, element_len: usize, batch_size: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
        element_len,
        batch_size,
    })?;
    v.resize(len, T::default());
    Ok(v)
}

/// Buffer for one column or parameter.
#[derive(Debug)]
pub struct ColumnBuffer {
    native: NativeType,
    element_len: usize,
    batch_size: usize,
    data: Vec<u8>,
    indicators: Vec<isize>,
}

impl ColumnBuffer {
    /// Allocate room for `batch_size` elements of `native`.
    ///
    /// Sizes are computed with checked arithmetic and the allocation is
    /// fallible; both failures surface as `OutOfMemory`.
    pub fn allocate(native: NativeType, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize { batch_size });
        }
        let element_len = native.element_len();
        let total = element_len
            .checked_mul(batch_size)
            .ok_or(Error::OutOfMemory {
                element_len,
                batch_size,
            })?;
        Ok(Self {
            native,
            element_len,
            batch_size,
            data: try_zeroed(total, element_len, batch_size)?,
            indicators: try_zeroed(batch_size, element_len, batch_size)?,
        })
    }

    pub fn native(&self) -> &NativeType {
        &self.native
    }

    pub fn element_len(&self) -> usize {
        self.element_len
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The raw bytes of element `row`.
    pub fn element(&self, row: usize) -> &[u8] {
        let start = row * self.element_len;
        &self.data[start..start + self.element_len]
    }

    fn element_mut(&mut self, row: usize) -> &mut [u8] {
        let start = row * self.element_len;
        &mut self.data[start..start + self.element_len]
    }

    pub fn indicator(&self, row: usize) -> isize {
        self.indicators[row]
    }

    pub fn indicators(&self) -> &[isize] {
        &self.indicators
    }

    /// True if the driver could not fit the value of `row` into its element.
    pub fn is_truncated(&self, row: usize) -> bool {
        if !self.native.is_variable() {
            return false;
        }
        let indicator = self.indicators[row];
        indicator == NO_TOTAL || (indicator > 0 && indicator as usize > self.native.capacity())
    }

    /// Payload of `row` as held in the buffer, `None` for NULL.
    ///
    /// For a truncated cell this is the truncated prefix.
    pub fn payload(&self, row: usize) -> Option<&[u8]> {
        let indicator = self.indicators[row];
        if indicator == NULL_DATA {
            return None;
        }
        let element = self.element(row);
        let len = match (self.native, self.native.width()) {
            (NativeType::Binary { length }, _) => clamp(indicator, length),
            (_, ElementWidth::Fixed(n)) => n,
            (_, ElementWidth::Variable { max }) => clamp(indicator, max),
        };
        Some(&element[..len])
    }

    /// Marshal `value` into element `row`, setting its indicator.
    pub fn write(&mut self, row: usize, value: &Value) -> Result<()> {
        if value.is_null() {
            self.indicators[row] = NULL_DATA;
            return Ok(());
        }
        let native = self.native;
        let mismatch = || {
            Error::type_conversion(format!(
                "Cannot bind {} value as {}",
                value.kind(),
                native
            ))
        };
        let element = self.element_mut(row);
        let indicator = match native {
            NativeType::Bit => {
                let bit = match value {
                    Value::Bool(b) => *b,
                    other => other.to_i64().ok_or_else(mismatch)? != 0,
                };
                element[0] = bit as u8;
                1
            }
            NativeType::I8 => put(element, &int::<i8>(value, native)?.to_ne_bytes()),
            NativeType::I16 => put(element, &int::<i16>(value, native)?.to_ne_bytes()),
            NativeType::I32 => put(element, &int::<i32>(value, native)?.to_ne_bytes()),
            NativeType::I64 => put(element, &int::<i64>(value, native)?.to_ne_bytes()),
            NativeType::F32 => put(element, &(float(value, native)? as f32).to_ne_bytes()),
            NativeType::F64 => put(element, &float(value, native)?.to_ne_bytes()),
            NativeType::Decimal { .. } => {
                let text = value.to_decimal().ok_or_else(mismatch)?.to_string();
                put_variable(element, native.capacity(), text.as_bytes())?
            }
            NativeType::Text { wide, .. } => {
                let text = match value {
                    Value::Text(s) => std::borrow::Cow::Borrowed(s.as_str()),
                    Value::Binary(_) => return Err(mismatch()),
                    other => std::borrow::Cow::Owned(other.to_string()),
                };
                if wide {
                    let units: Vec<u8> = text
                        .encode_utf16()
                        .flat_map(|u| u.to_ne_bytes())
                        .collect();
                    put_variable(element, native.capacity(), &units)?
                } else {
                    put_variable(element, native.capacity(), text.as_bytes())?
                }
            }
            NativeType::Binary { .. } | NativeType::VarBinary { .. } => {
                let bytes = value.as_bytes().ok_or_else(mismatch)?;
                put_variable(element, native.capacity(), bytes)?
            }
            NativeType::Date => match value {
                Value::Date(d) => {
                    encode_date(d, element)?;
                    native.capacity()
                }
                _ => return Err(mismatch()),
            },
            NativeType::Time => match value {
                Value::Time(t) => {
                    encode_time(t, element)?;
                    native.capacity()
                }
                _ => return Err(mismatch()),
            },
            NativeType::Timestamp { .. } => {
                let ts = match value {
                    Value::Timestamp(ts) => *ts,
                    Value::Date(d) => d.and_hms_opt(0, 0, 0).ok_or_else(mismatch)?,
                    _ => return Err(mismatch()),
                };
                encode_timestamp(&ts, element)?;
                native.capacity()
            }
        };
        self.indicators[row] = indicator as isize;
        Ok(())
    }
}

fn clamp(indicator: isize, max: usize) -> usize {
    if indicator < 0 {
        max
    } else {
        (indicator as usize).min(max)
    }
}

fn put(element: &mut [u8], bytes: &[u8]) -> usize {
    element[..bytes.len()].copy_from_slice(bytes);
    bytes.len()
}

fn put_variable(element: &mut [u8], capacity: usize, bytes: &[u8]) -> Result<usize> {
    if bytes.len() > capacity {
        return Err(Error::type_conversion(format!(
            "Value of {} bytes exceeds parameter capacity of {} bytes",
            bytes.len(),
            capacity
        )));
    }
    element[..bytes.len()].copy_from_slice(bytes);
    // terminator, when the element has room for one
    element[bytes.len()..].iter_mut().take(2).for_each(|b| *b = 0);
    Ok(bytes.len())
}

fn int<T: TryFrom<i64>>(value: &Value, native: NativeType) -> Result<T> {
    let wide = match value {
        Value::Bool(b) => *b as i64,
        other => other.to_i64().ok_or_else(|| {
            Error::type_conversion(format!("Cannot bind {} value as {}", other.kind(), native))
        })?,
    };
    T::try_from(wide).map_err(|_| {
        Error::type_conversion(format!("Value {} out of range for {}", wide, native))
    })
}

/// Integers bound into a float buffer must convert exactly.
fn float(value: &Value, native: NativeType) -> Result<f64> {
    let f = value.to_f64().ok_or_else(|| {
        Error::type_conversion(format!("Cannot bind {} value as {}", value.kind(), native))
    })?;
    let integer = match value {
        Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_) => value.to_i64(),
        _ => None,
    };
    if let Some(v) = integer {
        let back = match native {
            NativeType::F32 => (f as f32) as i128,
            _ => f as i128,
        };
        if back != v as i128 {
            return Err(Error::type_conversion(format!(
                "Integer {} cannot be bound as {} without losing precision",
                v, native
            )));
        }
    }
    Ok(f)
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::type_conversion(format!("Expected {} bytes, got {}", N, bytes.len())))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| Error::type_conversion(format!("Invalid UTF-8 in text column: {}", e)))
}

fn utf16(bytes: &[u8]) -> Result<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|e| Error::type_conversion(format!("Invalid UTF-16 in text column: {}", e)))
}

/// Decode text payload, narrow or wide.
pub(crate) fn decode_text(bytes: &[u8], wide: bool) -> Result<String> {
    if wide {
        utf16(bytes)
    } else {
        utf8(bytes).map(str::to_string)
    }
}

/// Decode one non-NULL payload into a dynamic value.
pub(crate) fn decode_value(native: &NativeType, bytes: &[u8]) -> Result<Value> {
    Ok(match native {
        NativeType::Bit => Value::Bool(fixed::<1>(bytes)?[0] != 0),
        NativeType::I8 => Value::I8(i8::from_ne_bytes(fixed(bytes)?)),
        NativeType::I16 => Value::I16(i16::from_ne_bytes(fixed(bytes)?)),
        NativeType::I32 => Value::I32(i32::from_ne_bytes(fixed(bytes)?)),
        NativeType::I64 => Value::I64(i64::from_ne_bytes(fixed(bytes)?)),
        NativeType::F32 => Value::F32(f32::from_ne_bytes(fixed(bytes)?)),
        NativeType::F64 => Value::F64(f64::from_ne_bytes(fixed(bytes)?)),
        NativeType::Decimal { .. } => Value::Decimal(parse_decimal(utf8(bytes)?)?),
        NativeType::Text { wide, .. } => Value::Text(decode_text(bytes, *wide)?),
        NativeType::Binary { .. } | NativeType::VarBinary { .. } => Value::Binary(bytes.to_vec()),
        NativeType::Date => Value::Date(decode_date(bytes)?),
        NativeType::Time => Value::Time(decode_time(bytes)?),
        NativeType::Timestamp { .. } => Value::Timestamp(decode_timestamp(bytes)?),
    })
}

/// Buffers for all columns or parameters of one statement.
#[derive(Debug)]
pub struct BufferSet {
    columns: Vec<ColumnBuffer>,
    batch_size: usize,
    /// Recovered cells keyed by (row, column), valid for the current batch.
    overflow: HashMap<(usize, usize), Bytes>,
    bound: bool,
}

impl BufferSet {
    /// Allocate one buffer per native type.
    pub fn allocate(natives: &[NativeType], batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize { batch_size });
        }
        let columns = natives
            .iter()
            .map(|n| ColumnBuffer::allocate(*n, batch_size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            batch_size,
            overflow: HashMap::new(),
            bound: false,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnBuffer> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[ColumnBuffer] {
        &self.columns
    }

    /// True if the buffers must be (re)bound before the next driver call.
    pub fn needs_binding(&self) -> bool {
        !self.bound
    }

    /// Reallocate every buffer for a new batch size.
    ///
    /// A no-op when the size is unchanged.
    pub fn rebind(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize { batch_size });
        }
        if batch_size == self.batch_size {
            return Ok(());
        }
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnBuffer::allocate(c.native, batch_size))
            .collect::<Result<Vec<_>>>()?;
        self.columns = columns;
        self.batch_size = batch_size;
        self.overflow.clear();
        self.bound = false;
        Ok(())
    }

    /// Replace the buffer at `index` with one laid out for `native`.
    pub fn reshape(&mut self, index: usize, native: NativeType) -> Result<()> {
        let count = self.columns.len();
        let slot = self
            .columns
            .get_mut(index)
            .ok_or(Error::ColumnIndexOutOfBounds { index, count })?;
        *slot = ColumnBuffer::allocate(native, self.batch_size)?;
        self.bound = false;
        Ok(())
    }

    /// Marshal `value` into parameter `index` at `row`.
    pub fn write(&mut self, index: usize, row: usize, value: &Value) -> Result<()> {
        let count = self.columns.len();
        self.columns
            .get_mut(index)
            .ok_or(Error::ColumnIndexOutOfBounds { index, count })?
            .write(row, value)
    }

    /// Bind every buffer as a result column of `stmt`.
    ///
    /// The caller must unbind (or drop the statement) before this set is
    /// dropped or reallocated.
    pub(crate) fn bind_columns(&mut self, stmt: &StatementHandle<'_>) -> Result<()> {
        stmt.set_row_array_size(self.batch_size)?;
        for (i, column) in self.columns.iter_mut().enumerate() {
            // SAFETY: the buffers hold `batch_size` elements and indicators,
            // and the owner unbinds them before releasing the memory.
            unsafe {
                stmt.bind_col(
                    (i + 1) as u16,
                    column.native.c_type(),
                    column.data.as_mut_ptr(),
                    column.element_len,
                    column.indicators.as_mut_ptr(),
                )?;
            }
        }
        self.bound = true;
        Ok(())
    }

    /// Bind every buffer as a parameter of `stmt`, described by `bindings`.
    pub(crate) fn bind_parameters(
        &mut self,
        stmt: &StatementHandle<'_>,
        bindings: &[ParameterBinding],
    ) -> Result<()> {
        for (i, (column, binding)) in self.columns.iter().zip(bindings).enumerate() {
            // SAFETY: as in `bind_columns`; parameters are reset before the
            // memory is released.
            unsafe {
                stmt.bind_parameter(
                    (i + 1) as u16,
                    binding,
                    column.data.as_ptr(),
                    column.element_len,
                    column.indicators.as_ptr(),
                )?;
            }
        }
        self.bound = true;
        Ok(())
    }

    /// Store the recovered value of a truncated cell.
    pub fn set_overflow(&mut self, row: usize, column: usize, bytes: Bytes) {
        self.overflow.insert((row, column), bytes);
    }

    /// Drop recovered cells of the previous batch.
    pub fn clear_overflow(&mut self) {
        self.overflow.clear();
    }

    /// Full payload of a cell, taking recovered overflow into account.
    pub fn payload(&self, column: usize, row: usize) -> Option<&[u8]> {
        if let Some(bytes) = self.overflow.get(&(row, column)) {
            return Some(bytes);
        }
        self.columns[column].payload(row)
    }

    fn decode_column<T>(
        &self,
        column: usize,
        rows: usize,
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<Vec<Option<T>>> {
        (0..rows)
            .map(|row| self.payload(column, row).map(&decode).transpose())
            .collect()
    }

    /// Copy the first `rows` values of `column` into a typed column.
    pub fn materialize(&self, column: usize, rows: usize) -> Result<ColumnData> {
        let count = self.columns.len();
        let native = self
            .columns
            .get(column)
            .ok_or(Error::ColumnIndexOutOfBounds {
                index: column,
                count,
            })?
            .native;
        if rows > self.batch_size {
            return Err(Error::invalid_state(format!(
                "{} rows requested from a batch of {}",
                rows, self.batch_size
            )));
        }
        Ok(match native {
            NativeType::Bit => {
                ColumnData::Bit(self.decode_column(column, rows, |b| Ok(fixed::<1>(b)?[0] != 0))?)
            }
            NativeType::I8 => {
                ColumnData::I8(self.decode_column(column, rows, |b| Ok(i8::from_ne_bytes(fixed(b)?)))?)
            }
            NativeType::I16 => ColumnData::I16(
                self.decode_column(column, rows, |b| Ok(i16::from_ne_bytes(fixed(b)?)))?,
            ),
            NativeType::I32 => ColumnData::I32(
                self.decode_column(column, rows, |b| Ok(i32::from_ne_bytes(fixed(b)?)))?,
            ),
            NativeType::I64 => ColumnData::I64(
                self.decode_column(column, rows, |b| Ok(i64::from_ne_bytes(fixed(b)?)))?,
            ),
            NativeType::F32 => ColumnData::F32(
                self.decode_column(column, rows, |b| Ok(f32::from_ne_bytes(fixed(b)?)))?,
            ),
            NativeType::F64 => ColumnData::F64(
                self.decode_column(column, rows, |b| Ok(f64::from_ne_bytes(fixed(b)?)))?,
            ),
            NativeType::Decimal { .. } => ColumnData::Decimal(
                self.decode_column(column, rows, |b| parse_decimal(utf8(b)?))?,
            ),
            NativeType::Text { wide, .. } => {
                ColumnData::Text(self.decode_column(column, rows, |b| decode_text(b, wide))?)
            }
            NativeType::Binary { .. } | NativeType::VarBinary { .. } => {
                ColumnData::Binary(self.decode_column(column, rows, |b| Ok(b.to_vec()))?)
            }
            NativeType::Date => ColumnData::Date(self.decode_column(column, rows, decode_date)?),
            NativeType::Time => ColumnData::Time(self.decode_column(column, rows, decode_time)?),
            NativeType::Timestamp { .. } => {
                ColumnData::Timestamp(self.decode_column(column, rows, decode_timestamp)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn text(max_len: usize) -> NativeType {
        NativeType::Text {
            max_len,
            wide: false,
            fixed: false,
        }
    }

    #[test]
    fn test_allocation_sizes() {
        let buffer = ColumnBuffer::allocate(NativeType::I64, 100).unwrap();
        assert_eq!(buffer.element_len(), 8);
        assert_eq!(buffer.indicators().len(), 100);
        assert_eq!(buffer.data.len(), 800);

        // variable data reserves room for the terminator
        let buffer = ColumnBuffer::allocate(text(10), 4).unwrap();
        assert_eq!(buffer.element_len(), 11);
        assert_eq!(buffer.data.len(), 44);
    }

    #[test]
    fn test_overflowing_size_is_out_of_memory() {
        let err = ColumnBuffer::allocate(text(1 << 20), usize::MAX / 2).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { .. }));
        assert!(matches!(
            BufferSet::allocate(&[NativeType::I32], 0),
            Err(Error::InvalidBatchSize { batch_size: 0 })
        ));
    }

    #[test]
    fn test_write_and_materialize() {
        let natives = [
            NativeType::I32,
            text(8),
            NativeType::Decimal {
                precision: 5,
                scale: 2,
            },
            NativeType::Date,
        ];
        let mut set = BufferSet::allocate(&natives, 3).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        set.write(0, 0, &Value::I32(7)).unwrap();
        set.write(0, 1, &Value::Null).unwrap();
        set.write(1, 0, &Value::Text("abc".into())).unwrap();
        set.write(1, 1, &Value::Text(String::new())).unwrap();
        set.write(2, 0, &Value::Decimal(Decimal::new(12345, 2))).unwrap();
        set.write(2, 1, &Value::Null).unwrap();
        set.write(3, 0, &Value::Date(date)).unwrap();
        set.write(3, 1, &Value::Null).unwrap();

        assert_eq!(
            set.materialize(0, 2).unwrap(),
            ColumnData::I32(vec![Some(7), None])
        );
        assert_eq!(
            set.materialize(1, 2).unwrap(),
            ColumnData::Text(vec![Some("abc".into()), Some(String::new())])
        );
        assert_eq!(
            set.materialize(2, 2).unwrap(),
            ColumnData::Decimal(vec![Some(Decimal::new(12345, 2)), None])
        );
        assert_eq!(
            set.materialize(3, 2).unwrap(),
            ColumnData::Date(vec![Some(date), None])
        );
    }

    #[test]
    fn test_exact_decimals_are_never_rounded() {
        let native = NativeType::Decimal {
            precision: 38,
            scale: 34,
        };
        let mut set = BufferSet::allocate(&[native], 3).unwrap();
        let cells: [&[u8]; 3] = [
            b"2.500000000000000000000000000000000",
            b"0.123456789012345678901234567891234",
            b"12345678901234567890123456789012345678",
        ];
        let element_len = set.columns[0].element_len;
        for (row, cell) in cells.iter().enumerate() {
            let start = row * element_len;
            set.columns[0].data[start..start + cell.len()].copy_from_slice(cell);
            set.columns[0].indicators[row] = cell.len() as isize;
        }

        assert_eq!(
            set.materialize(0, 1).unwrap(),
            ColumnData::Decimal(vec![Some(Decimal::new(25, 1))])
        );
        // a digit that does not fit fails the batch instead of rounding
        assert!(matches!(
            set.materialize(0, 2),
            Err(Error::TypeConversion { .. })
        ));
        for row in 1..3 {
            let payload = set.payload(0, row).unwrap();
            assert!(matches!(
                decode_value(&native, payload),
                Err(Error::TypeConversion { .. })
            ));
        }
    }

    #[test]
    fn test_write_rejects_mismatch_and_overflow() {
        let mut buffer = ColumnBuffer::allocate(text(3), 1).unwrap();
        assert!(matches!(
            buffer.write(0, &Value::Text("toolong".into())),
            Err(Error::TypeConversion { .. })
        ));
        let mut buffer = ColumnBuffer::allocate(NativeType::I8, 1).unwrap();
        assert!(buffer.write(0, &Value::I64(300)).is_err());
        assert!(buffer.write(0, &Value::Binary(vec![1])).is_err());
        buffer.write(0, &Value::I16(-5)).unwrap();
        assert_eq!(buffer.payload(0), Some(&(-5i8).to_ne_bytes()[..]));
    }

    #[test]
    fn test_float_buffers_refuse_inexact_integers() {
        let mut doubles = ColumnBuffer::allocate(NativeType::F64, 1).unwrap();
        doubles.write(0, &Value::I64(1 << 53)).unwrap();
        assert_eq!(doubles.payload(0), Some(&((1u64 << 53) as f64).to_ne_bytes()[..]));
        assert!(matches!(
            doubles.write(0, &Value::I64((1 << 53) + 1)),
            Err(Error::TypeConversion { .. })
        ));
        assert!(doubles.write(0, &Value::I64(i64::MAX)).is_err());

        let mut singles = ColumnBuffer::allocate(NativeType::F32, 1).unwrap();
        singles.write(0, &Value::I32(3)).unwrap();
        assert!(singles.write(0, &Value::I32(16_777_217)).is_err());
        singles.write(0, &Value::F64(0.1)).unwrap();
    }

    #[test]
    fn test_truncation_and_overflow_slots() {
        let mut set = BufferSet::allocate(&[text(4)], 2).unwrap();
        set.columns[0].indicators[0] = 9;
        set.columns[0].data[..4].copy_from_slice(b"abcd");
        set.columns[0].indicators[1] = NO_TOTAL;
        assert!(set.columns[0].is_truncated(0));
        assert!(set.columns[0].is_truncated(1));
        assert_eq!(set.payload(0, 0), Some(&b"abcd"[..]));

        set.set_overflow(0, 0, Bytes::from_static(b"abcdefghi"));
        assert_eq!(set.payload(0, 0), Some(&b"abcdefghi"[..]));
        set.clear_overflow();
        assert_eq!(set.payload(0, 0), Some(&b"abcd"[..]));
    }

    #[test]
    fn test_rebind_and_reshape() {
        let mut set = BufferSet::allocate(&[NativeType::I32], 4).unwrap();
        set.bound = true;
        set.rebind(4).unwrap();
        assert!(!set.needs_binding());
        set.rebind(16).unwrap();
        assert!(set.needs_binding());
        assert_eq!(set.column(0).unwrap().indicators().len(), 16);

        set.reshape(0, text(32)).unwrap();
        assert_eq!(set.column(0).unwrap().native(), &text(32));
        assert!(matches!(
            set.reshape(3, NativeType::I8),
            Err(Error::ColumnIndexOutOfBounds { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_wide_text_round_trip() {
        let wide = NativeType::Text {
            max_len: 8,
            wide: true,
            fixed: false,
        };
        let mut set = BufferSet::allocate(&[wide], 1).unwrap();
        set.write(0, 0, &Value::Text("héllo".into())).unwrap();
        assert_eq!(set.column(0).unwrap().indicator(0), 10);
        assert_eq!(
            set.materialize(0, 1).unwrap(),
            ColumnData::Text(vec![Some("héllo".into())])
        );
    }
}
