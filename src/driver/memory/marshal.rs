//! Conversion between stored cells and bound C buffers.

use bytes::Bytes;

use super::store::Cell;
use crate::error::Diagnostic;
use crate::types::temporal::{
    decode_date, decode_time, decode_timestamp, encode_date, encode_time, encode_timestamp,
    DATE_STRUCT_LEN, TIMESTAMP_STRUCT_LEN, TIME_STRUCT_LEN,
};
use crate::types::{CDataType, NULL_DATA};

/// SQL_NTS: the buffer holds a NUL terminated string.
const NTS: isize = -3;

/// A cell rendered in the layout of a C data type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rendered {
    Null,
    /// Fixed-size struct or scalar.
    Fixed(Vec<u8>),
    /// Character or binary payload, terminator excluded.
    Variable(Vec<u8>),
}

fn restricted(cell: &Cell, c_type: CDataType) -> Diagnostic {
    Diagnostic::new(
        "07006",
        0,
        format!("Restricted data type attribute violation: {:?} as {:?}", cell, c_type),
    )
}

fn out_of_range() -> Diagnostic {
    Diagnostic::new("22003", 0, "Numeric value out of range")
}

fn to_i64(cell: &Cell, c_type: CDataType) -> Result<i64, Diagnostic> {
    match cell {
        Cell::Int(n) => Ok(*n),
        Cell::Bool(b) => Ok(*b as i64),
        Cell::Decimal(d) => i64::try_from(d.trunc()).map_err(|_| out_of_range()),
        Cell::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Ok(f.trunc() as i64),
        Cell::Float(_) => Err(out_of_range()),
        Cell::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| Diagnostic::new("22018", 0, format!("Invalid character value '{}'", s))),
        other => Err(restricted(other, c_type)),
    }
}

fn to_f64(cell: &Cell, c_type: CDataType) -> Result<f64, Diagnostic> {
    match cell {
        Cell::Float(f) => Ok(*f),
        Cell::Decimal(d) => f64::try_from(*d).map_err(|_| out_of_range()),
        Cell::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| Diagnostic::new("22018", 0, format!("Invalid character value '{}'", s))),
        other => to_i64(other, c_type).map(|n| n as f64),
    }
}

fn narrow<T: TryFrom<i64>>(n: i64) -> Result<T, Diagnostic> {
    T::try_from(n).map_err(|_| out_of_range())
}

/// Render `cell` as `c_type`.
pub(crate) fn render(cell: &Cell, c_type: CDataType) -> Result<Rendered, Diagnostic> {
    if *cell == Cell::Null {
        return Ok(Rendered::Null);
    }
    let fixed = match c_type {
        CDataType::Char => {
            let text = cell.to_text().unwrap_or_default();
            return Ok(Rendered::Variable(text.into_bytes()));
        }
        CDataType::WChar => {
            let text = cell.to_text().unwrap_or_default();
            let bytes = text.encode_utf16().flat_map(|u| u.to_ne_bytes()).collect();
            return Ok(Rendered::Variable(bytes));
        }
        CDataType::Binary => {
            return match cell {
                Cell::Bytes(b) => Ok(Rendered::Variable(b.to_vec())),
                Cell::Text(s) => Ok(Rendered::Variable(s.as_bytes().to_vec())),
                other => Err(restricted(other, c_type)),
            };
        }
        CDataType::Bit => vec![(to_i64(cell, c_type)? != 0) as u8],
        CDataType::STinyInt => narrow::<i8>(to_i64(cell, c_type)?)?.to_ne_bytes().to_vec(),
        CDataType::SShort => narrow::<i16>(to_i64(cell, c_type)?)?.to_ne_bytes().to_vec(),
        CDataType::SLong => narrow::<i32>(to_i64(cell, c_type)?)?.to_ne_bytes().to_vec(),
        CDataType::SBigInt => to_i64(cell, c_type)?.to_ne_bytes().to_vec(),
        CDataType::Float => (to_f64(cell, c_type)? as f32).to_ne_bytes().to_vec(),
        CDataType::Double => to_f64(cell, c_type)?.to_ne_bytes().to_vec(),
        CDataType::TypeDate => {
            let date = match cell {
                Cell::Date(d) => *d,
                Cell::Timestamp(ts) => ts.date(),
                other => return Err(restricted(other, c_type)),
            };
            let mut out = vec![0u8; DATE_STRUCT_LEN];
            encode_date(&date, &mut out).map_err(|e| out_of_range_with(e.to_string()))?;
            out
        }
        CDataType::TypeTime => {
            let time = match cell {
                Cell::Time(t) => *t,
                Cell::Timestamp(ts) => ts.time(),
                other => return Err(restricted(other, c_type)),
            };
            let mut out = vec![0u8; TIME_STRUCT_LEN];
            encode_time(&time, &mut out).map_err(|e| out_of_range_with(e.to_string()))?;
            out
        }
        CDataType::TypeTimestamp => {
            let ts = match cell {
                Cell::Timestamp(ts) => *ts,
                Cell::Date(d) => d.and_hms_opt(0, 0, 0).ok_or_else(|| restricted(cell, c_type))?,
                other => return Err(restricted(other, c_type)),
            };
            let mut out = vec![0u8; TIMESTAMP_STRUCT_LEN];
            encode_timestamp(&ts, &mut out).map_err(|e| out_of_range_with(e.to_string()))?;
            out
        }
    };
    Ok(Rendered::Fixed(fixed))
}

fn out_of_range_with(message: String) -> Diagnostic {
    Diagnostic::new("22008", 0, message)
}

/// Outcome of writing one element into a bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Written {
    pub indicator: isize,
    pub truncated: bool,
}

/// Write `rendered` into one buffer element.
///
/// Variable data is cut at the element's capacity and terminated; the
/// indicator then reports the full length, or `NO_TOTAL` when `no_total`.
pub(crate) fn write_element(
    rendered: &Rendered,
    c_type: CDataType,
    target: &mut [u8],
    no_total: bool,
) -> Result<Written, Diagnostic> {
    match rendered {
        Rendered::Null => Ok(Written {
            indicator: NULL_DATA,
            truncated: false,
        }),
        Rendered::Fixed(bytes) => {
            if target.len() < bytes.len() {
                return Err(Diagnostic::new("HY090", 0, "Invalid buffer length"));
            }
            target[..bytes.len()].copy_from_slice(bytes);
            Ok(Written {
                indicator: bytes.len() as isize,
                truncated: false,
            })
        }
        Rendered::Variable(bytes) => {
            let n = copy_chunk(bytes, c_type, target)?;
            let truncated = n < bytes.len();
            Ok(Written {
                indicator: if truncated && no_total {
                    crate::types::NO_TOTAL
                } else {
                    bytes.len() as isize
                },
                truncated,
            })
        }
    }
}

/// Copy as much of `bytes` as fits, terminating character data.
///
/// Returns the number of payload bytes copied.
pub(crate) fn copy_chunk(bytes: &[u8], c_type: CDataType, target: &mut [u8]) -> Result<usize, Diagnostic> {
    let term = c_type.terminator_len();
    if target.len() < term {
        return Err(Diagnostic::new("HY090", 0, "Invalid buffer length"));
    }
    let mut capacity = target.len() - term;
    if c_type == CDataType::WChar {
        capacity -= capacity % 2;
    }
    let n = bytes.len().min(capacity);
    target[..n].copy_from_slice(&bytes[..n]);
    target[n..n + term].fill(0);
    Ok(n)
}

fn invalid_buffer(what: &str) -> Diagnostic {
    Diagnostic::new("HY090", 0, format!("Invalid {} parameter buffer", what))
}

/// Payload of a variable parameter, sized by its indicator or terminator.
fn variable_payload(source: &[u8], indicator: isize, unit: usize) -> Result<&[u8], Diagnostic> {
    let len = if indicator == NTS {
        source
            .chunks(unit)
            .position(|c| c.iter().all(|b| *b == 0))
            .map(|p| p * unit)
            .unwrap_or(source.len())
    } else if indicator >= 0 {
        indicator as usize
    } else {
        return Err(invalid_buffer("length"));
    };
    source.get(..len).ok_or_else(|| invalid_buffer("length"))
}

/// Read one bound parameter element back into a cell.
pub(crate) fn read_element(c_type: CDataType, source: &[u8], indicator: isize) -> Result<Cell, Diagnostic> {
    if indicator == NULL_DATA {
        return Ok(Cell::Null);
    }
    let fixed = |n: usize| source.get(..n).ok_or_else(|| invalid_buffer("fixed"));
    let payload = |unit: usize| variable_payload(source, indicator, unit);

    let cell = match c_type {
        CDataType::Char => {
            let bytes = payload(1)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| Diagnostic::new("22018", 0, "Parameter is not valid UTF-8"))?;
            Cell::Text(text.to_string())
        }
        CDataType::WChar => {
            let bytes = payload(2)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect();
            let text = String::from_utf16(&units)
                .map_err(|_| Diagnostic::new("22018", 0, "Parameter is not valid UTF-16"))?;
            Cell::Text(text)
        }
        CDataType::Binary => Cell::Bytes(Bytes::copy_from_slice(payload(1)?)),
        CDataType::Bit => Cell::Bool(fixed(1)?[0] != 0),
        CDataType::STinyInt => Cell::Int(i8::from_ne_bytes([fixed(1)?[0]]) as i64),
        CDataType::SShort => {
            let b = fixed(2)?;
            Cell::Int(i16::from_ne_bytes([b[0], b[1]]) as i64)
        }
        CDataType::SLong => {
            let b = fixed(4)?;
            Cell::Int(i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as i64)
        }
        CDataType::SBigInt => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(fixed(8)?);
            Cell::Int(i64::from_ne_bytes(raw))
        }
        CDataType::Float => {
            let b = fixed(4)?;
            Cell::Float(f32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f64)
        }
        CDataType::Double => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(fixed(8)?);
            Cell::Float(f64::from_ne_bytes(raw))
        }
        CDataType::TypeDate => Cell::Date(
            decode_date(fixed(DATE_STRUCT_LEN)?).map_err(|e| out_of_range_with(e.to_string()))?,
        ),
        CDataType::TypeTime => Cell::Time(
            decode_time(fixed(TIME_STRUCT_LEN)?).map_err(|e| out_of_range_with(e.to_string()))?,
        ),
        CDataType::TypeTimestamp => Cell::Timestamp(
            decode_timestamp(fixed(TIMESTAMP_STRUCT_LEN)?)
                .map_err(|e| out_of_range_with(e.to_string()))?,
        ),
    };
    Ok(cell)
}
