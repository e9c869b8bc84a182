//! Dynamic single-cell values and host parameter conversion.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::fmt;

use crate::error::{Error, Result};

/// Most fractional digits a `Decimal` carries.
const MAX_DECIMAL_SCALE: usize = 28;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value.
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Exact decimal (DECIMAL/NUMERIC in exact mode).
    Decimal(Decimal),
    /// Character data (CHAR, VARCHAR, WVARCHAR, ...).
    Text(String),
    /// Binary data (BINARY, VARBINARY, ...).
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Try to get the value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Try to convert to i64. Works for every integer variant and for
    /// decimals without a fractional part.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::I8(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::Decimal(d) if d.fract().is_zero() => i64::try_from(*d).ok(),
            _ => None,
        }
    }

    /// Try to convert to f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::Decimal(d) => f64::try_from(*d).ok(),
            other => other.to_i64().map(|v| v as f64),
        }
    }

    /// Try to get the value as an exact decimal.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::F32(v) => Decimal::try_from(*v).ok(),
            Value::F64(v) => Decimal::try_from(*v).ok(),
            other => other.to_i64().map(Decimal::from),
        }
    }

    /// Try to get the value as a timestamp.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Parse the textual form of a DECIMAL value without rounding.
///
/// Zeros past the 28th fractional digit are dropped; any other digit that
/// `Decimal` cannot hold makes the parse fail with `TypeConversion`.
pub(crate) fn parse_decimal(text: &str) -> Result<Decimal> {
    let text = text.trim();
    let parsed = match text.find(['e', 'E']) {
        Some(exponent) => {
            let mantissa = &text[..exponent];
            if significant_digits(mantissa) > MAX_DECIMAL_SCALE {
                return Err(Error::type_conversion(format!(
                    "Decimal '{}' has more digits than an exact decimal holds",
                    text
                )));
            }
            Decimal::from_scientific(text)
        }
        None => Decimal::from_str_exact(trim_excess_zeros(text)),
    };
    parsed.map_err(|e| {
        Error::type_conversion(format!("Decimal '{}' cannot be held exactly: {}", text, e))
    })
}

fn trim_excess_zeros(text: &str) -> &str {
    let Some(point) = text.find('.') else {
        return text;
    };
    let bytes = text.as_bytes();
    let mut end = text.len();
    while end - point - 1 > MAX_DECIMAL_SCALE && bytes[end - 1] == b'0' {
        end -= 1;
    }
    &text[..end]
}

fn significant_digits(mantissa: &str) -> usize {
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_start_matches('0');
    let digits = if mantissa.contains('.') {
        digits.trim_end_matches('0')
    } else {
        digits
    };
    digits.len()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Binary(b) => write!(f, "<BINARY: {} bytes>", b.len()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

/// A host value that can be bound as a statement parameter.
///
/// `to_value` returns `None` when the runtime type has no SQL mapping; the
/// executor then reports `UnsupportedParameterType` with `type_name`.
pub trait ToParameter {
    /// Convert into a bindable value.
    fn to_value(&self) -> Option<Value>;

    /// Name of the host type, used in error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl ToParameter for Value {
    fn to_value(&self) -> Option<Value> {
        Some(self.clone())
    }
}

macro_rules! impl_to_parameter {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToParameter for $ty {
                fn to_value(&self) -> Option<Value> {
                    Some(Value::$variant((*self).into()))
                }
            }
        )*
    };
}

impl_to_parameter! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => I16,
    u16 => I32,
    u32 => I64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
}

impl ToParameter for u64 {
    fn to_value(&self) -> Option<Value> {
        // no standard unsigned 64-bit SQL type
        i64::try_from(*self).ok().map(Value::I64)
    }
}

impl ToParameter for char {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.to_string()))
    }
}

impl ToParameter for str {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.to_string()))
    }
}

impl ToParameter for String {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Text(self.clone()))
    }
}

impl ToParameter for [u8] {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Binary(self.to_vec()))
    }
}

impl ToParameter for Vec<u8> {
    fn to_value(&self) -> Option<Value> {
        Some(Value::Binary(self.clone()))
    }
}

/// Intervals have no portable representation in the call-level interface.
impl ToParameter for std::time::Duration {
    fn to_value(&self) -> Option<Value> {
        None
    }
}

impl<T: ToParameter> ToParameter for Option<T> {
    fn to_value(&self) -> Option<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Some(Value::Null),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Some(v) => v.type_name(),
            None => std::any::type_name::<Self>(),
        }
    }
}

impl<T: ToParameter + ?Sized> ToParameter for &T {
    fn to_value(&self) -> Option<Value> {
        (**self).to_value()
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}
