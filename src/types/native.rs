//! Native value representations a column or parameter is marshalled into.
//!
//! Each variant fixes the buffer layout (C data type and element width) and
//! the conversion applied to raw buffer bytes. Nullability is a column
//! property, not part of the native type.

use std::fmt;

use super::sql_type::{CDataType, SqlDataType};
use super::temporal::{DATE_STRUCT_LEN, TIMESTAMP_STRUCT_LEN, TIME_STRUCT_LEN};

/// Width of one buffer element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementWidth {
    /// Every element occupies exactly this many bytes.
    Fixed(usize),
    /// Elements are at most `max` payload bytes, length held by the indicator.
    Variable { max: usize },
}

/// Native type a database column or parameter is represented as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Bit,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Exact decimal, transferred as text and parsed without rounding.
    Decimal { precision: usize, scale: i16 },
    /// Fixed-length binary.
    Binary { length: usize },
    /// Variable-length binary of at most `max_len` bytes.
    VarBinary { max_len: usize },
    /// Character data. `max_len` counts bytes for narrow text and UTF-16
    /// code units for wide text.
    Text {
        max_len: usize,
        wide: bool,
        fixed: bool,
    },
    Date,
    Time,
    /// Timestamp with `precision` fractional second digits.
    Timestamp { precision: i16 },
}

impl NativeType {
    /// Element width of this type.
    pub fn width(&self) -> ElementWidth {
        match self {
            NativeType::Bit | NativeType::I8 => ElementWidth::Fixed(1),
            NativeType::I16 => ElementWidth::Fixed(2),
            NativeType::I32 | NativeType::F32 => ElementWidth::Fixed(4),
            NativeType::I64 | NativeType::F64 => ElementWidth::Fixed(8),
            NativeType::Date => ElementWidth::Fixed(DATE_STRUCT_LEN),
            NativeType::Time => ElementWidth::Fixed(TIME_STRUCT_LEN),
            NativeType::Timestamp { .. } => ElementWidth::Fixed(TIMESTAMP_STRUCT_LEN),
            NativeType::Binary { length } => ElementWidth::Fixed(*length),
            // sign, leading zero and decimal point on top of the digits
            NativeType::Decimal { precision, .. } => ElementWidth::Variable {
                max: precision + 3,
            },
            NativeType::VarBinary { max_len } => ElementWidth::Variable { max: *max_len },
            NativeType::Text { max_len, wide, .. } => ElementWidth::Variable {
                max: if *wide { max_len * 2 } else { *max_len },
            },
        }
    }

    /// True if the indicator carries the element's byte length.
    pub fn is_variable(&self) -> bool {
        matches!(self.width(), ElementWidth::Variable { .. })
    }

    /// C data type the buffer is bound as.
    pub fn c_type(&self) -> CDataType {
        match self {
            NativeType::Bit => CDataType::Bit,
            NativeType::I8 => CDataType::STinyInt,
            NativeType::I16 => CDataType::SShort,
            NativeType::I32 => CDataType::SLong,
            NativeType::I64 => CDataType::SBigInt,
            NativeType::F32 => CDataType::Float,
            NativeType::F64 => CDataType::Double,
            NativeType::Decimal { .. } => CDataType::Char,
            NativeType::Binary { .. } | NativeType::VarBinary { .. } => CDataType::Binary,
            NativeType::Text { wide: true, .. } => CDataType::WChar,
            NativeType::Text { wide: false, .. } => CDataType::Char,
            NativeType::Date => CDataType::TypeDate,
            NativeType::Time => CDataType::TypeTime,
            NativeType::Timestamp { .. } => CDataType::TypeTimestamp,
        }
    }

    /// Payload bytes one element can hold, excluding the terminator.
    pub fn capacity(&self) -> usize {
        match self.width() {
            ElementWidth::Fixed(n) => n,
            ElementWidth::Variable { max } => max,
        }
    }

    /// Bytes one buffer element occupies, terminator included.
    ///
    /// Never zero: a zero-length element would make every row share an address.
    pub fn element_len(&self) -> usize {
        (self.capacity() + self.c_type().terminator_len()).max(1)
    }

    /// SQL type used when binding a value of this type as a parameter.
    pub fn sql_type(&self) -> SqlDataType {
        match self {
            NativeType::Bit => SqlDataType::BIT,
            NativeType::I8 => SqlDataType::TINYINT,
            NativeType::I16 => SqlDataType::SMALLINT,
            NativeType::I32 => SqlDataType::INTEGER,
            NativeType::I64 => SqlDataType::BIGINT,
            NativeType::F32 => SqlDataType::REAL,
            NativeType::F64 => SqlDataType::DOUBLE,
            NativeType::Decimal { .. } => SqlDataType::DECIMAL,
            NativeType::Binary { .. } => SqlDataType::BINARY,
            NativeType::VarBinary { .. } => SqlDataType::VARBINARY,
            NativeType::Text {
                wide: false,
                fixed: false,
                ..
            } => SqlDataType::VARCHAR,
            NativeType::Text {
                wide: false,
                fixed: true,
                ..
            } => SqlDataType::CHAR,
            NativeType::Text {
                wide: true,
                fixed: false,
                ..
            } => SqlDataType::WVARCHAR,
            NativeType::Text {
                wide: true,
                fixed: true,
                ..
            } => SqlDataType::WCHAR,
            NativeType::Date => SqlDataType::TYPE_DATE,
            NativeType::Time => SqlDataType::TYPE_TIME,
            NativeType::Timestamp { .. } => SqlDataType::TYPE_TIMESTAMP,
        }
    }

    /// Column size reported alongside `sql_type` when binding.
    pub fn column_size(&self) -> usize {
        match self {
            NativeType::Bit => 1,
            NativeType::I8 => 3,
            NativeType::I16 => 5,
            NativeType::I32 => 10,
            NativeType::I64 => 19,
            NativeType::F32 => 7,
            NativeType::F64 => 15,
            NativeType::Decimal { precision, .. } => *precision,
            NativeType::Binary { length } => (*length).max(1),
            NativeType::VarBinary { max_len } => (*max_len).max(1),
            NativeType::Text { max_len, .. } => (*max_len).max(1),
            NativeType::Date => 10,
            NativeType::Time => 8,
            NativeType::Timestamp { precision } if *precision > 0 => 20 + *precision as usize,
            NativeType::Timestamp { .. } => 19,
        }
    }

    /// Decimal digits reported alongside `sql_type` when binding.
    pub fn decimal_digits(&self) -> i16 {
        match self {
            NativeType::Decimal { scale, .. } => *scale,
            NativeType::Timestamp { precision } => *precision,
            _ => 0,
        }
    }

    /// True if both types share a variant, regardless of sizes.
    pub fn same_kind(&self, other: &NativeType) -> bool {
        match (self, other) {
            (
                NativeType::Text { wide: a, .. },
                NativeType::Text { wide: b, .. },
            ) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    /// True if a buffer laid out for `self` can hold every value of `other`.
    pub fn can_hold(&self, other: &NativeType) -> bool {
        match (self, other) {
            (
                NativeType::Decimal { precision: p1, scale: s1 },
                NativeType::Decimal { precision: p2, scale: s2 },
            ) => s1 == s2 && p1 >= p2,
            (NativeType::Binary { length: a }, NativeType::Binary { length: b }) => a == b,
            (NativeType::Timestamp { precision: a }, NativeType::Timestamp { precision: b }) => {
                a >= b
            }
            _ => self.same_kind(other) && self.capacity() >= other.capacity(),
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Bit => write!(f, "bool"),
            NativeType::I8 => write!(f, "i8"),
            NativeType::I16 => write!(f, "i16"),
            NativeType::I32 => write!(f, "i32"),
            NativeType::I64 => write!(f, "i64"),
            NativeType::F32 => write!(f, "f32"),
            NativeType::F64 => write!(f, "f64"),
            NativeType::Decimal { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            NativeType::Binary { length } => write!(f, "binary({})", length),
            NativeType::VarBinary { max_len } => write!(f, "varbinary({})", max_len),
            NativeType::Text {
                max_len,
                wide,
                fixed,
            } => {
                let prefix = if *wide { "w" } else { "" };
                let kind = if *fixed { "char" } else { "varchar" };
                write!(f, "{}{}({})", prefix, kind, max_len)
            }
            NativeType::Date => write!(f, "date"),
            NativeType::Time => write!(f, "time"),
            NativeType::Timestamp { precision } => write!(f, "timestamp({})", precision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        assert_eq!(NativeType::I32.width(), ElementWidth::Fixed(4));
        assert_eq!(NativeType::F64.element_len(), 8);
        assert_eq!(
            NativeType::Timestamp { precision: 3 }.element_len(),
            TIMESTAMP_STRUCT_LEN
        );
        assert!(!NativeType::Date.is_variable());
    }

    #[test]
    fn test_variable_widths_include_terminator() {
        let narrow = NativeType::Text {
            max_len: 10,
            wide: false,
            fixed: false,
        };
        assert_eq!(narrow.capacity(), 10);
        assert_eq!(narrow.element_len(), 11);

        let wide = NativeType::Text {
            max_len: 10,
            wide: true,
            fixed: false,
        };
        assert_eq!(wide.capacity(), 20);
        assert_eq!(wide.element_len(), 22);

        let decimal = NativeType::Decimal {
            precision: 10,
            scale: 2,
        };
        assert_eq!(decimal.c_type(), CDataType::Char);
        assert_eq!(decimal.element_len(), 14);

        assert_eq!(NativeType::VarBinary { max_len: 0 }.element_len(), 1);
    }

    #[test]
    fn test_bind_metadata() {
        let ts = NativeType::Timestamp { precision: 3 };
        assert_eq!(ts.sql_type(), SqlDataType::TYPE_TIMESTAMP);
        assert_eq!(ts.column_size(), 23);
        assert_eq!(ts.decimal_digits(), 3);
        assert_eq!(
            NativeType::Text {
                max_len: 4,
                wide: true,
                fixed: true
            }
            .sql_type(),
            SqlDataType::WCHAR
        );
    }

    #[test]
    fn test_can_hold() {
        let small = NativeType::Text {
            max_len: 5,
            wide: false,
            fixed: false,
        };
        let large = NativeType::Text {
            max_len: 50,
            wide: false,
            fixed: false,
        };
        assert!(large.can_hold(&small));
        assert!(!small.can_hold(&large));
        assert!(!large.can_hold(&NativeType::VarBinary { max_len: 1 }));
        assert!(!NativeType::Decimal {
            precision: 10,
            scale: 2
        }
        .can_hold(&NativeType::Decimal {
            precision: 5,
            scale: 1
        }));
    }

    #[test]
    fn test_display() {
        assert_eq!(NativeType::I64.to_string(), "i64");
        assert_eq!(
            NativeType::Decimal {
                precision: 10,
                scale: 2
            }
            .to_string(),
            "decimal(10,2)"
        );
        assert_eq!(
            NativeType::Text {
                max_len: 20,
                wide: true,
                fixed: false
            }
            .to_string(),
            "wvarchar(20)"
        );
    }
}
