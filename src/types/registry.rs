//! Type registry: SQL type descriptors to native representations and back.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::column::ColumnDescription;
use super::native::NativeType;
use super::sql_type::SqlDataType;
use super::temporal::fraction_precision;
use super::value::Value;
use crate::error::{Error, Result};

/// Largest precision a DECIMAL column may declare. Used when the driver
/// reports a column size of zero.
pub const MAX_DECIMAL_PRECISION: usize = 38;

/// Characters in the canonical textual form of a GUID.
const GUID_TEXT_LEN: usize = 36;

/// How DECIMAL and NUMERIC columns are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalMode {
    /// Fetch as text and parse into `rust_decimal::Decimal` without rounding.
    #[default]
    Exact,
    /// Fetch as a double, accepting binary rounding.
    Approximate,
}

impl FromStr for DecimalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(DecimalMode::Exact),
            "approximate" | "approx" | "float" => Ok(DecimalMode::Approximate),
            other => Err(Error::config(format!(
                "Unknown decimal mode '{}', expected 'exact' or 'approximate'",
                other
            ))),
        }
    }
}

impl fmt::Display for DecimalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalMode::Exact => write!(f, "exact"),
            DecimalMode::Approximate => write!(f, "approximate"),
        }
    }
}

/// Outcome of resolving one column description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Native type the column is fetched as.
    pub native: NativeType,
    /// True if the SQL type was not recognised and degraded to text.
    pub fallback: bool,
}

impl Resolution {
    fn mapped(native: NativeType) -> Self {
        Self {
            native,
            fallback: false,
        }
    }
}

/// Maps database type descriptors to native types.
///
/// Pure and deterministic: the same description always resolves to the same
/// native type for a given configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRegistry {
    pub decimal_mode: DecimalMode,
    /// Ceiling for text buffers, in characters.
    pub max_text_size: usize,
    /// Ceiling for binary buffers, in bytes.
    pub max_binary_size: usize,
    /// Refuse unknown column types instead of degrading them to text.
    pub strict: bool,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            decimal_mode: DecimalMode::Exact,
            max_text_size: 4096,
            max_binary_size: 8192,
            strict: false,
        }
    }
}

impl TypeRegistry {
    /// Create a registry with the given decimal mode and size ceilings.
    pub fn new(decimal_mode: DecimalMode, max_text_size: usize, max_binary_size: usize) -> Self {
        Self {
            decimal_mode,
            max_text_size,
            max_binary_size,
            strict: false,
        }
    }

    /// Refuse unknown column types.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn text_len(&self, column_size: usize) -> usize {
        if column_size == 0 {
            self.max_text_size
        } else {
            column_size.min(self.max_text_size)
        }
    }

    fn binary_len(&self, column_size: usize) -> usize {
        if column_size == 0 {
            self.max_binary_size
        } else {
            column_size.min(self.max_binary_size)
        }
    }

    /// Resolve the native type of a column.
    ///
    /// Total: codes without a mapping degrade to narrow text sized by the
    /// text ceiling and are flagged as a fallback.
    pub fn resolve(&self, desc: &ColumnDescription) -> Resolution {
        let size = desc.column_size;
        let native = match desc.data_type {
            SqlDataType::BIT => NativeType::Bit,
            SqlDataType::TINYINT => NativeType::I8,
            SqlDataType::SMALLINT => NativeType::I16,
            SqlDataType::INTEGER => NativeType::I32,
            SqlDataType::BIGINT => NativeType::I64,
            SqlDataType::REAL => NativeType::F32,
            SqlDataType::FLOAT | SqlDataType::DOUBLE => NativeType::F64,
            SqlDataType::DECIMAL | SqlDataType::NUMERIC => match self.decimal_mode {
                DecimalMode::Approximate => NativeType::F64,
                DecimalMode::Exact => NativeType::Decimal {
                    precision: if size == 0 {
                        MAX_DECIMAL_PRECISION
                    } else {
                        size.min(MAX_DECIMAL_PRECISION)
                    },
                    scale: desc.decimal_digits.max(0),
                },
            },
            SqlDataType::CHAR => NativeType::Text {
                max_len: self.text_len(size),
                wide: false,
                fixed: true,
            },
            SqlDataType::VARCHAR | SqlDataType::LONGVARCHAR => NativeType::Text {
                max_len: self.text_len(size),
                wide: false,
                fixed: false,
            },
            SqlDataType::WCHAR => NativeType::Text {
                max_len: self.text_len(size),
                wide: true,
                fixed: true,
            },
            SqlDataType::WVARCHAR | SqlDataType::WLONGVARCHAR => NativeType::Text {
                max_len: self.text_len(size),
                wide: true,
                fixed: false,
            },
            SqlDataType::BINARY if size > 0 && size <= self.max_binary_size => {
                NativeType::Binary { length: size }
            }
            SqlDataType::BINARY | SqlDataType::VARBINARY | SqlDataType::LONGVARBINARY => {
                NativeType::VarBinary {
                    max_len: self.binary_len(size),
                }
            }
            SqlDataType::DATE | SqlDataType::TYPE_DATE => NativeType::Date,
            SqlDataType::TIME | SqlDataType::TYPE_TIME => NativeType::Time,
            SqlDataType::TIMESTAMP | SqlDataType::TYPE_TIMESTAMP => NativeType::Timestamp {
                precision: desc.decimal_digits.clamp(0, 9),
            },
            SqlDataType::GUID => NativeType::Text {
                max_len: GUID_TEXT_LEN,
                wide: false,
                fixed: true,
            },
            _ => {
                return Resolution {
                    native: NativeType::Text {
                        max_len: self.max_text_size,
                        wide: false,
                        fixed: false,
                    },
                    fallback: true,
                }
            }
        };
        Resolution::mapped(native)
    }

    /// Resolve a column, refusing fallbacks when the registry is strict.
    pub fn resolve_checked(&self, desc: &ColumnDescription) -> Result<Resolution> {
        let resolution = self.resolve(desc);
        if resolution.fallback && self.strict {
            return Err(Error::UnsupportedColumnType {
                column: desc.name.clone(),
                sql_type: desc.data_type.code(),
            });
        }
        Ok(resolution)
    }

    /// Infer the native type a host value is bound as.
    ///
    /// Returns `None` for `Value::Null`, which carries no type of its own.
    pub fn infer_parameter(&self, value: &Value) -> Option<NativeType> {
        let native = match value {
            Value::Null => return None,
            Value::Bool(_) => NativeType::Bit,
            Value::I8(_) => NativeType::I8,
            Value::I16(_) => NativeType::I16,
            Value::I32(_) => NativeType::I32,
            Value::I64(_) => NativeType::I64,
            Value::F32(_) => NativeType::F32,
            Value::F64(_) => NativeType::F64,
            Value::Decimal(d) => decimal_shape(d),
            Value::Text(s) => NativeType::Text {
                max_len: s.len(),
                wide: false,
                fixed: false,
            },
            Value::Binary(b) => NativeType::VarBinary { max_len: b.len() },
            Value::Date(_) => NativeType::Date,
            Value::Time(_) => NativeType::Time,
            Value::Timestamp(ts) => NativeType::Timestamp {
                precision: fraction_precision(chrono::Timelike::nanosecond(ts)),
            },
        };
        Some(native)
    }
}

/// Precision and scale needed to bind a decimal exactly.
fn decimal_shape(d: &Decimal) -> NativeType {
    let scale = d.scale() as usize;
    let digits = d.mantissa().unsigned_abs().to_string().len();
    // 0.05 has a mantissa of 5 but needs precision 2
    let precision = digits.max(scale).max(1);
    NativeType::Decimal {
        precision,
        scale: scale as i16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ColumnBuffer;
    use chrono::NaiveDate;

    fn desc(data_type: SqlDataType, size: usize, digits: i16) -> ColumnDescription {
        ColumnDescription {
            decimal_digits: digits,
            ..ColumnDescription::new("C", data_type, size)
        }
    }

    #[test]
    fn test_integer_mappings() {
        let reg = TypeRegistry::default();
        assert_eq!(reg.resolve(&desc(SqlDataType::BIT, 1, 0)).native, NativeType::Bit);
        assert_eq!(reg.resolve(&desc(SqlDataType::TINYINT, 3, 0)).native, NativeType::I8);
        assert_eq!(reg.resolve(&desc(SqlDataType::SMALLINT, 5, 0)).native, NativeType::I16);
        assert_eq!(reg.resolve(&desc(SqlDataType::INTEGER, 10, 0)).native, NativeType::I32);
        assert_eq!(reg.resolve(&desc(SqlDataType::BIGINT, 19, 0)).native, NativeType::I64);
        assert_eq!(reg.resolve(&desc(SqlDataType::REAL, 7, 0)).native, NativeType::F32);
        assert_eq!(reg.resolve(&desc(SqlDataType::FLOAT, 15, 0)).native, NativeType::F64);
    }

    #[test]
    fn test_decimal_modes() {
        let exact = TypeRegistry::default();
        assert_eq!(
            exact.resolve(&desc(SqlDataType::DECIMAL, 10, 2)).native,
            NativeType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(
            exact.resolve(&desc(SqlDataType::NUMERIC, 0, 0)).native,
            NativeType::Decimal {
                precision: MAX_DECIMAL_PRECISION,
                scale: 0
            }
        );
        // a runaway reported precision still gets a bounded buffer
        let huge = exact.resolve(&desc(SqlDataType::DECIMAL, usize::MAX / 2, 4)).native;
        assert_eq!(
            huge,
            NativeType::Decimal {
                precision: MAX_DECIMAL_PRECISION,
                scale: 4
            }
        );
        assert!(ColumnBuffer::allocate(huge, 1024).is_ok());

        let approx = TypeRegistry::new(DecimalMode::Approximate, 100, 100);
        assert_eq!(
            approx.resolve(&desc(SqlDataType::DECIMAL, 10, 2)).native,
            NativeType::F64
        );
    }

    #[test]
    fn test_text_capped_by_ceiling() {
        let reg = TypeRegistry::new(DecimalMode::Exact, 64, 32);
        assert_eq!(
            reg.resolve(&desc(SqlDataType::VARCHAR, 1_000_000, 0)).native,
            NativeType::Text {
                max_len: 64,
                wide: false,
                fixed: false
            }
        );
        assert_eq!(
            reg.resolve(&desc(SqlDataType::WVARCHAR, 0, 0)).native,
            NativeType::Text {
                max_len: 64,
                wide: true,
                fixed: false
            }
        );
        assert_eq!(
            reg.resolve(&desc(SqlDataType::LONGVARBINARY, 0, 0)).native,
            NativeType::VarBinary { max_len: 32 }
        );
    }

    #[test]
    fn test_binary_fixed_only_when_bounded() {
        let reg = TypeRegistry::new(DecimalMode::Exact, 64, 32);
        assert_eq!(
            reg.resolve(&desc(SqlDataType::BINARY, 16, 0)).native,
            NativeType::Binary { length: 16 }
        );
        assert_eq!(
            reg.resolve(&desc(SqlDataType::BINARY, 100, 0)).native,
            NativeType::VarBinary { max_len: 32 }
        );
    }

    #[test]
    fn test_temporal_and_guid() {
        let reg = TypeRegistry::default();
        assert_eq!(reg.resolve(&desc(SqlDataType::DATE, 10, 0)).native, NativeType::Date);
        assert_eq!(reg.resolve(&desc(SqlDataType::TYPE_TIME, 8, 0)).native, NativeType::Time);
        assert_eq!(
            reg.resolve(&desc(SqlDataType::TYPE_TIMESTAMP, 23, 3)).native,
            NativeType::Timestamp { precision: 3 }
        );
        assert_eq!(
            reg.resolve(&desc(SqlDataType::GUID, 16, 0)).native,
            NativeType::Text {
                max_len: 36,
                wide: false,
                fixed: true
            }
        );
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let reg = TypeRegistry::default();
        let geometry = desc(SqlDataType(-151), 0, 0);
        let res = reg.resolve(&geometry);
        assert!(res.fallback);
        assert_eq!(
            res.native,
            NativeType::Text {
                max_len: 4096,
                wide: false,
                fixed: false
            }
        );
        assert!(reg.resolve_checked(&geometry).is_ok());

        let strict = reg.with_strict(true);
        let err = strict.resolve_checked(&geometry).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedColumnType { sql_type: -151, .. }
        ));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let reg = TypeRegistry::default();
        let d = desc(SqlDataType::DECIMAL, 12, 4);
        assert_eq!(reg.resolve(&d), reg.resolve(&d));
    }

    #[test]
    fn test_infer_parameter() {
        let reg = TypeRegistry::default();
        assert_eq!(reg.infer_parameter(&Value::Null), None);
        assert_eq!(reg.infer_parameter(&Value::I64(1)), Some(NativeType::I64));
        assert_eq!(
            reg.infer_parameter(&Value::Text("hey".into())),
            Some(NativeType::Text {
                max_len: 3,
                wide: false,
                fixed: false
            })
        );
        assert_eq!(
            reg.infer_parameter(&Value::Decimal(Decimal::from_str("1.0").unwrap())),
            Some(NativeType::Decimal {
                precision: 2,
                scale: 1
            })
        );
        assert_eq!(
            reg.infer_parameter(&Value::Decimal(Decimal::from_str("-0.05").unwrap())),
            Some(NativeType::Decimal {
                precision: 2,
                scale: 2
            })
        );
        let ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_milli_opt(0, 0, 0, 250)
            .unwrap();
        assert_eq!(
            reg.infer_parameter(&Value::Timestamp(ts)),
            Some(NativeType::Timestamp { precision: 3 })
        );
    }

    #[test]
    fn test_decimal_mode_from_str() {
        assert_eq!("EXACT".parse::<DecimalMode>().unwrap(), DecimalMode::Exact);
        assert_eq!(
            "approximate".parse::<DecimalMode>().unwrap(),
            DecimalMode::Approximate
        );
        assert!("round".parse::<DecimalMode>().is_err());
    }
}
