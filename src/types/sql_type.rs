//! SQL and C data type codes of the call-level interface.
//!
//! These constants follow the ODBC 3.x numbering, which is also what most
//! vendor drivers report from `describe_col`.

use std::fmt;

/// Indicator value marking a NULL slot.
pub const NULL_DATA: isize = -1;
/// Indicator value used when the driver cannot report the full length.
pub const NO_TOTAL: isize = -4;

/// SQL data type code as reported by the driver.
///
/// Kept as an open newtype rather than an enum so vendor extensions survive
/// the trip through the type registry. Defaults to `UNKNOWN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SqlDataType(pub i16);

impl SqlDataType {
    pub const UNKNOWN: Self = Self(0);
    pub const CHAR: Self = Self(1);
    pub const NUMERIC: Self = Self(2);
    pub const DECIMAL: Self = Self(3);
    pub const INTEGER: Self = Self(4);
    pub const SMALLINT: Self = Self(5);
    pub const FLOAT: Self = Self(6);
    pub const REAL: Self = Self(7);
    pub const DOUBLE: Self = Self(8);
    /// ODBC 2.x DATE, also the verbose DATETIME code.
    pub const DATE: Self = Self(9);
    pub const TIME: Self = Self(10);
    pub const TIMESTAMP: Self = Self(11);
    pub const VARCHAR: Self = Self(12);
    pub const TYPE_DATE: Self = Self(91);
    pub const TYPE_TIME: Self = Self(92);
    pub const TYPE_TIMESTAMP: Self = Self(93);
    pub const LONGVARCHAR: Self = Self(-1);
    pub const BINARY: Self = Self(-2);
    pub const VARBINARY: Self = Self(-3);
    pub const LONGVARBINARY: Self = Self(-4);
    pub const BIGINT: Self = Self(-5);
    pub const TINYINT: Self = Self(-6);
    pub const BIT: Self = Self(-7);
    pub const WCHAR: Self = Self(-8);
    pub const WVARCHAR: Self = Self(-9);
    pub const WLONGVARCHAR: Self = Self(-10);
    pub const GUID: Self = Self(-11);

    /// Raw type code.
    pub fn code(&self) -> i16 {
        self.0
    }

    /// Standard name of the type, `None` for vendor codes.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::UNKNOWN => "UNKNOWN",
            Self::CHAR => "CHAR",
            Self::NUMERIC => "NUMERIC",
            Self::DECIMAL => "DECIMAL",
            Self::INTEGER => "INTEGER",
            Self::SMALLINT => "SMALLINT",
            Self::FLOAT => "FLOAT",
            Self::REAL => "REAL",
            Self::DOUBLE => "DOUBLE",
            Self::DATE => "DATE",
            Self::TIME => "TIME",
            Self::TIMESTAMP => "TIMESTAMP",
            Self::VARCHAR => "VARCHAR",
            Self::TYPE_DATE => "TYPE_DATE",
            Self::TYPE_TIME => "TYPE_TIME",
            Self::TYPE_TIMESTAMP => "TYPE_TIMESTAMP",
            Self::LONGVARCHAR => "LONGVARCHAR",
            Self::BINARY => "BINARY",
            Self::VARBINARY => "VARBINARY",
            Self::LONGVARBINARY => "LONGVARBINARY",
            Self::BIGINT => "BIGINT",
            Self::TINYINT => "TINYINT",
            Self::BIT => "BIT",
            Self::WCHAR => "WCHAR",
            Self::WVARCHAR => "WVARCHAR",
            Self::WLONGVARCHAR => "WLONGVARCHAR",
            Self::GUID => "GUID",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for SqlDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "SQL_TYPE({})", self.0),
        }
    }
}

/// C data type of a bound buffer: the layout the driver writes or reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum CDataType {
    /// Narrow, NUL terminated character data (UTF-8).
    Char = 1,
    /// Wide, NUL terminated character data (UTF-16 code units).
    WChar = -8,
    Binary = -2,
    Bit = -7,
    STinyInt = -26,
    SShort = -15,
    SLong = -16,
    SBigInt = -25,
    Float = 7,
    Double = 8,
    TypeDate = 91,
    TypeTime = 92,
    TypeTimestamp = 93,
}

impl CDataType {
    /// Bytes reserved after the payload for the terminator.
    pub fn terminator_len(&self) -> usize {
        match self {
            CDataType::Char => 1,
            CDataType::WChar => 2,
            _ => 0,
        }
    }

    /// True for types whose indicator carries a byte length.
    pub fn is_variable(&self) -> bool {
        matches!(self, CDataType::Char | CDataType::WChar | CDataType::Binary)
    }
}

/// Whether a column or parameter may hold NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nullability {
    NoNulls,
    Nullable,
    #[default]
    Unknown,
}

impl Nullability {
    /// Convert the raw `SQL_NO_NULLS` / `SQL_NULLABLE` / `SQL_NULLABLE_UNKNOWN` code.
    pub fn from_raw(raw: i16) -> Self {
        match raw {
            0 => Nullability::NoNulls,
            1 => Nullability::Nullable,
            _ => Nullability::Unknown,
        }
    }

    /// True unless the driver guarantees no NULLs.
    pub fn could_be_null(&self) -> bool {
        !matches!(self, Nullability::NoNulls)
    }
}
