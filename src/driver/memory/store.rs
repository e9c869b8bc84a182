//! Tables and typed cells of the in-memory driver.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::error::Diagnostic;
use crate::types::value::parse_decimal;
use crate::types::{ColumnDescription, Nullability, ParamDescription, SqlDataType};

/// Column size reported for unbounded text and binary types.
pub(crate) const LONG_COLUMN_SIZE: usize = 1 << 30;

/// Vendor type code used for GEOMETRY columns.
pub(crate) const SQL_GEOMETRY: SqlDataType = SqlDataType(-151);

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Bytes),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Cell {
    /// Text rendering used for character conversions.
    pub(crate) fn to_text(&self) -> Option<String> {
        let text = match self {
            Cell::Null => return None,
            Cell::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Decimal(d) => d.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Bytes(b) => b.iter().map(|x| format!("{:02X}", x)).collect(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Time(t) => t.format("%H:%M:%S").to_string(),
            Cell::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        };
        Some(text)
    }
}

/// Declared column of a table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnDef {
    pub name: String,
    pub sql_type: SqlDataType,
    pub size: usize,
    pub digits: i16,
    pub nullable: bool,
}

impl ColumnDef {
    pub(crate) fn describe(&self) -> ColumnDescription {
        ColumnDescription {
            name: self.name.clone(),
            data_type: self.sql_type,
            column_size: self.size,
            decimal_digits: self.digits,
            nullability: if self.nullable {
                Nullability::Nullable
            } else {
                Nullability::NoNulls
            },
        }
    }

    pub(crate) fn describe_param(&self) -> ParamDescription {
        let desc = self.describe();
        ParamDescription {
            data_type: desc.data_type,
            parameter_size: desc.column_size,
            decimal_digits: desc.decimal_digits,
            nullability: desc.nullability,
        }
    }

    /// Convert `cell` into the representation stored for this column.
    pub(crate) fn coerce(&self, cell: Cell) -> Result<Cell, Diagnostic> {
        if cell == Cell::Null {
            if !self.nullable {
                return Err(Diagnostic::new(
                    "23000",
                    515,
                    format!("Cannot insert NULL into column '{}'", self.name),
                ));
            }
            return Ok(Cell::Null);
        }
        let mismatch = |cell: &Cell| {
            Diagnostic::new(
                "22018",
                245,
                format!(
                    "Invalid character value for cast: {:?} into column '{}' of type {}",
                    cell, self.name, self.sql_type
                ),
            )
        };
        let out_of_range = || {
            Diagnostic::new(
                "22003",
                220,
                format!("Numeric value out of range for column '{}'", self.name),
            )
        };
        let too_long = || {
            Diagnostic::new(
                "22001",
                8152,
                format!("String or binary data would be truncated in column '{}'", self.name),
            )
        };

        match self.sql_type {
            SqlDataType::BIT => match cell {
                Cell::Bool(b) => Ok(Cell::Bool(b)),
                Cell::Int(0) => Ok(Cell::Bool(false)),
                Cell::Int(1) => Ok(Cell::Bool(true)),
                Cell::Text(ref s) => match s.trim() {
                    "1" | "true" | "TRUE" => Ok(Cell::Bool(true)),
                    "0" | "false" | "FALSE" => Ok(Cell::Bool(false)),
                    _ => Err(mismatch(&cell)),
                },
                other => Err(mismatch(&other)),
            },
            SqlDataType::TINYINT
            | SqlDataType::SMALLINT
            | SqlDataType::INTEGER
            | SqlDataType::BIGINT => {
                let n = match cell {
                    Cell::Int(n) => n,
                    Cell::Bool(b) => b as i64,
                    Cell::Decimal(d) if d.fract().is_zero() => {
                        i64::try_from(d).map_err(|_| out_of_range())?
                    }
                    Cell::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => f as i64,
                    Cell::Text(ref s) => s.trim().parse().map_err(|_| mismatch(&cell))?,
                    other => return Err(mismatch(&other)),
                };
                let (min, max) = match self.sql_type {
                    SqlDataType::TINYINT => (i8::MIN as i64, i8::MAX as i64),
                    SqlDataType::SMALLINT => (i16::MIN as i64, i16::MAX as i64),
                    SqlDataType::INTEGER => (i32::MIN as i64, i32::MAX as i64),
                    _ => (i64::MIN, i64::MAX),
                };
                if n < min || n > max {
                    return Err(out_of_range());
                }
                Ok(Cell::Int(n))
            }
            SqlDataType::REAL | SqlDataType::FLOAT | SqlDataType::DOUBLE => {
                let f = match cell {
                    Cell::Float(f) => f,
                    Cell::Int(n) => n as f64,
                    Cell::Decimal(d) => f64::try_from(d).map_err(|_| out_of_range())?,
                    Cell::Text(ref s) => s.trim().parse().map_err(|_| mismatch(&cell))?,
                    other => return Err(mismatch(&other)),
                };
                if self.sql_type == SqlDataType::REAL {
                    // stored at single precision
                    return Ok(Cell::Float(f as f32 as f64));
                }
                Ok(Cell::Float(f))
            }
            SqlDataType::DECIMAL | SqlDataType::NUMERIC => {
                let d = match cell {
                    Cell::Decimal(d) => d,
                    Cell::Int(n) => Decimal::from(n),
                    Cell::Float(f) => Decimal::try_from(f).map_err(|_| out_of_range())?,
                    Cell::Text(ref s) => parse_decimal(s).map_err(|_| mismatch(&cell))?,
                    other => return Err(mismatch(&other)),
                };
                let scale = self.digits.max(0) as u32;
                let mut d = d.round_dp(scale);
                let integer_part = d.abs().trunc();
                let integer_digits = if integer_part.is_zero() {
                    0
                } else {
                    integer_part.normalize().to_string().len()
                };
                if integer_digits + scale as usize > self.size {
                    return Err(out_of_range());
                }
                d.rescale(scale);
                Ok(Cell::Decimal(d))
            }
            SqlDataType::CHAR
            | SqlDataType::VARCHAR
            | SqlDataType::LONGVARCHAR
            | SqlDataType::WCHAR
            | SqlDataType::WVARCHAR
            | SqlDataType::WLONGVARCHAR
            | SqlDataType::GUID
            | SQL_GEOMETRY => {
                let text = match cell {
                    Cell::Text(s) => s,
                    Cell::Bytes(_) => return Err(mismatch(&cell)),
                    other => other.to_text().ok_or_else(|| mismatch(&other))?,
                };
                if text.chars().count() > self.size {
                    return Err(too_long());
                }
                Ok(Cell::Text(text))
            }
            SqlDataType::BINARY | SqlDataType::VARBINARY | SqlDataType::LONGVARBINARY => {
                let bytes = match cell {
                    Cell::Bytes(b) => b,
                    Cell::Text(s) => Bytes::from(s.into_bytes()),
                    other => return Err(mismatch(&other)),
                };
                if bytes.len() > self.size {
                    return Err(too_long());
                }
                Ok(Cell::Bytes(bytes))
            }
            SqlDataType::TYPE_DATE => match cell {
                Cell::Date(d) => Ok(Cell::Date(d)),
                Cell::Timestamp(ts) => Ok(Cell::Date(ts.date())),
                Cell::Text(ref s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(Cell::Date)
                    .map_err(|_| mismatch(&cell)),
                other => Err(mismatch(&other)),
            },
            SqlDataType::TYPE_TIME => match cell {
                Cell::Time(t) => Ok(Cell::Time(t)),
                Cell::Text(ref s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
                    .map(Cell::Time)
                    .map_err(|_| mismatch(&cell)),
                other => Err(mismatch(&other)),
            },
            SqlDataType::TYPE_TIMESTAMP => match cell {
                Cell::Timestamp(ts) => Ok(Cell::Timestamp(ts)),
                Cell::Date(d) => d
                    .and_hms_opt(0, 0, 0)
                    .map(Cell::Timestamp)
                    .ok_or_else(|| mismatch(&Cell::Date(d))),
                Cell::Text(ref s) => {
                    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                        .map(Cell::Timestamp)
                        .map_err(|_| mismatch(&cell))
                }
                other => Err(mismatch(&other)),
            },
            _ => Err(mismatch(&cell)),
        }
    }
}

/// Parse a declared type name and its arguments into a column definition.
pub(crate) fn column_def(
    name: String,
    type_name: &str,
    args: &[Option<usize>],
    nullable: bool,
) -> Result<ColumnDef, Diagnostic> {
    // `None` stands for MAX
    let arg = |i: usize, default: usize| match args.get(i) {
        Some(Some(n)) => *n,
        Some(None) => LONG_COLUMN_SIZE,
        None => default,
    };
    let (sql_type, size, digits) = match type_name.to_ascii_uppercase().as_str() {
        "BIT" | "BOOLEAN" | "BOOL" => (SqlDataType::BIT, 1, 0),
        "TINYINT" => (SqlDataType::TINYINT, 3, 0),
        "SMALLINT" => (SqlDataType::SMALLINT, 5, 0),
        "INT" | "INTEGER" => (SqlDataType::INTEGER, 10, 0),
        "BIGINT" => (SqlDataType::BIGINT, 19, 0),
        "REAL" => (SqlDataType::REAL, 7, 0),
        "FLOAT" | "DOUBLE" => (SqlDataType::DOUBLE, 15, 0),
        "DECIMAL" | "NUMERIC" => {
            let precision = arg(0, 18);
            let scale = arg(1, 0);
            if precision == 0 || precision > 38 || scale > precision {
                return Err(Diagnostic::new(
                    "42000",
                    2750,
                    format!("Invalid precision or scale for column '{}'", name),
                ));
            }
            (SqlDataType::DECIMAL, precision, scale as i16)
        }
        "CHAR" => (SqlDataType::CHAR, arg(0, 1), 0),
        "VARCHAR" => sized_or_long(SqlDataType::VARCHAR, SqlDataType::LONGVARCHAR, arg(0, 255)),
        "TEXT" | "CLOB" => (SqlDataType::LONGVARCHAR, LONG_COLUMN_SIZE, 0),
        "NCHAR" => (SqlDataType::WCHAR, arg(0, 1), 0),
        "NVARCHAR" => sized_or_long(SqlDataType::WVARCHAR, SqlDataType::WLONGVARCHAR, arg(0, 255)),
        "NTEXT" | "NCLOB" => (SqlDataType::WLONGVARCHAR, LONG_COLUMN_SIZE, 0),
        "BINARY" => (SqlDataType::BINARY, arg(0, 1), 0),
        "VARBINARY" => sized_or_long(SqlDataType::VARBINARY, SqlDataType::LONGVARBINARY, arg(0, 255)),
        "BLOB" | "IMAGE" => (SqlDataType::LONGVARBINARY, LONG_COLUMN_SIZE, 0),
        "DATE" => (SqlDataType::TYPE_DATE, 10, 0),
        "TIME" => (SqlDataType::TYPE_TIME, 8, 0),
        "TIMESTAMP" | "DATETIME" | "DATETIME2" => {
            let precision = arg(0, 9).min(9);
            let size = if precision > 0 { 20 + precision } else { 19 };
            (SqlDataType::TYPE_TIMESTAMP, size, precision as i16)
        }
        "UUID" | "UNIQUEIDENTIFIER" => (SqlDataType::GUID, 36, 0),
        "GEOMETRY" => (SQL_GEOMETRY, LONG_COLUMN_SIZE, 0),
        other => {
            return Err(Diagnostic::new(
                "42000",
                2715,
                format!("Column '{}' has unknown type '{}'", name, other),
            ))
        }
    };
    Ok(ColumnDef {
        name,
        sql_type,
        size,
        digits,
        nullable,
    })
}

fn sized_or_long(sized: SqlDataType, long: SqlDataType, size: usize) -> (SqlDataType, usize, i16) {
    if size >= LONG_COLUMN_SIZE {
        (long, LONG_COLUMN_SIZE, 0)
    } else {
        (sized, size, 0)
    }
}

/// A table: column definitions and rows in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub(crate) fn column_index(&self, name: &str) -> Result<usize, Diagnostic> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Diagnostic::new("42S22", 207, format!("Invalid column name '{}'", name)))
    }
}

/// A materialized result set waiting to be fetched.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResultSet {
    pub columns: Vec<ColumnDescription>,
    pub rows: Vec<Vec<Cell>>,
}

/// Tables of one database, keyed by upper-cased name.
#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: HashMap<String, Table>,
}

impl Store {
    pub(crate) fn create_table(&mut self, name: &str, columns: Vec<ColumnDef>) -> Result<(), Diagnostic> {
        let key = name.to_ascii_uppercase();
        if self.tables.contains_key(&key) {
            return Err(Diagnostic::new(
                "42S01",
                2714,
                format!("There is already an object named '{}'", name),
            ));
        }
        self.tables.insert(
            key,
            Table {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<(), Diagnostic> {
        if self.tables.remove(&name.to_ascii_uppercase()).is_none() && !if_exists {
            return Err(missing_table(name));
        }
        Ok(())
    }

    pub(crate) fn table(&self, name: &str) -> Result<&Table, Diagnostic> {
        self.tables
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| missing_table(name))
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut Table, Diagnostic> {
        self.tables
            .get_mut(&name.to_ascii_uppercase())
            .ok_or_else(|| missing_table(name))
    }
}

fn missing_table(name: &str) -> Diagnostic {
    Diagnostic::new("42S02", 208, format!("Invalid object name '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(type_name: &str, args: &[Option<usize>]) -> ColumnDef {
        column_def("C".to_string(), type_name, args, true).unwrap()
    }

    #[test]
    fn test_declared_types() {
        let d = def("decimal", &[Some(5), Some(1)]);
        assert_eq!((d.sql_type, d.size, d.digits), (SqlDataType::DECIMAL, 5, 1));
        let v = def("VARCHAR", &[None]);
        assert_eq!(v.sql_type, SqlDataType::LONGVARCHAR);
        assert_eq!(def("nvarchar", &[Some(10)]).sql_type, SqlDataType::WVARCHAR);
        assert_eq!(def("TIMESTAMP", &[Some(3)]).size, 23);
        assert_eq!(def("GEOMETRY", &[]).sql_type, SQL_GEOMETRY);
        assert!(column_def("C".into(), "WIDGET", &[], true).is_err());
    }

    #[test]
    fn test_coerce_decimal_rescales() {
        let d = def("DECIMAL", &[Some(5), Some(1)]);
        let cell = d.coerce(Cell::Int(1)).unwrap();
        assert_eq!(cell.to_text().unwrap(), "1.0");
        let err = d.coerce(Cell::Int(123_456)).unwrap_err();
        assert_eq!(err.state, "22003");
    }

    #[test]
    fn test_coerce_checks_lengths_and_ranges() {
        let v = def("VARCHAR", &[Some(3)]);
        assert_eq!(v.coerce(Cell::Text("abcd".into())).unwrap_err().state, "22001");
        let t = def("TINYINT", &[]);
        assert_eq!(t.coerce(Cell::Int(300)).unwrap_err().state, "22003");
        let mut n = def("INT", &[]);
        n.nullable = false;
        assert_eq!(n.coerce(Cell::Null).unwrap_err().state, "23000");
        assert_eq!(n.coerce(Cell::Text("42".into())).unwrap(), Cell::Int(42));
    }

    #[test]
    fn test_store_tables() {
        let mut store = Store::default();
        store.create_table("t", vec![def("INT", &[])]).unwrap();
        assert_eq!(store.create_table("T", vec![]).unwrap_err().state, "42S01");
        assert!(store.table("T").is_ok());
        store.drop_table("t", false).unwrap();
        assert_eq!(store.drop_table("t", false).unwrap_err().state, "42S02");
        assert!(store.drop_table("t", true).is_ok());
    }
}
