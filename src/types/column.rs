//! Column metadata: the raw driver description and the resolved descriptor.

use super::native::NativeType;
use super::registry::Resolution;
use super::sql_type::{Nullability, SqlDataType};

/// Column metadata exactly as the driver reports it from `describe_col`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDescription {
    /// Column name (may be empty for expressions).
    pub name: String,
    /// SQL data type code.
    pub data_type: SqlDataType,
    /// Column size: characters for text, bytes for binary, digits for numerics.
    pub column_size: usize,
    /// Decimal digits (scale, or fractional second digits).
    pub decimal_digits: i16,
    /// Whether NULL values are allowed.
    pub nullability: Nullability,
}

impl ColumnDescription {
    /// Create a description with a name and a type, other fields defaulted.
    pub fn new(name: impl Into<String>, data_type: SqlDataType, column_size: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            column_size,
            decimal_digits: 0,
            nullability: Nullability::Unknown,
        }
    }
}

/// Parameter metadata from `describe_param`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDescription {
    pub data_type: SqlDataType,
    pub parameter_size: usize,
    pub decimal_digits: i16,
    pub nullability: Nullability,
}

/// A result column with its native type resolved.
///
/// Created once while the cursor describes its columns, before the first
/// fetch, and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// 1-based position in the result set.
    pub ordinal: u16,
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub sql_type: SqlDataType,
    /// Declared column size.
    pub column_size: usize,
    /// Declared decimal digits.
    pub decimal_digits: i16,
    /// Whether NULL values are allowed.
    pub nullable: bool,
    /// Native representation the column is fetched as.
    pub native: NativeType,
    /// True if the SQL type was unknown and degraded to text.
    pub fallback: bool,
}

impl ColumnDescriptor {
    /// Build a descriptor from the driver description and its resolution.
    pub fn new(ordinal: u16, desc: &ColumnDescription, resolution: Resolution) -> Self {
        Self {
            ordinal,
            name: desc.name.clone(),
            sql_type: desc.data_type,
            column_size: desc.column_size,
            decimal_digits: desc.decimal_digits,
            nullable: desc.nullability.could_be_null(),
            native: resolution.native,
            fallback: resolution.fallback,
        }
    }
}

/// Shared column information for all batches and rows of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column descriptors in result order.
    pub columns: Vec<ColumnDescriptor>,
}

impl ColumnInfo {
    /// Create new column info from descriptors.
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column by index (0-based).
    pub fn get(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    /// Find column index by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Native types of all columns, in order.
    pub fn native_types(&self) -> Vec<NativeType> {
        self.columns.iter().map(|c| c.native).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_info() -> ColumnInfo {
        let id = ColumnDescription {
            name: "ID".to_string(),
            data_type: SqlDataType::INTEGER,
            column_size: 10,
            decimal_digits: 0,
            nullability: Nullability::NoNulls,
        };
        let name = ColumnDescription::new("NAME", SqlDataType::VARCHAR, 100);
        ColumnInfo::new(vec![
            ColumnDescriptor::new(
                1,
                &id,
                Resolution {
                    native: NativeType::I32,
                    fallback: false,
                },
            ),
            ColumnDescriptor::new(
                2,
                &name,
                Resolution {
                    native: NativeType::Text {
                        max_len: 100,
                        wide: false,
                        fixed: false,
                    },
                    fallback: false,
                },
            ),
        ])
    }

    #[test]
    fn test_descriptor_from_description() {
        let info = make_test_info();
        let id = info.get(0).unwrap();
        assert_eq!(id.ordinal, 1);
        assert!(!id.nullable);
        assert_eq!(id.sql_type, SqlDataType::INTEGER);
        assert_eq!(id.native, NativeType::I32);
        assert!(info.get(1).unwrap().nullable);
    }

    #[test]
    fn test_column_info_lookup() {
        let info = make_test_info();
        assert_eq!(info.len(), 2);
        assert_eq!(info.column_names(), vec!["ID", "NAME"]);
        assert_eq!(info.find_by_name("name"), Some(1));
        assert_eq!(info.find_by_name("UNKNOWN"), None);
    }
}
