//! Row access over a column batch.

use std::fmt;
use std::sync::Arc;

use super::column::{ColumnDescriptor, ColumnInfo};
use super::data::ColumnData;
use super::value::Value;

/// One row of a result: a position in the columns of the batch it came
/// from.
///
/// Rows share the batch's column storage, so handing one out copies no
/// cells; values are decoded as they are read. Text and binary cells can
/// be borrowed with [`Row::text`] and [`Row::bytes`].
#[derive(Clone)]
pub struct Row {
    columns: Arc<Vec<ColumnData>>,
    info: Arc<ColumnInfo>,
    index: usize,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<ColumnData>>, info: Arc<ColumnInfo>, index: usize) -> Self {
        Self {
            columns,
            info,
            index,
        }
    }

    /// Position of this row within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value of column `column` (0-based), `Value::Null` for NULL.
    pub fn get(&self, column: usize) -> Option<Value> {
        self.columns.get(column)?.get(self.index)
    }

    /// Value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        self.get(self.info.find_by_name(name)?)
    }

    pub fn is_null(&self, column: usize) -> bool {
        self.columns
            .get(column)
            .map_or(true, |c| c.is_null(self.index))
    }

    /// Borrow a text cell. `None` for NULL or a non-text column.
    pub fn text(&self, column: usize) -> Option<&str> {
        self.columns.get(column)?.text(self.index)
    }

    /// Borrow a binary cell. `None` for NULL or a non-binary column.
    pub fn bytes(&self, column: usize) -> Option<&[u8]> {
        self.columns.get(column)?.bytes(self.index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column descriptors of the result this row belongs to.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.info.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.info.column_names()
    }

    /// Decode every cell in column order.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.columns
            .iter()
            .map(move |c| c.get(self.index).unwrap_or(Value::Null))
    }

    /// Decode the row into owned values.
    pub fn into_values(self) -> Vec<Value> {
        self.values().collect()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.info
                    .columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .zip(self.values()),
            )
            .finish()
    }
}

/// Rows are equal when they hold the same values under the same column
/// names, wherever they are stored.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.column_names() == other.column_names() && self.values().eq(other.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::column::ColumnDescription;
    use crate::types::data::ColumnBatch;
    use crate::types::native::NativeType;
    use crate::types::registry::Resolution;
    use crate::types::sql_type::SqlDataType;

    fn batch() -> ColumnBatch {
        let columns = [
            (
                "NAME",
                SqlDataType::VARCHAR,
                NativeType::Text {
                    max_len: 100,
                    wide: false,
                    fixed: false,
                },
            ),
            ("PAYLOAD", SqlDataType::VARBINARY, NativeType::VarBinary { max_len: 8 }),
            ("AMOUNT", SqlDataType::BIGINT, NativeType::I64),
        ]
        .iter()
        .enumerate()
        .map(|(i, (name, sql_type, native))| {
            ColumnDescriptor::new(
                i as u16 + 1,
                &ColumnDescription::new(*name, *sql_type, native.column_size()),
                Resolution {
                    native: *native,
                    fallback: false,
                },
            )
        })
        .collect();
        ColumnBatch::from_rows(
            Arc::new(ColumnInfo::new(columns)),
            &[
                vec![
                    Value::Text("test".into()),
                    Value::Binary(vec![1, 2]),
                    Value::I64(42),
                ],
                vec![Value::Null, Value::Binary(Vec::new()), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_row_access() {
        let row = batch().row(0).unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(0), Some(Value::Text("test".to_string())));
        assert_eq!(row.get_by_name("amount"), Some(Value::I64(42)));
        assert_eq!(row.get_by_name("AMOUNT"), row.get_by_name("amount"));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get(3), None);
    }

    #[test]
    fn test_borrowed_cells() {
        let batch = batch();
        let first = batch.row(0).unwrap();
        assert_eq!(first.text(0), Some("test"));
        assert_eq!(first.bytes(1), Some(&[1u8, 2][..]));
        assert_eq!(first.text(2), None);

        let second = batch.row(1).unwrap();
        assert!(second.is_null(0));
        assert_eq!(second.text(0), None);
        // empty binary is a value, not NULL
        assert!(!second.is_null(1));
        assert_eq!(second.bytes(1), Some(&[][..]));
    }

    #[test]
    fn test_rows_share_batch_storage() {
        let batch = batch();
        let row = batch.row(1).unwrap();
        assert!(Arc::ptr_eq(&row.columns, &batch.row(0).unwrap().columns));
        assert_eq!(row.index(), 1);
        assert_eq!(
            row.clone().into_values(),
            vec![Value::Null, Value::Binary(Vec::new()), Value::Null]
        );
        assert_eq!(row.column_names(), vec!["NAME", "PAYLOAD", "AMOUNT"]);
        assert_eq!(row.columns()[2].ordinal, 3);
    }

    #[test]
    fn test_equality_ignores_storage() {
        let a = batch();
        let b = batch();
        assert_eq!(a.row(0).unwrap(), b.row(0).unwrap());
        assert_ne!(a.row(0).unwrap(), a.row(1).unwrap());
        assert!(format!("{:?}", a.row(0).unwrap()).contains("\"AMOUNT\": I64(42)"));
    }
}
