//! Column, value and type mapping types.

pub mod column;
pub mod data;
pub mod native;
pub mod registry;
pub mod row;
pub mod sql_type;
pub mod temporal;
pub mod value;

pub use column::{ColumnDescription, ColumnDescriptor, ColumnInfo, ParamDescription};
pub use data::{ColumnBatch, ColumnData, TypedColumn};
pub use native::{ElementWidth, NativeType};
pub use registry::{DecimalMode, Resolution, TypeRegistry};
pub use row::Row;
pub use sql_type::{CDataType, Nullability, SqlDataType, NO_TOTAL, NULL_DATA};
pub use value::{ToParameter, Value};
