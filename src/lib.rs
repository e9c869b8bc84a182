//! Columnar client for ODBC-style call-level interfaces
//!
//! Executes SQL through a handle-based [`Driver`] and streams results into
//! typed, nullable columns. Result blocks are fetched into column-wise
//! buffers sized from the reported column types; variable data that does
//! not fit is re-read cell by cell, never silently truncated. Prepared
//! statements bind parameter arrays through reusable buffers for bulk
//! loads.
//!
//! # Example
//!
//! ```no_run
//! use cli_columnar_rs::{Connection, ConnectTarget, Cursor, MemoryDriver, Options, Result};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     // Connect to the database
//!     let conn = Connection::connect(
//!         Arc::new(MemoryDriver::new()),
//!         &ConnectTarget::dsn("memory"),
//!         Options::default(),
//!     )?;
//!
//!     conn.execute("CREATE TABLE readings (id BIGINT NOT NULL, value DECIMAL(10, 2))")?;
//!     let mut insert = conn.prepare("INSERT INTO readings VALUES (?, ?)")?;
//!     insert.execute(&[&1i64, &rust_decimal::Decimal::new(1050, 2)])?;
//!     drop(insert);
//!
//!     // Stream the result one batch at a time
//!     let mut cursor = conn.open_cursor("SELECT * FROM readings")?;
//!     while let Some(batch) = cursor.next()? {
//!         println!("{:?}", batch.column_by_name("value"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod handle;
pub mod sink;
pub mod statement;
pub mod types;

// Re-export main types
pub use buffer::{BufferSet, ColumnBuffer};
pub use config::{ConnectTarget, Options};
pub use connection::{Connection, QueryResult};
pub use cursor::{BatchView, Cursor, CursorState, ResultCursor, RowCursor};
pub use driver::memory::MemoryDriver;
pub use driver::{Driver, HandleKind, ParameterBinding, RawHandle, SqlReturn};
pub use error::{Diagnostic, Error, Result};
pub use handle::{Environment, StatementState};
pub use sink::{BatchSource, MemorySink, Sink, Source};
pub use statement::{Execution, PreparedStatement};
pub use types::{
    ColumnBatch, ColumnData, ColumnDescription, ColumnDescriptor, ColumnInfo, DecimalMode,
    NativeType, ParamDescription, Row, SqlDataType, ToParameter, TypeRegistry, TypedColumn, Value,
};
