//! High-level Connection API.

use std::sync::Arc;

use log::debug;

use crate::config::{ConnectTarget, Options};
use crate::cursor::{Cursor, ResultCursor, StatementSlot};
use crate::driver::Driver;
use crate::error::Result;
use crate::handle::{ConnectionHandle, Environment};
use crate::statement::PreparedStatement;
use crate::types::{ColumnBatch, ColumnData, ColumnInfo, Row, TypeRegistry};

/// Result of a query collected in full.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Column information.
    pub columns: Arc<ColumnInfo>,
    /// Every row of the result, column-wise.
    pub batch: ColumnBatch,
    /// Number of fetch round trips it took.
    pub batches: usize,
}

impl QueryResult {
    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.column_names()
    }

    /// Column values by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.batch.column_by_name(name)
    }

    /// Row `index`, assembled from the columns.
    pub fn row(&self, index: usize) -> Option<Row> {
        self.batch.row(index)
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.batch.rows()
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.batch.rows().collect::<Vec<_>>().into_iter()
    }
}

/// A database connection.
///
/// Statements and cursors borrow the connection, so it cannot be closed
/// while any of them is alive.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    options: Options,
    registry: TypeRegistry,
}

impl Connection {
    /// Connect through `driver`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cli_columnar_rs::{Connection, ConnectTarget, MemoryDriver, Options};
    /// use std::sync::Arc;
    ///
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let conn = Connection::connect(
    ///         Arc::new(MemoryDriver::new()),
    ///         &ConnectTarget::dsn("memory").with_credentials("read_user", "password"),
    ///         Options::default().with_batch_size(500),
    ///     )?;
    ///     Ok(())
    /// }
    /// ```
    pub fn connect(driver: Arc<dyn Driver>, target: &ConnectTarget, options: Options) -> Result<Self> {
        options.validate()?;
        let env = Environment::new(driver)?;
        Self::connect_with_environment(&env, target, options)
    }

    /// Connect on an existing environment.
    pub fn connect_with_environment(
        env: &Environment,
        target: &ConnectTarget,
        options: Options,
    ) -> Result<Self> {
        options.validate()?;
        let handle = ConnectionHandle::connect(env, &target.to_connection_string())?;
        if let ConnectTarget::Dsn { name, .. } = target {
            debug!("connected to data source '{}'", name);
        }
        Ok(Self {
            handle,
            registry: options.registry(),
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replace the options used by statements opened from now on.
    pub fn set_options(&mut self, options: Options) -> Result<()> {
        options.validate()?;
        self.registry = options.registry();
        self.options = options;
        Ok(())
    }

    /// Execute a statement directly and return the rows affected.
    ///
    /// A result set, if the statement produces one, is discarded.
    pub fn execute(&self, sql: &str) -> Result<u64> {
        let mut stmt = self.handle.alloc_statement()?;
        stmt.exec_direct(sql)?;
        let affected = stmt.row_count()?.max(0) as u64;
        if stmt.num_result_cols()? > 0 {
            stmt.close_cursor()?;
        }
        Ok(affected)
    }

    /// Execute a query and return a cursor over its result.
    pub fn open_cursor(&self, sql: &str) -> Result<ResultCursor<'_, '_>> {
        let mut stmt = self.handle.alloc_statement()?;
        stmt.exec_direct(sql)?;
        ResultCursor::new(
            StatementSlot::Owned(stmt),
            &self.registry,
            self.options.batch_size,
        )
    }

    /// Execute a query and collect the whole result.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        let mut cursor = self.open_cursor(sql)?;
        let columns = Arc::clone(cursor.info());
        let mut batch = ColumnBatch::empty(Arc::clone(&columns));
        let mut batches = 0;
        while let Some(next) = cursor.next_batch()? {
            batch.extend(next)?;
            batches += 1;
        }
        cursor.close()?;
        debug!("query returned {} rows in {} batches", batch.num_rows(), batches);
        Ok(QueryResult {
            columns,
            batch,
            batches,
        })
    }

    /// Prepare a statement for repeated execution.
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement<'_>> {
        PreparedStatement::new(
            &self.handle,
            sql,
            self.registry.clone(),
            self.options.batch_size,
        )
    }

    /// Check if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Disconnect and release the handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.handle.close()
    }
}
