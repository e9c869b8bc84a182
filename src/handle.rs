//! Scoped owners of environment, connection and statement handles.
//!
//! Raw handles never leave this module. Teardown order is carried by the
//! types: a `StatementHandle` borrows its `ConnectionHandle`, and the
//! environment is reference counted by every connection allocated from it,
//! so the driver always sees statement, then connection, then environment.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, trace};

use crate::driver::{Driver, HandleKind, ParameterBinding, RawHandle, SqlReturn};
use crate::error::{Diagnostic, Error, Result};
use crate::types::{CDataType, ColumnDescription, ParamDescription};

/// SQLSTATEs a driver reports when `describe_param` is not implemented.
const UNSUPPORTED_STATES: [&str; 2] = ["IM001", "HYC00"];

/// Turn a return code into a `Result`, collecting the handle's diagnostics.
///
/// The first diagnostic record becomes the error; further records are only
/// logged.
fn check(
    driver: &dyn Driver,
    kind: HandleKind,
    handle: RawHandle,
    ret: SqlReturn,
    operation: &'static str,
) -> Result<SqlReturn> {
    match ret {
        SqlReturn::Success | SqlReturn::NoData => Ok(ret),
        SqlReturn::SuccessWithInfo => {
            for record in driver.diagnostics(kind, handle) {
                trace!("{} returned info: {}", operation, record);
            }
            Ok(ret)
        }
        SqlReturn::InvalidHandle => Err(Error::InvalidHandle { operation }),
        SqlReturn::Error | SqlReturn::NeedData | SqlReturn::StillExecuting => {
            Err(Error::execution(
                operation,
                first_diagnostic(driver, kind, handle, operation),
            ))
        }
    }
}

fn first_diagnostic(
    driver: &dyn Driver,
    kind: HandleKind,
    handle: RawHandle,
    operation: &'static str,
) -> Diagnostic {
    let mut records = driver.diagnostics(kind, handle).into_iter();
    let first = records
        .next()
        .unwrap_or_else(|| Diagnostic::missing(operation));
    for extra in records {
        debug!("{}: additional diagnostic {}", operation, extra);
    }
    first
}

/// A driver environment.
///
/// Cheap to clone; the environment handle is freed when the last clone and
/// the last connection allocated from it are gone.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

struct EnvInner {
    driver: Arc<dyn Driver>,
    handle: RawHandle,
}

impl Drop for EnvInner {
    fn drop(&mut self) {
        let ret = self.driver.free_handle(HandleKind::Environment, self.handle);
        if !ret.is_success() {
            debug!("freeing environment handle returned {:?}", ret);
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("handle", &self.inner.handle)
            .finish()
    }
}

impl Environment {
    /// Allocate an environment on `driver`.
    pub fn new(driver: Arc<dyn Driver>) -> Result<Self> {
        let mut handle = RawHandle::NULL;
        match driver.alloc_environment(&mut handle) {
            ret if ret.is_success() && !handle.is_null() => Ok(Self {
                inner: Arc::new(EnvInner { driver, handle }),
            }),
            _ => Err(Error::ConnectionFailed {
                diagnostic: Diagnostic::missing("alloc_environment"),
            }),
        }
    }

    pub fn driver(&self) -> &dyn Driver {
        self.inner.driver.as_ref()
    }
}

/// An open connection handle.
///
/// `Send` but not `Sync`: one thread drives a connection at a time.
pub struct ConnectionHandle {
    env: Environment,
    handle: RawHandle,
    connected: bool,
    _not_sync: PhantomData<Cell<()>>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("handle", &self.handle)
            .field("connected", &self.connected)
            .finish()
    }
}

impl ConnectionHandle {
    /// Allocate a connection on `env` and connect with `connection_string`.
    ///
    /// Any failure is reported as `ConnectionFailed` and the partially
    /// allocated handle is released.
    pub fn connect(env: &Environment, connection_string: &str) -> Result<Self> {
        let driver = env.driver();
        let mut handle = RawHandle::NULL;
        let ret = driver.alloc_connection(env.inner.handle, &mut handle);
        if !ret.is_success() {
            return Err(Error::ConnectionFailed {
                diagnostic: first_diagnostic(
                    driver,
                    HandleKind::Environment,
                    env.inner.handle,
                    "alloc_connection",
                ),
            });
        }

        let mut conn = Self {
            env: env.clone(),
            handle,
            connected: false,
            _not_sync: PhantomData,
        };
        let ret = driver.driver_connect(handle, connection_string);
        if !ret.is_success() {
            let diagnostic =
                first_diagnostic(driver, HandleKind::Connection, handle, "driver_connect");
            return Err(Error::ConnectionFailed { diagnostic });
        }
        conn.connected = true;
        debug!("connected handle {:?}", handle);
        Ok(conn)
    }

    pub fn driver(&self) -> &dyn Driver {
        self.env.driver()
    }

    /// Check if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.handle.is_null()
    }

    /// Allocate a statement on this connection.
    pub fn alloc_statement(&self) -> Result<StatementHandle<'_>> {
        if self.is_closed() {
            return Err(Error::invalid_state("connection is closed"));
        }
        let driver = self.driver();
        let mut handle = RawHandle::NULL;
        let ret = driver.alloc_statement(self.handle, &mut handle);
        check(driver, HandleKind::Connection, self.handle, ret, "alloc_statement")?;
        trace!("allocated statement {:?}", handle);
        Ok(StatementHandle {
            conn: self,
            handle,
            state: StatementState::Unprepared,
            prepared: false,
        })
    }

    /// Disconnect and free the handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let handle = std::mem::replace(&mut self.handle, RawHandle::NULL);
        let driver = self.env.driver();
        let mut outcome = Ok(());
        if self.connected {
            self.connected = false;
            let ret = driver.disconnect(handle);
            if let Err(e) = check(driver, HandleKind::Connection, handle, ret, "disconnect") {
                outcome = Err(e);
            }
        }
        let ret = driver.free_handle(HandleKind::Connection, handle);
        check(driver, HandleKind::Connection, handle, ret, "free_handle")?;
        debug!("closed connection {:?}", handle);
        outcome
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("error while dropping connection: {}", e);
        }
    }
}

/// Lifecycle of a statement handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Unprepared,
    Prepared,
    Executed,
    Fetching,
    Exhausted,
    Closed,
}

/// Result of one block fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched {
    /// Rows written into the bound buffers.
    pub rows: usize,
    /// The driver reported right truncation for at least one cell.
    pub truncated: bool,
}

/// Result of one `get_data` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// A chunk was written; `more` is true while data remains.
    Data { indicator: isize, more: bool },
    /// The cell has been read completely.
    Done,
}

/// A statement handle borrowing its connection.
pub struct StatementHandle<'c> {
    conn: &'c ConnectionHandle,
    handle: RawHandle,
    state: StatementState,
    prepared: bool,
}

impl fmt::Debug for StatementHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementHandle")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

impl<'c> StatementHandle<'c> {
    fn driver(&self) -> &'c dyn Driver {
        self.conn.driver()
    }

    fn check(&self, ret: SqlReturn, operation: &'static str) -> Result<SqlReturn> {
        check(self.driver(), HandleKind::Statement, self.handle, ret, operation)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == StatementState::Closed {
            return Err(Error::invalid_state("statement is closed"));
        }
        Ok(())
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Prepare `sql` for repeated execution.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("prepare: {}", sql);
        let ret = self.driver().prepare(self.handle, sql);
        self.check(ret, "prepare")?;
        self.state = StatementState::Prepared;
        self.prepared = true;
        Ok(())
    }

    /// Execute `sql` directly.
    pub fn exec_direct(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("exec_direct: {}", sql);
        let ret = self.driver().exec_direct(self.handle, sql);
        self.check(ret, "execute")?;
        self.state = StatementState::Executed;
        Ok(())
    }

    /// Execute the prepared statement with the bound parameters.
    pub fn execute(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.prepared {
            return Err(Error::invalid_state("statement has not been prepared"));
        }
        let ret = self.driver().execute(self.handle);
        self.check(ret, "execute")?;
        self.state = StatementState::Executed;
        Ok(())
    }

    pub fn num_params(&self) -> Result<u16> {
        let mut count = 0;
        let ret = self.driver().num_params(self.handle, &mut count);
        self.check(ret, "num_params")?;
        Ok(count)
    }

    /// Describe parameter `number` (1-based).
    ///
    /// Returns `None` if the driver does not support parameter description.
    pub fn describe_param(&self, number: u16) -> Result<Option<ParamDescription>> {
        let mut desc = ParamDescription::default();
        let ret = self.driver().describe_param(self.handle, number, &mut desc);
        match self.check(ret, "describe_param") {
            Ok(_) => Ok(Some(desc)),
            Err(Error::QueryExecutionFailed { diagnostic, .. })
                if UNSUPPORTED_STATES.contains(&diagnostic.state.as_str()) =>
            {
                trace!("describe_param unsupported: {}", diagnostic);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn num_result_cols(&self) -> Result<u16> {
        let mut count = 0;
        let ret = self.driver().num_result_cols(self.handle, &mut count);
        self.check(ret, "num_result_cols")?;
        Ok(count)
    }

    /// Describe result column `number` (1-based).
    pub fn describe_col(&self, number: u16) -> Result<ColumnDescription> {
        let mut desc = ColumnDescription::default();
        let ret = self.driver().describe_col(self.handle, number, &mut desc);
        self.check(ret, "describe_col")?;
        Ok(desc)
    }

    pub fn set_row_array_size(&self, size: usize) -> Result<()> {
        let ret = self.driver().set_row_array_size(self.handle, size);
        self.check(ret, "set_row_array_size").map(|_| ())
    }

    pub fn set_paramset_size(&self, size: usize) -> Result<()> {
        let ret = self.driver().set_paramset_size(self.handle, size);
        self.check(ret, "set_paramset_size").map(|_| ())
    }

    /// Bind result column `number` to a column-wise buffer.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::bind_col`]: the buffers must outlive the
    /// binding.
    pub unsafe fn bind_col(
        &self,
        number: u16,
        c_type: CDataType,
        target: *mut u8,
        element_len: usize,
        indicators: *mut isize,
    ) -> Result<()> {
        let ret = self
            .driver()
            .bind_col(self.handle, number, c_type, target, element_len, indicators);
        self.check(ret, "bind_col").map(|_| ())
    }

    /// Bind parameter `number` to a column-wise buffer.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::bind_parameter`].
    pub unsafe fn bind_parameter(
        &self,
        number: u16,
        binding: &ParameterBinding,
        value: *const u8,
        element_len: usize,
        indicators: *const isize,
    ) -> Result<()> {
        let ret = self.driver().bind_parameter(
            self.handle,
            number,
            binding,
            value,
            element_len,
            indicators,
        );
        self.check(ret, "bind_parameter").map(|_| ())
    }

    pub fn unbind_cols(&self) -> Result<()> {
        let ret = self.driver().unbind_cols(self.handle);
        self.check(ret, "unbind_cols").map(|_| ())
    }

    pub fn reset_params(&self) -> Result<()> {
        let ret = self.driver().reset_params(self.handle);
        self.check(ret, "reset_params").map(|_| ())
    }

    /// Fetch the next block of rows. `None` once the result is exhausted.
    pub fn fetch(&mut self) -> Result<Option<Fetched>> {
        self.ensure_open()?;
        let mut rows = 0;
        let ret = self.driver().fetch(self.handle, &mut rows);
        match self.check(ret, "fetch")? {
            SqlReturn::NoData => {
                self.state = StatementState::Exhausted;
                Ok(None)
            }
            ret => {
                self.state = StatementState::Fetching;
                let truncated = ret == SqlReturn::SuccessWithInfo
                    && self
                        .driver()
                        .diagnostics(HandleKind::Statement, self.handle)
                        .iter()
                        .any(Diagnostic::is_truncation);
                Ok(Some(Fetched { rows, truncated }))
            }
        }
    }

    /// Read the next chunk of one cell of the current block.
    pub fn get_data(
        &self,
        row_in_block: usize,
        column: u16,
        c_type: CDataType,
        target: &mut [u8],
    ) -> Result<Chunk> {
        let mut indicator = 0;
        let ret = self.driver().get_data(
            self.handle,
            row_in_block,
            column,
            c_type,
            target,
            &mut indicator,
        );
        Ok(match self.check(ret, "get_data")? {
            SqlReturn::NoData => Chunk::Done,
            SqlReturn::SuccessWithInfo => Chunk::Data {
                indicator,
                more: true,
            },
            _ => Chunk::Data {
                indicator,
                more: false,
            },
        })
    }

    /// Rows affected by the last execute, or -1 if unknown.
    pub fn row_count(&self) -> Result<isize> {
        let mut count = 0;
        let ret = self.driver().row_count(self.handle, &mut count);
        self.check(ret, "row_count")?;
        Ok(count)
    }

    /// Close the open cursor so the statement can be executed again.
    pub fn close_cursor(&mut self) -> Result<()> {
        if self.state == StatementState::Closed {
            return Ok(());
        }
        let ret = self.driver().close_cursor(self.handle);
        self.check(ret, "close_cursor")?;
        self.state = if self.prepared {
            StatementState::Prepared
        } else {
            StatementState::Unprepared
        };
        Ok(())
    }

    /// Release bindings and free the handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StatementState::Closed {
            return Ok(());
        }
        self.state = StatementState::Closed;
        let driver = self.driver();
        // bindings go first so the driver holds no buffer addresses
        let unbind = driver.unbind_cols(self.handle);
        if let Err(e) = check(driver, HandleKind::Statement, self.handle, unbind, "unbind_cols") {
            debug!("error while unbinding columns of {:?}: {}", self.handle, e);
        }
        let reset = driver.reset_params(self.handle);
        if let Err(e) = check(driver, HandleKind::Statement, self.handle, reset, "reset_params") {
            debug!("error while resetting parameters of {:?}: {}", self.handle, e);
        }
        let ret = driver.free_handle(HandleKind::Statement, self.handle);
        check(driver, HandleKind::Statement, self.handle, ret, "free_handle")?;
        trace!("freed statement {:?}", self.handle);
        Ok(())
    }
}

impl Drop for StatementHandle<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("error while dropping statement: {}", e);
        }
    }
}
