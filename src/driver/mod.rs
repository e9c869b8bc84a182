//! The call-level interface seam.
//!
//! `Driver` mirrors the handle based ODBC calls one to one: every method
//! returns a `SqlReturn` code and leaves diagnostic records on the handle,
//! which are read back with `Driver::diagnostics`. Nothing above
//! `crate::handle` talks to a driver directly.

pub mod memory;
#[cfg(test)]
pub(crate) mod scripted;

use crate::error::Diagnostic;
use crate::types::{CDataType, ColumnDescription, ParamDescription, SqlDataType};

/// Opaque driver handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Kind of handle, used for freeing and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Environment,
    Connection,
    Statement,
}

/// Return code of a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlReturn {
    Success,
    /// Succeeded with warnings, e.g. `01004` right truncation.
    SuccessWithInfo,
    NoData,
    NeedData,
    StillExecuting,
    Error,
    InvalidHandle,
}

impl SqlReturn {
    /// True for `Success` and `SuccessWithInfo`.
    pub fn is_success(&self) -> bool {
        matches!(self, SqlReturn::Success | SqlReturn::SuccessWithInfo)
    }
}

/// How a parameter buffer is described to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterBinding {
    /// Layout of the bound buffer.
    pub c_type: CDataType,
    /// SQL type the driver should convert the value to.
    pub sql_type: SqlDataType,
    pub column_size: usize,
    pub decimal_digits: i16,
}

/// A driver implementing the call-level interface.
///
/// Implementations must be thread safe; the client itself never calls into
/// the same statement handle from two threads at once.
pub trait Driver: Send + Sync {
    fn alloc_environment(&self, out: &mut RawHandle) -> SqlReturn;

    fn alloc_connection(&self, env: RawHandle, out: &mut RawHandle) -> SqlReturn;

    /// Connect using a `KEY=value;` connection string.
    fn driver_connect(&self, dbc: RawHandle, connection_string: &str) -> SqlReturn;

    fn disconnect(&self, dbc: RawHandle) -> SqlReturn;

    fn alloc_statement(&self, dbc: RawHandle, out: &mut RawHandle) -> SqlReturn;

    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> SqlReturn;

    fn prepare(&self, stmt: RawHandle, sql: &str) -> SqlReturn;

    fn exec_direct(&self, stmt: RawHandle, sql: &str) -> SqlReturn;

    /// Execute the prepared statement with the currently bound parameters.
    fn execute(&self, stmt: RawHandle) -> SqlReturn;

    fn num_params(&self, stmt: RawHandle, out: &mut u16) -> SqlReturn;

    /// Describe parameter `number` (1-based). Drivers without support
    /// return `Error` with SQLSTATE `IM001` or `HYC00`.
    fn describe_param(&self, stmt: RawHandle, number: u16, out: &mut ParamDescription)
        -> SqlReturn;

    fn num_result_cols(&self, stmt: RawHandle, out: &mut u16) -> SqlReturn;

    /// Describe result column `number` (1-based).
    fn describe_col(&self, stmt: RawHandle, number: u16, out: &mut ColumnDescription)
        -> SqlReturn;

    /// Rows returned per `fetch` (`SQL_ATTR_ROW_ARRAY_SIZE`).
    fn set_row_array_size(&self, stmt: RawHandle, size: usize) -> SqlReturn;

    /// Parameter sets read per `execute` (`SQL_ATTR_PARAMSET_SIZE`).
    fn set_paramset_size(&self, stmt: RawHandle, size: usize) -> SqlReturn;

    /// Bind result column `number` to a column-wise buffer.
    ///
    /// # Safety
    ///
    /// `target` must be valid for writes of `element_len * row_array_size`
    /// bytes and `indicators` for `row_array_size` values, until the column
    /// is unbound, rebound, or the statement is freed.
    unsafe fn bind_col(
        &self,
        stmt: RawHandle,
        number: u16,
        c_type: CDataType,
        target: *mut u8,
        element_len: usize,
        indicators: *mut isize,
    ) -> SqlReturn;

    /// Bind parameter `number` to a column-wise buffer.
    ///
    /// # Safety
    ///
    /// `value` must be valid for reads of `element_len * paramset_size` bytes
    /// and `indicators` for `paramset_size` values, until parameters are
    /// reset, rebound, or the statement is freed.
    unsafe fn bind_parameter(
        &self,
        stmt: RawHandle,
        number: u16,
        binding: &ParameterBinding,
        value: *const u8,
        element_len: usize,
        indicators: *const isize,
    ) -> SqlReturn;

    fn unbind_cols(&self, stmt: RawHandle) -> SqlReturn;

    fn reset_params(&self, stmt: RawHandle) -> SqlReturn;

    /// Fetch the next block of rows into the bound buffers.
    ///
    /// Returns `NoData` once the result is exhausted.
    fn fetch(&self, stmt: RawHandle, rows_fetched: &mut usize) -> SqlReturn;

    /// Read one cell of the current block in chunks.
    ///
    /// The first call for a cell starts at its beginning; each further call
    /// continues where the previous one stopped. While data remains the call
    /// returns `SuccessWithInfo` with `01004`; after the last chunk it
    /// returns `NoData`. `indicator` receives the remaining length, `NO_TOTAL`
    /// or `NULL_DATA`.
    fn get_data(
        &self,
        stmt: RawHandle,
        row_in_block: usize,
        column: u16,
        c_type: CDataType,
        target: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn;

    fn row_count(&self, stmt: RawHandle, out: &mut isize) -> SqlReturn;

    /// Close the open cursor, if any (`SQLFreeStmt(SQL_CLOSE)`).
    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn;

    /// Diagnostic records left by the last call on `handle`.
    fn diagnostics(&self, kind: HandleKind, handle: RawHandle) -> Vec<Diagnostic>;
}
