//! Test driver replaying scripted replies on top of the in-memory driver.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::memory::MemoryDriver;
use super::{Driver, HandleKind, ParameterBinding, RawHandle, SqlReturn};
use crate::error::Diagnostic;
use crate::types::{CDataType, ColumnDescription, ParamDescription};

/// Delegates to a `MemoryDriver` except where a reply is scripted.
pub(crate) struct ScriptedDriver {
    pub inner: MemoryDriver,
    /// Return code and indicator for every `get_data`; the target is filled
    /// with `x`.
    get_data_reply: Option<(SqlReturn, isize)>,
    get_data_calls: AtomicUsize,
    /// `unbind_cols` and `reset_params` fail.
    fail_unbind: bool,
    /// `describe_param` fails with this diagnostic.
    describe_param_error: Option<Diagnostic>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            inner: MemoryDriver::new(),
            get_data_reply: None,
            get_data_calls: AtomicUsize::new(0),
            fail_unbind: false,
            describe_param_error: None,
        }
    }

    pub fn with_get_data_reply(mut self, ret: SqlReturn, indicator: isize) -> Self {
        self.get_data_reply = Some((ret, indicator));
        self
    }

    pub fn with_failing_unbind(mut self) -> Self {
        self.fail_unbind = true;
        self
    }

    pub fn with_describe_param_error(mut self, diagnostic: Diagnostic) -> Self {
        self.describe_param_error = Some(diagnostic);
        self
    }

    pub fn get_data_calls(&self) -> usize {
        self.get_data_calls.load(Ordering::SeqCst)
    }
}

impl Driver for ScriptedDriver {
    fn alloc_environment(&self, out: &mut RawHandle) -> SqlReturn {
        self.inner.alloc_environment(out)
    }

    fn alloc_connection(&self, env: RawHandle, out: &mut RawHandle) -> SqlReturn {
        self.inner.alloc_connection(env, out)
    }

    fn driver_connect(&self, dbc: RawHandle, connection_string: &str) -> SqlReturn {
        self.inner.driver_connect(dbc, connection_string)
    }

    fn disconnect(&self, dbc: RawHandle) -> SqlReturn {
        self.inner.disconnect(dbc)
    }

    fn alloc_statement(&self, dbc: RawHandle, out: &mut RawHandle) -> SqlReturn {
        self.inner.alloc_statement(dbc, out)
    }

    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> SqlReturn {
        self.inner.free_handle(kind, handle)
    }

    fn prepare(&self, stmt: RawHandle, sql: &str) -> SqlReturn {
        self.inner.prepare(stmt, sql)
    }

    fn exec_direct(&self, stmt: RawHandle, sql: &str) -> SqlReturn {
        self.inner.exec_direct(stmt, sql)
    }

    fn execute(&self, stmt: RawHandle) -> SqlReturn {
        self.inner.execute(stmt)
    }

    fn num_params(&self, stmt: RawHandle, out: &mut u16) -> SqlReturn {
        self.inner.num_params(stmt, out)
    }

    fn describe_param(&self, stmt: RawHandle, number: u16, out: &mut ParamDescription) -> SqlReturn {
        if self.describe_param_error.is_some() {
            return SqlReturn::Error;
        }
        self.inner.describe_param(stmt, number, out)
    }

    fn num_result_cols(&self, stmt: RawHandle, out: &mut u16) -> SqlReturn {
        self.inner.num_result_cols(stmt, out)
    }

    fn describe_col(&self, stmt: RawHandle, number: u16, out: &mut ColumnDescription) -> SqlReturn {
        self.inner.describe_col(stmt, number, out)
    }

    fn set_row_array_size(&self, stmt: RawHandle, size: usize) -> SqlReturn {
        self.inner.set_row_array_size(stmt, size)
    }

    fn set_paramset_size(&self, stmt: RawHandle, size: usize) -> SqlReturn {
        self.inner.set_paramset_size(stmt, size)
    }

    unsafe fn bind_col(
        &self,
        stmt: RawHandle,
        number: u16,
        c_type: CDataType,
        target: *mut u8,
        element_len: usize,
        indicators: *mut isize,
    ) -> SqlReturn {
        self.inner
            .bind_col(stmt, number, c_type, target, element_len, indicators)
    }

    unsafe fn bind_parameter(
        &self,
        stmt: RawHandle,
        number: u16,
        binding: &ParameterBinding,
        value: *const u8,
        element_len: usize,
        indicators: *const isize,
    ) -> SqlReturn {
        self.inner
            .bind_parameter(stmt, number, binding, value, element_len, indicators)
    }

    fn unbind_cols(&self, stmt: RawHandle) -> SqlReturn {
        if self.fail_unbind {
            return SqlReturn::Error;
        }
        self.inner.unbind_cols(stmt)
    }

    fn reset_params(&self, stmt: RawHandle) -> SqlReturn {
        if self.fail_unbind {
            return SqlReturn::Error;
        }
        self.inner.reset_params(stmt)
    }

    fn fetch(&self, stmt: RawHandle, rows_fetched: &mut usize) -> SqlReturn {
        self.inner.fetch(stmt, rows_fetched)
    }

    fn get_data(
        &self,
        stmt: RawHandle,
        row_in_block: usize,
        column: u16,
        c_type: CDataType,
        target: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn {
        self.get_data_calls.fetch_add(1, Ordering::SeqCst);
        match self.get_data_reply {
            Some((ret, reply)) => {
                target.fill(b'x');
                *indicator = reply;
                ret
            }
            None => self
                .inner
                .get_data(stmt, row_in_block, column, c_type, target, indicator),
        }
    }

    fn row_count(&self, stmt: RawHandle, out: &mut isize) -> SqlReturn {
        self.inner.row_count(stmt, out)
    }

    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn {
        self.inner.close_cursor(stmt)
    }

    fn diagnostics(&self, kind: HandleKind, handle: RawHandle) -> Vec<Diagnostic> {
        match &self.describe_param_error {
            Some(diagnostic) if kind == HandleKind::Statement => vec![diagnostic.clone()],
            _ => self.inner.diagnostics(kind, handle),
        }
    }
}
