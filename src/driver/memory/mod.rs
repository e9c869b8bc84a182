//! Loopback driver over an in-memory table store.
//!
//! Implements the `Driver` contract the way a native driver does: results
//! are written through bound column pointers a block at a time, truncated
//! variable data is flagged with `01004`, `get_data` re-reads one cell in
//! chunks and parameters are read from column-wise arrays of
//! `paramset_size` elements. Statements are limited to the shapes listed in
//! [`command`].

mod command;
mod marshal;
mod store;

use std::collections::HashMap;

use log::{debug, trace};
use parking_lot::Mutex;

use self::command::{parse, Parsed};
use self::marshal::{copy_chunk, read_element, render, write_element, Rendered};
use self::store::{Cell, ResultSet, Store};
use super::{Driver, HandleKind, ParameterBinding, RawHandle, SqlReturn};
use crate::error::Diagnostic;
use crate::types::{CDataType, ColumnDescription, ParamDescription, NO_TOTAL};

/// Database used by connection strings without a `DATABASE` key.
pub const DEFAULT_DATABASE: &str = "main";

/// Data source registered by `MemoryDriver::new`.
pub const DEFAULT_DSN: &str = "memory";

/// Driver name accepted in `DRIVER={...}`.
pub const DRIVER_NAME: &str = "Memory";

/// Raw pointer that may cross threads inside the state lock.
#[derive(Debug, Clone, Copy)]
struct SendPtr<T>(*mut T);

// SAFETY: the pointers are only dereferenced while the state lock is held,
// and the binding contract of `Driver` keeps the memory alive until unbind.
unsafe impl<T> Send for SendPtr<T> {}

#[derive(Debug, Clone, Copy)]
struct ColumnBinding {
    c_type: CDataType,
    target: SendPtr<u8>,
    element_len: usize,
    indicators: SendPtr<isize>,
}

#[derive(Debug, Clone, Copy)]
struct ParamBinding {
    binding: ParameterBinding,
    value: SendPtr<u8>,
    element_len: usize,
    indicators: SendPtr<isize>,
}

#[derive(Debug, Clone)]
struct DsnEntry {
    database: String,
    credentials: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct ConnState {
    env: usize,
    database: Option<String>,
}

/// Open result of a statement.
#[derive(Debug)]
struct OpenCursor {
    result: ResultSet,
    /// Index of the first row of the current block.
    block_start: usize,
    block_len: usize,
    /// Bytes already returned by `get_data` per (row in block, column).
    /// `None` once the cell is complete.
    chunks: HashMap<(usize, u16), Option<usize>>,
}

#[derive(Debug)]
struct StmtState {
    conn: usize,
    prepared: Option<Parsed>,
    cursor: Option<OpenCursor>,
    row_count: isize,
    row_array_size: usize,
    paramset_size: usize,
    columns: HashMap<u16, ColumnBinding>,
    params: HashMap<u16, ParamBinding>,
}

impl StmtState {
    fn new(conn: usize) -> Self {
        Self {
            conn,
            prepared: None,
            cursor: None,
            row_count: -1,
            row_array_size: 1,
            paramset_size: 1,
            columns: HashMap::new(),
            params: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    next_handle: usize,
    envs: HashMap<usize, ()>,
    conns: HashMap<usize, ConnState>,
    stmts: HashMap<usize, StmtState>,
    diagnostics: HashMap<usize, Vec<Diagnostic>>,
    databases: HashMap<String, Store>,
    dsns: HashMap<String, DsnEntry>,
    fail_execute: Option<Diagnostic>,
    fail_fetch: Option<Diagnostic>,
    fail_get_data: Option<Diagnostic>,
}

impl State {
    fn alloc(&mut self) -> usize {
        self.next_handle += 1;
        self.next_handle
    }

    fn fail(&mut self, handle: usize, diagnostic: Diagnostic) -> SqlReturn {
        self.diagnostics.entry(handle).or_default().push(diagnostic);
        SqlReturn::Error
    }

    fn warn(&mut self, handle: usize, diagnostic: Diagnostic) {
        self.diagnostics.entry(handle).or_default().push(diagnostic);
    }

    fn database_of(&self, stmt: usize) -> Option<String> {
        let conn = self.stmts.get(&stmt)?.conn;
        self.conns.get(&conn)?.database.clone()
    }
}

/// In-memory implementation of [`Driver`].
#[derive(Debug)]
pub struct MemoryDriver {
    state: Mutex<State>,
    describe_params: bool,
    no_total: bool,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Create a driver with the `memory` data source bound to the default
    /// database.
    pub fn new() -> Self {
        let driver = Self {
            state: Mutex::new(State::default()),
            describe_params: true,
            no_total: false,
        };
        driver.register_dsn(DEFAULT_DSN, DEFAULT_DATABASE, None);
        driver
    }

    /// Make `describe_param` unsupported, as many drivers do.
    pub fn without_describe_param(mut self) -> Self {
        self.describe_params = false;
        self
    }

    /// Report `NO_TOTAL` instead of the full length for truncated data.
    pub fn with_no_total(mut self) -> Self {
        self.no_total = true;
        self
    }

    /// Register a data source name, optionally requiring credentials.
    pub fn register_dsn(&self, name: &str, database: &str, credentials: Option<(&str, &str)>) {
        self.state.lock().dsns.insert(
            name.to_ascii_lowercase(),
            DsnEntry {
                database: database.to_string(),
                credentials: credentials.map(|(u, p)| (u.to_string(), p.to_string())),
            },
        );
    }

    /// Fail the next `execute` or `exec_direct` with `diagnostic`.
    pub fn fail_next_execute(&self, diagnostic: Diagnostic) {
        self.state.lock().fail_execute = Some(diagnostic);
    }

    /// Fail the next `fetch` with `diagnostic`.
    pub fn fail_next_fetch(&self, diagnostic: Diagnostic) {
        self.state.lock().fail_fetch = Some(diagnostic);
    }

    /// Fail the next `get_data` with `diagnostic`.
    pub fn fail_next_get_data(&self, diagnostic: Diagnostic) {
        self.state.lock().fail_get_data = Some(diagnostic);
    }

    /// Number of live environment, connection and statement handles.
    pub fn open_handle_count(&self) -> usize {
        let state = self.state.lock();
        state.envs.len() + state.conns.len() + state.stmts.len()
    }

    /// Number of live statement handles.
    pub fn open_statement_count(&self) -> usize {
        self.state.lock().stmts.len()
    }

    /// Look up the handle and clear its diagnostics, as every ODBC call does.
    fn enter(state: &mut State, handle: RawHandle, kind: HandleKind) -> bool {
        let live = match kind {
            HandleKind::Environment => state.envs.contains_key(&handle.0),
            HandleKind::Connection => state.conns.contains_key(&handle.0),
            HandleKind::Statement => state.stmts.contains_key(&handle.0),
        };
        if live {
            state.diagnostics.remove(&handle.0);
        }
        live
    }

    fn run_execute(&self, state: &mut State, stmt: usize) -> SqlReturn {
        if let Some(diagnostic) = state.fail_execute.take() {
            return state.fail(stmt, diagnostic);
        }
        let Some(database) = state.database_of(stmt) else {
            return state.fail(stmt, Diagnostic::new("08003", 0, "Connection not open"));
        };
        let Some(st) = state.stmts.get_mut(&stmt) else {
            return SqlReturn::InvalidHandle;
        };
        st.cursor = None;
        let Some(parsed) = st.prepared.clone() else {
            return state.fail(stmt, Diagnostic::new("HY010", 0, "Function sequence error"));
        };

        let param_sets = match read_params(st, parsed.param_count) {
            Ok(sets) => sets,
            Err(diagnostic) => return state.fail(stmt, diagnostic),
        };
        let store = state.databases.entry(database).or_default();
        match parsed.run(store, &param_sets) {
            Ok(outcome) => {
                debug!(
                    "memory driver: statement {} affected {} rows, result set: {}",
                    stmt,
                    outcome.row_count,
                    outcome.result.is_some()
                );
                if let Some(st) = state.stmts.get_mut(&stmt) {
                    st.row_count = outcome.row_count;
                    st.cursor = outcome.result.map(|result| OpenCursor {
                        result,
                        block_start: 0,
                        block_len: 0,
                        chunks: HashMap::new(),
                    });
                }
                SqlReturn::Success
            }
            Err(diagnostic) => state.fail(stmt, diagnostic),
        }
    }
}

/// Read every bound parameter set of the statement.
fn read_params(st: &StmtState, count: usize) -> Result<Vec<Vec<Cell>>, Diagnostic> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut sets = Vec::with_capacity(st.paramset_size);
    for set in 0..st.paramset_size {
        let mut cells = Vec::with_capacity(count);
        for number in 1..=count as u16 {
            let Some(param) = st.params.get(&number) else {
                return Err(Diagnostic::new(
                    "07002",
                    0,
                    format!("COUNT field incorrect: parameter {} is not bound", number),
                ));
            };
            // SAFETY: the binding contract guarantees `paramset_size`
            // elements and indicators behind the bound pointers.
            let (source, indicator) = unsafe {
                let source = std::slice::from_raw_parts(
                    param.value.0.add(set * param.element_len) as *const u8,
                    param.element_len,
                );
                (source, *param.indicators.0.add(set))
            };
            let cell = read_element(param.binding.c_type, source, indicator)?;
            cells.push(cell);
        }
        sets.push(cells);
    }
    Ok(sets)
}

/// Parse `KEY=value;` pairs; values may be wrapped in braces with `}}`
/// escaping a closing brace.
fn parse_connection_string(input: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let key_start = i;
        while i < chars.len() && chars[i] != '=' {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();
        i += 1;
        let mut value = String::new();
        if chars.get(i) == Some(&'{') {
            i += 1;
            while i < chars.len() {
                if chars[i] == '}' {
                    if chars.get(i + 1) == Some(&'}') {
                        value.push('}');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                value.push(chars[i]);
                i += 1;
            }
            while i < chars.len() && chars[i] != ';' {
                i += 1;
            }
        } else {
            while i < chars.len() && chars[i] != ';' {
                value.push(chars[i]);
                i += 1;
            }
        }
        i += 1;
        let key = key.trim().to_ascii_uppercase();
        if !key.is_empty() {
            pairs.insert(key, value.trim().to_string());
        }
    }
    pairs
}

impl Driver for MemoryDriver {
    fn alloc_environment(&self, out: &mut RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        let handle = state.alloc();
        state.envs.insert(handle, ());
        *out = RawHandle(handle);
        SqlReturn::Success
    }

    fn alloc_connection(&self, env: RawHandle, out: &mut RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, env, HandleKind::Environment) {
            return SqlReturn::InvalidHandle;
        }
        let handle = state.alloc();
        state.conns.insert(
            handle,
            ConnState {
                env: env.0,
                database: None,
            },
        );
        *out = RawHandle(handle);
        SqlReturn::Success
    }

    fn driver_connect(&self, dbc: RawHandle, connection_string: &str) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, dbc, HandleKind::Connection) {
            return SqlReturn::InvalidHandle;
        }
        let pairs = parse_connection_string(connection_string);
        let user = pairs.get("UID").cloned().unwrap_or_default();
        let password = pairs.get("PWD").cloned().unwrap_or_default();

        let database = if let Some(dsn) = pairs.get("DSN") {
            let Some(entry) = state.dsns.get(&dsn.to_ascii_lowercase()).cloned() else {
                return state.fail(
                    dbc.0,
                    Diagnostic::new(
                        "IM002",
                        0,
                        format!("Data source name '{}' not found", dsn),
                    ),
                );
            };
            if let Some((u, p)) = &entry.credentials {
                if *u != user || *p != password {
                    return state.fail(
                        dbc.0,
                        Diagnostic::new("28000", 18456, format!("Login failed for user '{}'", user)),
                    );
                }
            }
            entry.database
        } else if let Some(driver) = pairs.get("DRIVER") {
            if !driver.eq_ignore_ascii_case(DRIVER_NAME) {
                return state.fail(
                    dbc.0,
                    Diagnostic::new(
                        "IM002",
                        0,
                        format!("Driver '{}' not found and no default driver specified", driver),
                    ),
                );
            }
            pairs
                .get("DATABASE")
                .cloned()
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
        } else {
            return state.fail(
                dbc.0,
                Diagnostic::new(
                    "IM002",
                    0,
                    "Data source name not found and no default driver specified",
                ),
            );
        };

        if let Some(conn) = state.conns.get_mut(&dbc.0) {
            if conn.database.is_some() {
                return state.fail(dbc.0, Diagnostic::new("08002", 0, "Connection name in use"));
            }
            debug!("memory driver: connection {} opened database '{}'", dbc.0, database);
            conn.database = Some(database);
        }
        SqlReturn::Success
    }

    fn disconnect(&self, dbc: RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, dbc, HandleKind::Connection) {
            return SqlReturn::InvalidHandle;
        }
        if state.stmts.values().any(|s| s.conn == dbc.0) {
            return state.fail(
                dbc.0,
                Diagnostic::new("HY010", 0, "Statements are still allocated on the connection"),
            );
        }
        match state.conns.get_mut(&dbc.0) {
            Some(conn) if conn.database.is_some() => {
                conn.database = None;
                SqlReturn::Success
            }
            _ => state.fail(dbc.0, Diagnostic::new("08003", 0, "Connection not open")),
        }
    }

    fn alloc_statement(&self, dbc: RawHandle, out: &mut RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, dbc, HandleKind::Connection) {
            return SqlReturn::InvalidHandle;
        }
        let connected = state
            .conns
            .get(&dbc.0)
            .map_or(false, |c| c.database.is_some());
        if !connected {
            return state.fail(dbc.0, Diagnostic::new("08003", 0, "Connection not open"));
        }
        let handle = state.alloc();
        state.stmts.insert(handle, StmtState::new(dbc.0));
        *out = RawHandle(handle);
        SqlReturn::Success
    }

    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, handle, kind) {
            return SqlReturn::InvalidHandle;
        }
        let busy = match kind {
            HandleKind::Environment => state.conns.values().any(|c| c.env == handle.0),
            HandleKind::Connection => state
                .conns
                .get(&handle.0)
                .map_or(false, |c| c.database.is_some()),
            HandleKind::Statement => false,
        };
        if busy {
            return state.fail(handle.0, Diagnostic::new("HY010", 0, "Function sequence error"));
        }
        match kind {
            HandleKind::Environment => {
                state.envs.remove(&handle.0);
            }
            HandleKind::Connection => {
                state.conns.remove(&handle.0);
            }
            HandleKind::Statement => {
                state.stmts.remove(&handle.0);
            }
        }
        state.diagnostics.remove(&handle.0);
        SqlReturn::Success
    }

    fn prepare(&self, stmt: RawHandle, sql: &str) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        match parse(sql) {
            Ok(parsed) => {
                trace!("memory driver: prepared {:?}", parsed.command);
                if let Some(st) = state.stmts.get_mut(&stmt.0) {
                    st.cursor = None;
                    st.prepared = Some(parsed);
                }
                SqlReturn::Success
            }
            Err(diagnostic) => state.fail(stmt.0, diagnostic),
        }
    }

    fn exec_direct(&self, stmt: RawHandle, sql: &str) -> SqlReturn {
        let ret = self.prepare(stmt, sql);
        if !ret.is_success() {
            return ret;
        }
        self.execute(stmt)
    }

    fn execute(&self, stmt: RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        self.run_execute(&mut state, stmt.0)
    }

    fn num_params(&self, stmt: RawHandle, out: &mut u16) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        match state.stmts.get(&stmt.0).and_then(|s| s.prepared.as_ref()) {
            Some(parsed) => {
                *out = parsed.param_count as u16;
                SqlReturn::Success
            }
            None => state.fail(stmt.0, Diagnostic::new("HY010", 0, "Function sequence error")),
        }
    }

    fn describe_param(
        &self,
        stmt: RawHandle,
        number: u16,
        out: &mut ParamDescription,
    ) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if !self.describe_params {
            return state.fail(
                stmt.0,
                Diagnostic::new("IM001", 0, "Driver does not support this function"),
            );
        }
        let Some(parsed) = state.stmts.get(&stmt.0).and_then(|s| s.prepared.clone()) else {
            return state.fail(stmt.0, Diagnostic::new("HY010", 0, "Function sequence error"));
        };
        let database = state.database_of(stmt.0).unwrap_or_default();
        let store = state.databases.entry(database).or_default();
        match parsed.describe_param(store, (number as usize).wrapping_sub(1)) {
            Ok(desc) => {
                *out = desc;
                SqlReturn::Success
            }
            Err(diagnostic) => state.fail(stmt.0, diagnostic),
        }
    }

    fn num_result_cols(&self, stmt: RawHandle, out: &mut u16) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        *out = state
            .stmts
            .get(&stmt.0)
            .and_then(|s| s.cursor.as_ref())
            .map_or(0, |c| c.result.columns.len() as u16);
        SqlReturn::Success
    }

    fn describe_col(
        &self,
        stmt: RawHandle,
        number: u16,
        out: &mut ColumnDescription,
    ) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        let desc = state
            .stmts
            .get(&stmt.0)
            .and_then(|s| s.cursor.as_ref())
            .and_then(|c| c.result.columns.get((number as usize).wrapping_sub(1)))
            .cloned();
        match desc {
            Some(desc) => {
                *out = desc;
                SqlReturn::Success
            }
            None => state.fail(
                stmt.0,
                Diagnostic::new("07009", 0, format!("Invalid descriptor index {}", number)),
            ),
        }
    }

    fn set_row_array_size(&self, stmt: RawHandle, size: usize) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if size == 0 {
            return state.fail(stmt.0, Diagnostic::new("HY024", 0, "Invalid attribute value"));
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.row_array_size = size;
        }
        SqlReturn::Success
    }

    fn set_paramset_size(&self, stmt: RawHandle, size: usize) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if size == 0 {
            return state.fail(stmt.0, Diagnostic::new("HY024", 0, "Invalid attribute value"));
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.paramset_size = size;
        }
        SqlReturn::Success
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
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if number == 0 || target.is_null() || indicators.is_null() {
            return state.fail(stmt.0, Diagnostic::new("HY009", 0, "Invalid use of null pointer"));
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.columns.insert(
                number,
                ColumnBinding {
                    c_type,
                    target: SendPtr(target),
                    element_len,
                    indicators: SendPtr(indicators),
                },
            );
        }
        SqlReturn::Success
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
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if number == 0 || value.is_null() || indicators.is_null() {
            return state.fail(stmt.0, Diagnostic::new("HY009", 0, "Invalid use of null pointer"));
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.params.insert(
                number,
                ParamBinding {
                    binding: *binding,
                    value: SendPtr(value as *mut u8),
                    element_len,
                    indicators: SendPtr(indicators as *mut isize),
                },
            );
        }
        SqlReturn::Success
    }

    fn unbind_cols(&self, stmt: RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.columns.clear();
        }
        SqlReturn::Success
    }

    fn reset_params(&self, stmt: RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.params.clear();
        }
        SqlReturn::Success
    }

    fn fetch(&self, stmt: RawHandle, rows_fetched: &mut usize) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        *rows_fetched = 0;
        if let Some(diagnostic) = state.fail_fetch.take() {
            return state.fail(stmt.0, diagnostic);
        }
        let no_total = self.no_total;
        let Some(st) = state.stmts.get_mut(&stmt.0) else {
            return SqlReturn::InvalidHandle;
        };
        let row_array_size = st.row_array_size;
        let bindings: Vec<(u16, ColumnBinding)> = st.columns.iter().map(|(n, b)| (*n, *b)).collect();
        let Some(cursor) = st.cursor.as_mut() else {
            return state.fail(stmt.0, Diagnostic::new("24000", 0, "Invalid cursor state"));
        };

        let start = cursor.block_start + cursor.block_len;
        let end = (start + row_array_size).min(cursor.result.rows.len());
        cursor.block_start = start;
        cursor.block_len = end.saturating_sub(start);
        cursor.chunks.clear();
        if cursor.block_len == 0 {
            return SqlReturn::NoData;
        }

        let mut truncated = None;
        let mut failure = None;
        'rows: for (i, row) in cursor.result.rows[start..end].iter().enumerate() {
            for (number, binding) in &bindings {
                let Some(cell) = row.get(*number as usize - 1) else {
                    failure = Some(Diagnostic::new(
                        "07009",
                        0,
                        format!("Invalid descriptor index {}", number),
                    ));
                    break 'rows;
                };
                // SAFETY: `bind_col` callers guarantee `row_array_size`
                // elements of `element_len` bytes and as many indicators.
                let (element, indicator) = unsafe {
                    (
                        std::slice::from_raw_parts_mut(
                            binding.target.0.add(i * binding.element_len),
                            binding.element_len,
                        ),
                        &mut *binding.indicators.0.add(i),
                    )
                };
                let written = render(cell, binding.c_type)
                    .and_then(|r| write_element(&r, binding.c_type, element, no_total));
                match written {
                    Ok(w) => {
                        *indicator = w.indicator;
                        if w.truncated && truncated.is_none() {
                            truncated = Some((i, *number));
                        }
                    }
                    Err(diagnostic) => {
                        failure = Some(diagnostic);
                        break 'rows;
                    }
                }
            }
        }
        let fetched = cursor.block_len;
        if let Some(diagnostic) = failure {
            return state.fail(stmt.0, diagnostic);
        }
        *rows_fetched = fetched;
        trace!("memory driver: fetched {} rows from row {}", fetched, start);
        match truncated {
            Some((row, column)) => {
                state.warn(
                    stmt.0,
                    Diagnostic::new(
                        "01004",
                        0,
                        format!(
                            "String data, right truncated (row {}, column {})",
                            row + 1,
                            column
                        ),
                    ),
                );
                SqlReturn::SuccessWithInfo
            }
            None => SqlReturn::Success,
        }
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
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if let Some(diagnostic) = state.fail_get_data.take() {
            return state.fail(stmt.0, diagnostic);
        }
        let no_total = self.no_total;
        let Some(cursor) = state.stmts.get_mut(&stmt.0).and_then(|s| s.cursor.as_mut()) else {
            return state.fail(stmt.0, Diagnostic::new("24000", 0, "Invalid cursor state"));
        };
        if row_in_block >= cursor.block_len {
            return state.fail(stmt.0, Diagnostic::new("HY109", 0, "Invalid cursor position"));
        }
        let Some(cell) = cursor.result.rows[cursor.block_start + row_in_block]
            .get((column as usize).wrapping_sub(1))
        else {
            return state.fail(
                stmt.0,
                Diagnostic::new("07009", 0, format!("Invalid descriptor index {}", column)),
            );
        };
        let progress = cursor.chunks.entry((row_in_block, column)).or_insert(Some(0));
        let Some(offset) = *progress else {
            return SqlReturn::NoData;
        };

        let rendered = match render(cell, c_type) {
            Ok(r) => r,
            Err(diagnostic) => return state.fail(stmt.0, diagnostic),
        };
        match rendered {
            Rendered::Variable(bytes) => {
                let remaining = &bytes[offset.min(bytes.len())..];
                let copied = match copy_chunk(remaining, c_type, target) {
                    Ok(n) => n,
                    Err(diagnostic) => return state.fail(stmt.0, diagnostic),
                };
                if copied < remaining.len() {
                    *progress = Some(offset + copied);
                    *indicator = if no_total {
                        NO_TOTAL
                    } else {
                        remaining.len() as isize
                    };
                    state.warn(stmt.0, Diagnostic::new("01004", 0, "String data, right truncated"));
                    SqlReturn::SuccessWithInfo
                } else {
                    *progress = None;
                    *indicator = remaining.len() as isize;
                    SqlReturn::Success
                }
            }
            other => {
                *progress = None;
                match write_element(&other, c_type, target, no_total) {
                    Ok(w) => {
                        *indicator = w.indicator;
                        SqlReturn::Success
                    }
                    Err(diagnostic) => state.fail(stmt.0, diagnostic),
                }
            }
        }
    }

    fn row_count(&self, stmt: RawHandle, out: &mut isize) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        *out = state.stmts.get(&stmt.0).map_or(-1, |s| s.row_count);
        SqlReturn::Success
    }

    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn {
        let mut state = self.state.lock();
        if !Self::enter(&mut state, stmt, HandleKind::Statement) {
            return SqlReturn::InvalidHandle;
        }
        if let Some(st) = state.stmts.get_mut(&stmt.0) {
            st.cursor = None;
        }
        SqlReturn::Success
    }

    fn diagnostics(&self, _kind: HandleKind, handle: RawHandle) -> Vec<Diagnostic> {
        self.state
            .lock()
            .diagnostics
            .get(&handle.0)
            .cloned()
            .unwrap_or_default()
    }
}
