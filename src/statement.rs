//! Prepared statements with reusable parameter buffers.
//!
//! Parameters are bound column-wise: each placeholder owns one buffer with
//! room for a whole array of parameter sets. A buffer keeps its shape (the
//! native type it was laid out for) across executions and is only
//! reallocated and rebound when a value no longer fits.

use log::{debug, trace};

use crate::buffer::BufferSet;
use crate::cursor::{ResultCursor, StatementSlot};
use crate::driver::ParameterBinding;
use crate::error::{Error, Result};
use crate::handle::{ConnectionHandle, StatementHandle};
use crate::sink::Source;
use crate::types::{
    ColumnDescription, NativeType, ParamDescription, ToParameter, TypeRegistry, Value,
};

/// Smallest capacity a variable parameter buffer is grown to.
const MIN_VARIABLE_CAPACITY: usize = 32;

/// Outcome of executing a statement.
#[derive(Debug)]
pub enum Execution<'s, 'c> {
    /// The statement did not produce a result set.
    RowsAffected(u64),
    /// The statement produced a result set.
    Cursor(ResultCursor<'s, 'c>),
}

impl<'s, 'c> Execution<'s, 'c> {
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Execution::RowsAffected(n) => Some(*n),
            Execution::Cursor(_) => None,
        }
    }

    pub fn into_cursor(self) -> Option<ResultCursor<'s, 'c>> {
        match self {
            Execution::Cursor(cursor) => Some(cursor),
            Execution::RowsAffected(_) => None,
        }
    }
}

/// A statement prepared once and executed any number of times.
pub struct PreparedStatement<'c> {
    statement: StatementHandle<'c>,
    sql: String,
    described: Vec<Option<ParamDescription>>,
    shapes: Vec<Option<NativeType>>,
    buffers: Option<BufferSet>,
    paramset_size: usize,
    registry: TypeRegistry,
    batch_size: usize,
    rebinds: usize,
}

impl std::fmt::Debug for PreparedStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("shapes", &self.shapes)
            .field("rebinds", &self.rebinds)
            .finish()
    }
}

impl<'c> PreparedStatement<'c> {
    /// Prepare `sql` and discover its parameters.
    pub(crate) fn new(
        conn: &'c ConnectionHandle,
        sql: &str,
        registry: TypeRegistry,
        batch_size: usize,
    ) -> Result<Self> {
        let mut statement = conn.alloc_statement()?;
        statement.prepare(sql)?;
        let count = statement.num_params()? as usize;

        let mut described = Vec::with_capacity(count);
        for number in 1..=count {
            match statement.describe_param(number as u16) {
                Ok(Some(desc)) => described.push(Some(desc)),
                Ok(None) => {
                    // unsupported by the driver: no point asking again
                    described.resize(count, None);
                    break;
                }
                Err(e) => {
                    debug!("describe_param {} failed, leaving the rest undescribed: {}", number, e);
                    described.resize(count, None);
                    break;
                }
            }
        }
        debug!(
            "prepared statement with {} parameters ({} described)",
            count,
            described.iter().filter(|d| d.is_some()).count()
        );

        Ok(Self {
            statement,
            sql: sql.to_string(),
            described,
            shapes: vec![None; count],
            buffers: None,
            paramset_size: 0,
            registry,
            batch_size,
            rebinds: 0,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of placeholders.
    pub fn param_count(&self) -> usize {
        self.shapes.len()
    }

    /// Parameter descriptions, `None` where the driver could not describe.
    pub fn param_descriptions(&self) -> &[Option<ParamDescription>] {
        &self.described
    }

    /// Native type currently bound at each placeholder.
    pub fn bound_shapes(&self) -> &[Option<NativeType>] {
        &self.shapes
    }

    /// How many times parameter buffers were (re)bound.
    pub fn rebind_count(&self) -> usize {
        self.rebinds
    }

    /// Execute with host values, one per placeholder.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use cli_columnar_rs::{Connection, ConnectTarget, MemoryDriver, Options};
    /// # use std::sync::Arc;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let conn = Connection::connect(Arc::new(MemoryDriver::new()), &ConnectTarget::dsn("memory"), Options::default())?;
    /// let mut insert = conn.prepare("INSERT INTO users VALUES (?, ?)")?;
    /// insert.execute(&[&1i32, &"alice"])?;
    /// insert.execute(&[&2i32, &Option::<&str>::None])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn execute(&mut self, params: &[&dyn ToParameter]) -> Result<Execution<'_, 'c>> {
        self.check_count(params.len())?;
        let values = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.to_value().ok_or(Error::UnsupportedParameterType {
                    index: i + 1,
                    type_name: p.type_name(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.execute_values(&values)
    }

    /// Execute with dynamic values, one per placeholder.
    pub fn execute_values(&mut self, values: &[Value]) -> Result<Execution<'_, 'c>> {
        self.check_count(values.len())?;
        self.bind_rows(&[values])?;
        self.run()
    }

    /// Execute once per row of `rows`, binding them as parameter arrays of
    /// up to `batch_size` sets per round trip. Returns the rows affected.
    pub fn execute_batch(&mut self, rows: &[Vec<Value>]) -> Result<u64> {
        for row in rows {
            self.check_count(row.len())?;
        }
        let mut affected = 0;
        for chunk in rows.chunks(self.batch_size.max(1)) {
            self.bind_rows(chunk)?;
            affected += self.run_batch()?;
        }
        debug!("executed {} parameter sets, {} rows affected", rows.len(), affected);
        Ok(affected)
    }

    /// Bulk load every batch of `source`. Each batch must have one column
    /// per placeholder. Returns the rows affected.
    pub fn load(&mut self, source: &mut dyn Source) -> Result<u64> {
        let mut affected = 0;
        while let Some(batch) = source.next_batch()? {
            self.check_count(batch.num_columns())?;
            let rows: Vec<Vec<Value>> = (0..batch.num_rows())
                .map(|r| {
                    batch
                        .columns()
                        .iter()
                        .map(|c| c.get(r).unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            affected += self.execute_batch(&rows)?;
        }
        Ok(affected)
    }

    fn check_count(&self, actual: usize) -> Result<()> {
        let expected = self.param_count();
        if actual != expected {
            return Err(Error::ParameterCountMismatch { expected, actual });
        }
        Ok(())
    }

    /// Shape a NULL-only parameter column takes.
    fn typeless_shape(&self, index: usize) -> NativeType {
        if let Some(shape) = self.shapes[index] {
            return shape;
        }
        if let Some(Some(desc)) = self.described.get(index) {
            let column = ColumnDescription {
                name: String::new(),
                data_type: desc.data_type,
                column_size: desc.parameter_size,
                decimal_digits: desc.decimal_digits,
                nullability: desc.nullability,
            };
            return self.registry.resolve(&column).native;
        }
        NativeType::Text {
            max_len: 1,
            wide: false,
            fixed: false,
        }
    }

    /// Native type needed to hold column `index` of every row.
    fn required_shape<R: AsRef<[Value]>>(&self, rows: &[R], index: usize) -> Result<NativeType> {
        let mut shape: Option<NativeType> = None;
        for row in rows {
            let value = &row.as_ref()[index];
            let Some(native) = self.registry.infer_parameter(value) else {
                continue;
            };
            shape = Some(match shape {
                None => native,
                Some(current) => unify(current, native).ok_or_else(|| {
                    Error::type_conversion(format!(
                        "Parameter {} mixes {} and {} values",
                        index + 1,
                        current,
                        native
                    ))
                })?,
            });
        }
        Ok(shape.unwrap_or_else(|| self.typeless_shape(index)))
    }

    /// Marshal `rows` into the parameter buffers, reshaping and rebinding
    /// only what no longer fits.
    fn bind_rows<R: AsRef<[Value]>>(&mut self, rows: &[R]) -> Result<()> {
        let count = self.param_count();
        if count == 0 {
            return Ok(());
        }
        let sets = rows.len().max(1);

        let mut shapes = Vec::with_capacity(count);
        for index in 0..count {
            let required = self.required_shape(rows, index)?;
            let shape = match self.shapes[index] {
                Some(current) if current.can_hold(&required) => current,
                Some(current) => grow(unify(current, required).unwrap_or(required)),
                None => grow(required),
            };
            shapes.push(shape);
        }

        match self.buffers.as_mut() {
            Some(buffers) => {
                if buffers.batch_size() < sets {
                    self.statement.reset_params()?;
                    buffers.rebind(sets)?;
                }
                for (index, shape) in shapes.iter().enumerate() {
                    if self.shapes[index] != Some(*shape) {
                        trace!(
                            "parameter {} reshaped from {:?} to {}",
                            index + 1,
                            self.shapes[index],
                            shape
                        );
                        buffers.reshape(index, *shape)?;
                    }
                }
            }
            None => {
                self.buffers = Some(BufferSet::allocate(&shapes, sets)?);
            }
        }
        for (slot, shape) in self.shapes.iter_mut().zip(&shapes) {
            *slot = Some(*shape);
        }

        let buffers = self
            .buffers
            .as_mut()
            .ok_or_else(|| Error::invalid_state("parameter buffers missing"))?;
        for (row_index, row) in rows.iter().enumerate() {
            for (index, value) in row.as_ref().iter().enumerate() {
                buffers.write(index, row_index, value)?;
            }
        }

        if buffers.needs_binding() {
            let bindings: Vec<ParameterBinding> = shapes
                .iter()
                .map(|shape| ParameterBinding {
                    c_type: shape.c_type(),
                    sql_type: shape.sql_type(),
                    column_size: shape.column_size(),
                    decimal_digits: shape.decimal_digits(),
                })
                .collect();
            self.statement.reset_params()?;
            buffers.bind_parameters(&self.statement, &bindings)?;
            self.rebinds += 1;
            debug!("bound {} parameter buffers for {} sets", count, buffers.batch_size());
        }
        if self.paramset_size != sets {
            self.statement.set_paramset_size(sets)?;
            self.paramset_size = sets;
        }
        Ok(())
    }

    /// Execute and hand out a cursor if the statement produced rows.
    fn run(&mut self) -> Result<Execution<'_, 'c>> {
        self.statement.execute()?;
        if self.statement.num_result_cols()? > 0 {
            let cursor = ResultCursor::new(
                StatementSlot::Borrowed(&mut self.statement),
                &self.registry,
                self.batch_size,
            )?;
            return Ok(Execution::Cursor(cursor));
        }
        let affected = self.statement.row_count()?.max(0) as u64;
        trace!("statement affected {} rows", affected);
        Ok(Execution::RowsAffected(affected))
    }

    /// Execute for its row count only, discarding any result set.
    fn run_batch(&mut self) -> Result<u64> {
        self.statement.execute()?;
        let affected = self.statement.row_count()?.max(0) as u64;
        if self.statement.num_result_cols()? > 0 {
            self.statement.close_cursor()?;
        }
        Ok(affected)
    }

    /// Release the parameter buffers and the statement. Closing twice is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.buffers.is_some() {
            self.statement.reset_params()?;
            self.buffers = None;
        }
        self.statement.close()
    }
}

impl Drop for PreparedStatement<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("error while dropping prepared statement: {}", e);
        }
    }
}

fn int_rank(native: &NativeType) -> Option<u8> {
    match native {
        NativeType::Bit => Some(0),
        NativeType::I8 => Some(1),
        NativeType::I16 => Some(2),
        NativeType::I32 => Some(3),
        NativeType::I64 => Some(4),
        _ => None,
    }
}

/// Smallest native type holding values of both `a` and `b`, if any.
fn unify(a: NativeType, b: NativeType) -> Option<NativeType> {
    if a.can_hold(&b) {
        return Some(a);
    }
    if b.can_hold(&a) {
        return Some(b);
    }
    match (a, b) {
        (
            NativeType::Decimal {
                precision: p1,
                scale: s1,
            },
            NativeType::Decimal {
                precision: p2,
                scale: s2,
            },
        ) => {
            let scale = s1.max(s2);
            let integer = p1
                .saturating_sub(s1 as usize)
                .max(p2.saturating_sub(s2 as usize));
            Some(NativeType::Decimal {
                precision: integer + scale as usize,
                scale,
            })
        }
        (NativeType::Timestamp { precision: x }, NativeType::Timestamp { precision: y }) => {
            Some(NativeType::Timestamp {
                precision: x.max(y),
            })
        }
        (NativeType::Timestamp { .. }, NativeType::Date) => Some(a),
        (NativeType::Date, NativeType::Timestamp { .. }) => Some(b),
        _ => match (int_rank(&a), int_rank(&b)) {
            (Some(x), Some(y)) => Some(if x >= y { a } else { b }),
            _ if is_numeric(&a) && is_numeric(&b) => Some(NativeType::F64),
            _ => None,
        },
    }
}

fn is_numeric(native: &NativeType) -> bool {
    int_rank(native).is_some() || matches!(native, NativeType::F32 | NativeType::F64)
}

/// Round variable capacities up so slightly longer values reuse the buffer.
fn grow(native: NativeType) -> NativeType {
    let round = |n: usize| n.max(MIN_VARIABLE_CAPACITY).next_power_of_two();
    match native {
        NativeType::Text {
            max_len,
            wide,
            fixed,
        } => NativeType::Text {
            max_len: round(max_len),
            wide,
            fixed,
        },
        NativeType::VarBinary { max_len } => NativeType::VarBinary {
            max_len: round(max_len),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::driver::scripted::ScriptedDriver;
    use crate::error::Diagnostic;
    use crate::handle::Environment;

    fn text(max_len: usize) -> NativeType {
        NativeType::Text {
            max_len,
            wide: false,
            fixed: false,
        }
    }

    #[test]
    fn test_describe_param_failure_still_prepares() {
        let driver = Arc::new(
            ScriptedDriver::new()
                .with_describe_param_error(Diagnostic::new("HY000", 0, "General error")),
        );
        let env = Environment::new(driver.clone()).unwrap();
        let conn = ConnectionHandle::connect(&env, "DSN=memory").unwrap();
        let mut stmt = conn.alloc_statement().unwrap();
        stmt.exec_direct("CREATE TABLE t (a INT, b VARCHAR(10))").unwrap();
        drop(stmt);

        let mut insert =
            PreparedStatement::new(&conn, "INSERT INTO t VALUES (?, ?)", TypeRegistry::default(), 8)
                .unwrap();
        assert_eq!(insert.param_descriptions().len(), 2);
        assert!(insert.param_descriptions().iter().all(Option::is_none));
        let affected = insert
            .execute_values(&[Value::I32(1), Value::Null])
            .unwrap()
            .rows_affected();
        assert_eq!(affected, Some(1));
    }

    #[test]
    fn test_grow_rounds_variable_capacity() {
        assert_eq!(grow(text(3)), text(32));
        assert_eq!(grow(text(33)), text(64));
        assert_eq!(
            grow(NativeType::VarBinary { max_len: 0 }),
            NativeType::VarBinary { max_len: 32 }
        );
        assert_eq!(grow(NativeType::I32), NativeType::I32);
    }

    #[test]
    fn test_unify() {
        assert_eq!(unify(NativeType::I16, NativeType::I64), Some(NativeType::I64));
        assert_eq!(unify(NativeType::I32, NativeType::F32), Some(NativeType::F64));
        assert_eq!(unify(text(5), text(9)), Some(text(9)));
        assert_eq!(
            unify(
                NativeType::Decimal {
                    precision: 5,
                    scale: 2
                },
                NativeType::Decimal {
                    precision: 6,
                    scale: 0
                }
            ),
            Some(NativeType::Decimal {
                precision: 8,
                scale: 2
            })
        );
        assert_eq!(unify(NativeType::Date, text(3)), None);
    }
}
