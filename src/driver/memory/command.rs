//! Statement recognizer and evaluator for the in-memory driver.
//!
//! Understands exactly these shapes:
//! - `CREATE TABLE name (col TYPE[(n[, m])] [NOT NULL | NULL | PRIMARY KEY], ...)`
//! - `DROP TABLE [IF EXISTS] name`
//! - `INSERT INTO name [(cols)] VALUES (exprs)[, (exprs)...] [RETURNING cols | *]`
//! - `DELETE FROM name`
//! - `SELECT cols | * FROM name`
//!
//! Expressions are `?` placeholders or literals: numbers, `'text'`,
//! `X'hex'`, `NULL`, `TRUE`, `FALSE`, `DATE '...'`, `TIME '...'` and
//! `TIMESTAMP '...'`.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::store::{column_def, Cell, ColumnDef, ResultSet, Store};
use crate::error::Diagnostic;
use crate::types::value::parse_decimal;
use crate::types::{ColumnDescription, ParamDescription};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Number(String),
    Text(String),
    Hex(Vec<u8>),
    Param,
    LParen,
    RParen,
    Comma,
    Star,
    Minus,
}

fn syntax(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new("42000", 102, format!("Syntax error: {}", message.into()))
}

fn tokenize(sql: &str) -> Result<Vec<Token>, Diagnostic> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            ';' if chars[i + 1..].iter().all(|c| c.is_whitespace()) => break,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Param);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, '\'')?;
                tokens.push(Token::Text(text));
                i = next;
            }
            '"' => {
                let (text, next) = read_quoted(&chars, i, '"')?;
                tokens.push(Token::Quoted(text));
                i = next;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                if (c == 'X' || c == 'x') && chars.get(i + 1) == Some(&'\'') {
                    let (hex, next) = read_quoted(&chars, i + 1, '\'')?;
                    tokens.push(Token::Hex(decode_hex(&hex)?));
                    i = next;
                    continue;
                }
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(syntax(format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

/// Read a quoted run starting at `start`; a doubled quote escapes itself.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), Diagnostic> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(chars[i]);
        i += 1;
    }
    Err(syntax("unterminated quoted string"))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, Diagnostic> {
    if hex.len() % 2 != 0 {
        return Err(syntax("hex literal needs an even number of digits"));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| syntax("invalid hex literal"))
        })
        .collect()
}

/// A value expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// Placeholder, 0-based in statement order.
    Param(usize),
    Literal(Cell),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    All,
    Columns(Vec<String>),
}

/// A recognized statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
        returning: Option<Projection>,
    },
    Delete {
        table: String,
    },
    Select {
        table: String,
        projection: Projection,
    },
}

/// Result of running a command.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub row_count: isize,
    pub result: Option<ResultSet>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), Diagnostic> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(syntax(format!("expected {}", keyword)))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), Diagnostic> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(syntax(format!("expected {:?}", token)))
        }
    }

    fn identifier(&mut self) -> Result<String, Diagnostic> {
        match self.next() {
            Some(Token::Word(w)) | Some(Token::Quoted(w)) => Ok(w),
            other => Err(syntax(format!("expected identifier, found {:?}", other))),
        }
    }

    fn identifier_list(&mut self) -> Result<Vec<String>, Diagnostic> {
        let mut names = vec![self.identifier()?];
        while self.eat(&Token::Comma) {
            names.push(self.identifier()?);
        }
        Ok(names)
    }

    fn projection(&mut self) -> Result<Projection, Diagnostic> {
        if self.eat(&Token::Star) {
            Ok(Projection::All)
        } else {
            Ok(Projection::Columns(self.identifier_list()?))
        }
    }

    fn finish(&self) -> Result<(), Diagnostic> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(syntax(format!("unexpected {:?}", token))),
        }
    }

    fn command(&mut self) -> Result<Command, Diagnostic> {
        let command = if self.eat_keyword("CREATE") {
            self.expect_keyword("TABLE")?;
            self.create_table()?
        } else if self.eat_keyword("DROP") {
            self.expect_keyword("TABLE")?;
            let if_exists = if self.eat_keyword("IF") {
                self.expect_keyword("EXISTS")?;
                true
            } else {
                false
            };
            Command::DropTable {
                name: self.identifier()?,
                if_exists,
            }
        } else if self.eat_keyword("INSERT") {
            self.expect_keyword("INTO")?;
            self.insert()?
        } else if self.eat_keyword("DELETE") {
            self.expect_keyword("FROM")?;
            Command::Delete {
                table: self.identifier()?,
            }
        } else if self.eat_keyword("SELECT") {
            let projection = self.projection()?;
            self.expect_keyword("FROM")?;
            Command::Select {
                table: self.identifier()?,
                projection,
            }
        } else {
            return Err(syntax(format!("unsupported statement starting at {:?}", self.peek())));
        };
        self.finish()?;
        Ok(command)
    }

    fn create_table(&mut self) -> Result<Command, Diagnostic> {
        let name = self.identifier()?;
        self.expect(Token::LParen)?;
        let mut columns = Vec::new();
        loop {
            let column = self.identifier()?;
            let mut type_name = self.identifier()?;
            if type_name.eq_ignore_ascii_case("DOUBLE") {
                self.eat_keyword("PRECISION");
            }
            if type_name.eq_ignore_ascii_case("CHARACTER") && self.eat_keyword("VARYING") {
                type_name = "VARCHAR".to_string();
            }
            let mut args = Vec::new();
            if self.eat(&Token::LParen) {
                loop {
                    match self.next() {
                        Some(Token::Number(n)) => args.push(Some(
                            n.parse::<usize>()
                                .map_err(|_| syntax(format!("invalid type argument {}", n)))?,
                        )),
                        Some(Token::Word(w)) if w.eq_ignore_ascii_case("MAX") => args.push(None),
                        other => return Err(syntax(format!("invalid type argument {:?}", other))),
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
            }
            let mut nullable = true;
            loop {
                if self.eat_keyword("NOT") {
                    self.expect_keyword("NULL")?;
                    nullable = false;
                } else if self.eat_keyword("NULL") {
                    nullable = true;
                } else if self.eat_keyword("PRIMARY") {
                    self.expect_keyword("KEY")?;
                    nullable = false;
                } else {
                    break;
                }
            }
            columns.push(column_def(column, &type_name, &args, nullable)?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(Command::CreateTable { name, columns })
    }

    fn insert(&mut self) -> Result<Command, Diagnostic> {
        let table = self.identifier()?;
        let columns = if self.eat(&Token::LParen) {
            let names = self.identifier_list()?;
            self.expect(Token::RParen)?;
            Some(names)
        } else {
            None
        };
        self.expect_keyword("VALUES")?;
        let mut rows = Vec::new();
        loop {
            self.expect(Token::LParen)?;
            let mut row = vec![self.expr()?];
            while self.eat(&Token::Comma) {
                row.push(self.expr()?);
            }
            self.expect(Token::RParen)?;
            rows.push(row);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let returning = if self.eat_keyword("RETURNING") {
            Some(self.projection()?)
        } else {
            None
        };
        Ok(Command::Insert {
            table,
            columns,
            rows,
            returning,
        })
    }

    fn expr(&mut self) -> Result<Expr, Diagnostic> {
        let negative = self.eat(&Token::Minus);
        let token = self.next();
        let cell = match token {
            Some(Token::Param) if !negative => {
                self.params += 1;
                return Ok(Expr::Param(self.params - 1));
            }
            Some(Token::Number(n)) => number(&n, negative)?,
            _ if negative => return Err(syntax("expected number after '-'")),
            Some(Token::Text(s)) => Cell::Text(s),
            Some(Token::Hex(b)) => Cell::Bytes(Bytes::from(b)),
            Some(Token::Word(w)) => match w.to_ascii_uppercase().as_str() {
                "NULL" => Cell::Null,
                "TRUE" => Cell::Bool(true),
                "FALSE" => Cell::Bool(false),
                "DATE" => Cell::Date(
                    NaiveDate::parse_from_str(&self.typed_literal()?, "%Y-%m-%d")
                        .map_err(|_| syntax("invalid DATE literal"))?,
                ),
                "TIME" => Cell::Time(
                    NaiveTime::parse_from_str(&self.typed_literal()?, "%H:%M:%S%.f")
                        .map_err(|_| syntax("invalid TIME literal"))?,
                ),
                "TIMESTAMP" => Cell::Timestamp(
                    NaiveDateTime::parse_from_str(&self.typed_literal()?, "%Y-%m-%d %H:%M:%S%.f")
                        .map_err(|_| syntax("invalid TIMESTAMP literal"))?,
                ),
                other => return Err(syntax(format!("unexpected word {}", other))),
            },
            other => return Err(syntax(format!("expected expression, found {:?}", other))),
        };
        Ok(Expr::Literal(cell))
    }

    fn typed_literal(&mut self) -> Result<String, Diagnostic> {
        match self.next() {
            Some(Token::Text(s)) => Ok(s),
            other => Err(syntax(format!("expected string literal, found {:?}", other))),
        }
    }
}

fn number(text: &str, negative: bool) -> Result<Cell, Diagnostic> {
    let signed = if negative {
        format!("-{}", text)
    } else {
        text.to_string()
    };
    if !signed.contains('.') {
        if let Ok(n) = signed.parse::<i64>() {
            return Ok(Cell::Int(n));
        }
    }
    parse_decimal(&signed)
        .map(Cell::Decimal)
        .map_err(|_| syntax(format!("invalid number {}", signed)))
}

/// A parsed statement with its placeholder count.
#[derive(Debug, Clone)]
pub(crate) struct Parsed {
    pub command: Command,
    pub param_count: usize,
}

/// Parse one statement.
pub(crate) fn parse(sql: &str) -> Result<Parsed, Diagnostic> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        pos: 0,
        params: 0,
    };
    let command = parser.command()?;
    Ok(Parsed {
        command,
        param_count: parser.params,
    })
}

fn project(table_columns: &[ColumnDef], projection: &Projection) -> Result<Vec<usize>, Diagnostic> {
    match projection {
        Projection::All => Ok((0..table_columns.len()).collect()),
        Projection::Columns(names) => names
            .iter()
            .map(|name| {
                table_columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| {
                        Diagnostic::new("42S22", 207, format!("Invalid column name '{}'", name))
                    })
            })
            .collect(),
    }
}

fn describe(table_columns: &[ColumnDef], indexes: &[usize]) -> Vec<ColumnDescription> {
    indexes.iter().map(|i| table_columns[*i].describe()).collect()
}

impl Parsed {
    /// Describe placeholder `index` (0-based) from the INSERT target column.
    pub(crate) fn describe_param(&self, store: &Store, index: usize) -> Result<ParamDescription, Diagnostic> {
        let Command::Insert {
            table,
            columns,
            rows,
            ..
        } = &self.command
        else {
            return Err(Diagnostic::new("HYC00", 0, "Parameter description not available"));
        };
        let table = store.table(table)?;
        for row in rows {
            for (position, expr) in row.iter().enumerate() {
                if *expr != Expr::Param(index) {
                    continue;
                }
                let column = match columns {
                    Some(names) => match names.get(position) {
                        Some(name) => table.column_index(name)?,
                        None => break,
                    },
                    None => position,
                };
                if let Some(def) = table.columns.get(column) {
                    return Ok(def.describe_param());
                }
            }
        }
        Err(Diagnostic::new("07009", 0, format!("Invalid descriptor index {}", index + 1)))
    }

    /// Run against `store` once per parameter set.
    ///
    /// INSERT is atomic over all sets: nothing is stored if any row fails.
    pub(crate) fn run(&self, store: &mut Store, param_sets: &[Vec<Cell>]) -> Result<Outcome, Diagnostic> {
        match &self.command {
            Command::CreateTable { name, columns } => {
                store.create_table(name, columns.clone())?;
                Ok(Outcome::default())
            }
            Command::DropTable { name, if_exists } => {
                store.drop_table(name, *if_exists)?;
                Ok(Outcome::default())
            }
            Command::Delete { table } => {
                let table = store.table_mut(table)?;
                let removed = table.rows.len();
                table.rows.clear();
                Ok(Outcome {
                    row_count: removed as isize,
                    result: None,
                })
            }
            Command::Select { table, projection } => {
                let table = store.table(table)?;
                let indexes = project(&table.columns, projection)?;
                let rows = table
                    .rows
                    .iter()
                    .map(|row| indexes.iter().map(|i| row[*i].clone()).collect())
                    .collect();
                Ok(Outcome {
                    row_count: -1,
                    result: Some(ResultSet {
                        columns: describe(&table.columns, &indexes),
                        rows,
                    }),
                })
            }
            Command::Insert {
                table,
                columns,
                rows,
                returning,
            } => {
                let target = store.table_mut(table)?;
                let positions: Vec<usize> = match columns {
                    Some(names) => names
                        .iter()
                        .map(|n| target.column_index(n))
                        .collect::<Result<_, _>>()?,
                    None => (0..target.columns.len()).collect(),
                };
                let empty = Vec::new();
                let sets: Vec<&Vec<Cell>> = if param_sets.is_empty() {
                    vec![&empty]
                } else {
                    param_sets.iter().collect()
                };
                let mut staged = Vec::with_capacity(sets.len() * rows.len());
                for params in sets {
                    for exprs in rows {
                        if exprs.len() != positions.len() {
                            return Err(Diagnostic::new(
                                "21S01",
                                213,
                                "Insert value list does not match column list",
                            ));
                        }
                        let mut row = vec![Cell::Null; target.columns.len()];
                        for (expr, position) in exprs.iter().zip(&positions) {
                            row[*position] = match expr {
                                Expr::Literal(cell) => cell.clone(),
                                Expr::Param(i) => params.get(*i).cloned().ok_or_else(|| {
                                    Diagnostic::new("07002", 0, "COUNT field incorrect")
                                })?,
                            };
                        }
                        let row = row
                            .into_iter()
                            .zip(&target.columns)
                            .map(|(cell, def)| def.coerce(cell))
                            .collect::<Result<Vec<_>, _>>()?;
                        staged.push(row);
                    }
                }
                let inserted = staged.len();
                let result = match returning {
                    Some(projection) => {
                        let indexes = project(&target.columns, projection)?;
                        let rows = staged
                            .iter()
                            .map(|row| indexes.iter().map(|i| row[*i].clone()).collect())
                            .collect();
                        Some(ResultSet {
                            columns: describe(&target.columns, &indexes),
                            rows,
                        })
                    }
                    None => None,
                };
                target.rows.extend(staged);
                Ok(Outcome {
                    row_count: inserted as isize,
                    result,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlDataType;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_parse_create_table() {
        let parsed =
            parse("CREATE TABLE t (id BIGINT NOT NULL, amount DECIMAL(5, 1), note VARCHAR(MAX))")
                .unwrap();
        let Command::CreateTable { name, columns } = parsed.command else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(name, "t");
        assert_eq!(columns.len(), 3);
        assert!(!columns[0].nullable);
        assert_eq!(columns[1].digits, 1);
        assert_eq!(columns[2].sql_type, SqlDataType::LONGVARCHAR);
    }

    #[test]
    fn test_parse_insert_counts_placeholders() {
        let parsed = parse("INSERT INTO t (a, b) VALUES (?, 'it''s'), (-1.5, ?) RETURNING *;").unwrap();
        assert_eq!(parsed.param_count, 2);
        let Command::Insert { rows, returning, .. } = parsed.command else {
            panic!("expected INSERT");
        };
        assert_eq!(rows[0][0], Expr::Param(0));
        assert_eq!(rows[0][1], Expr::Literal(Cell::Text("it's".into())));
        assert_eq!(
            rows[1][0],
            Expr::Literal(Cell::Decimal(Decimal::from_str("-1.5").unwrap()))
        );
        assert_eq!(rows[1][1], Expr::Param(1));
        assert_eq!(returning, Some(Projection::All));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("UPDATE t SET a = 1").unwrap_err().state, "42000");
        assert_eq!(parse("SELECT FROM t").unwrap_err().state, "42000");
        assert_eq!(parse("INSERT INTO t VALUES ('open").unwrap_err().state, "42000");
    }

    #[test]
    fn test_run_insert_and_select() {
        let mut store = Store::default();
        parse("CREATE TABLE t (id INT NOT NULL, name VARCHAR(10))")
            .unwrap()
            .run(&mut store, &[])
            .unwrap();
        let insert = parse("INSERT INTO t VALUES (?, ?)").unwrap();
        let outcome = insert
            .run(
                &mut store,
                &[
                    vec![Cell::Int(1), Cell::Text("a".into())],
                    vec![Cell::Int(2), Cell::Null],
                ],
            )
            .unwrap();
        assert_eq!(outcome.row_count, 2);

        let select = parse("SELECT name, id FROM t").unwrap().run(&mut store, &[]).unwrap();
        let result = select.result.unwrap();
        assert_eq!(result.columns[0].name, "name");
        assert_eq!(result.rows[1], vec![Cell::Null, Cell::Int(2)]);
    }

    #[test]
    fn test_insert_is_atomic() {
        let mut store = Store::default();
        parse("CREATE TABLE t (id INT NOT NULL)").unwrap().run(&mut store, &[]).unwrap();
        let err = parse("INSERT INTO t VALUES (?)")
            .unwrap()
            .run(&mut store, &[vec![Cell::Int(1)], vec![Cell::Null]])
            .unwrap_err();
        assert_eq!(err.state, "23000");
        assert!(store.table("t").unwrap().rows.is_empty());
    }

    #[test]
    fn test_describe_param() {
        let mut store = Store::default();
        parse("CREATE TABLE t (id INT, amount DECIMAL(10, 2))")
            .unwrap()
            .run(&mut store, &[])
            .unwrap();
        let parsed = parse("INSERT INTO t (amount, id) VALUES (?, ?)").unwrap();
        let desc = parsed.describe_param(&store, 0).unwrap();
        assert_eq!(desc.data_type, SqlDataType::DECIMAL);
        assert_eq!(desc.decimal_digits, 2);
        assert_eq!(
            parsed.describe_param(&store, 1).unwrap().data_type,
            SqlDataType::INTEGER
        );
        assert_eq!(parsed.describe_param(&store, 2).unwrap_err().state, "07009");
    }
}
