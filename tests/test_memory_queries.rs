//! Integration tests for queries and bulk loads against the in-memory driver.
//!
//! Run with: cargo test --test test_memory_queries

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use cli_columnar_rs::{
    BatchSource, ColumnBatch, ColumnData, Connection, ConnectTarget, Cursor, MemoryDriver,
    MemorySink, Options, Value,
};
use rust_decimal::Decimal;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn connect(driver: &Arc<MemoryDriver>, options: Options) -> Connection {
    init_logging();
    Connection::connect(driver.clone(), &ConnectTarget::dsn("memory"), options)
        .expect("memory data source should accept the connection")
}

fn values(conn: &Connection, sql: &str) -> Vec<Vec<Value>> {
    conn.query(sql)
        .unwrap()
        .rows()
        .map(|row| row.into_values())
        .collect()
}

#[test]
fn test_decimal_and_text_round_trip() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE greetings (a DECIMAL(5, 1), b VARCHAR(50))")
        .unwrap();
    let mut insert = conn.prepare("INSERT INTO greetings VALUES (?, ?)").unwrap();
    assert_eq!(insert.param_count(), 2);
    let affected = insert
        .execute(&[&Decimal::new(10, 1), &"hey there sailor"])
        .unwrap()
        .rows_affected();
    assert_eq!(affected, Some(1));
    drop(insert);

    let result = conn.query("SELECT * FROM greetings").unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.column_names(), vec!["a", "b"]);

    let row = result.row(0).unwrap();
    match row.get(0) {
        Some(Value::Decimal(d)) => {
            assert_eq!(d, Decimal::from_str("1.0").unwrap());
            assert_eq!(d.to_string(), "1.0");
        }
        other => panic!("Expected Decimal, got {:?}", other),
    }
    assert_eq!(
        row.get_by_name("B"),
        Some(Value::Text("hey there sailor".to_string()))
    );
    assert_eq!(row.text(1), Some("hey there sailor"));
}

#[test]
fn test_prepared_inserts_keep_order() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE users (id INT NOT NULL, name VARCHAR(20))")
        .unwrap();
    let mut insert = conn.prepare("INSERT INTO users VALUES (?, ?)").unwrap();
    insert.execute(&[&1i32, &"alice"]).unwrap();
    insert.execute(&[&2i32, &"bob"]).unwrap();
    insert.close().unwrap();
    insert.close().unwrap();
    drop(insert);

    let rows = values(&conn, "SELECT id, name FROM users");
    assert_eq!(
        rows,
        vec![
            vec![Value::I32(1), Value::Text("alice".to_string())],
            vec![Value::I32(2), Value::Text("bob".to_string())],
        ]
    );
}

#[test]
fn test_bulk_load_seventy_thousand_rows() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default().with_batch_size(100));

    conn.execute("CREATE TABLE numbers (k BIGINT NOT NULL, label VARCHAR(16))")
        .unwrap();
    let rows: Vec<Vec<Value>> = (1..=70_000i64)
        .map(|k| vec![Value::I64(k), Value::Text(format!("n{}", k))])
        .collect();
    let mut insert = conn.prepare("INSERT INTO numbers VALUES (?, ?)").unwrap();
    assert_eq!(insert.execute_batch(&rows).unwrap(), 70_000);
    drop(insert);

    let result = conn.query("SELECT k, label FROM numbers").unwrap();
    assert_eq!(result.len(), 70_000);
    assert_eq!(result.batches, 700);
    match result.column("k") {
        Some(ColumnData::I64(keys)) => {
            let expected: Vec<Option<i64>> = (1..=70_000).map(Some).collect();
            assert_eq!(keys, &expected);
        }
        other => panic!("Expected BIGINT column, got {:?}", other),
    }
    assert_eq!(
        result.row(69_999).unwrap().text(1),
        Some("n70000")
    );
}

#[test]
fn test_null_and_empty_varbinary_are_distinct() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE blobs (id INT, payload VARBINARY(16))")
        .unwrap();
    conn.execute("INSERT INTO blobs VALUES (1, NULL), (2, X''), (3, X'DEADBEEF')")
        .unwrap();

    let result = conn.query("SELECT payload FROM blobs").unwrap();
    match result.column("payload") {
        Some(ColumnData::Binary(cells)) => {
            assert_eq!(cells[0], None);
            assert_eq!(cells[1], Some(Vec::new()));
            assert_eq!(cells[2], Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        }
        other => panic!("Expected binary column, got {:?}", other),
    }
    assert!(result.column("payload").unwrap().is_null(0));
    assert!(!result.column("payload").unwrap().is_null(1));
}

#[test]
fn test_every_native_type_round_trips() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute(
        "CREATE TABLE everything (\
         flag BIT, tiny TINYINT, small SMALLINT, medium INT, big BIGINT, \
         single REAL, wide DOUBLE, amount DECIMAL(12, 3), code CHAR(3), \
         note VARCHAR(40), unicode NVARCHAR(20), fixed BINARY(4), blob VARBINARY(32), \
         day DATE, clock TIME, moment TIMESTAMP(6))",
    )
    .unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let clock = NaiveTime::from_hms_opt(23, 59, 58).unwrap();
    let moment = NaiveDateTime::new(day, NaiveTime::from_hms_micro_opt(12, 30, 15, 250_000).unwrap());
    let full = vec![
        Value::Bool(true),
        Value::I8(-7),
        Value::I16(-32_000),
        Value::I32(2_000_000_000),
        Value::I64(-9_000_000_000_000),
        Value::F32(1.5),
        Value::F64(-2.25e10),
        Value::Decimal(Decimal::from_str("-123456789.125").unwrap()),
        Value::Text("abc".to_string()),
        Value::Text("plain ascii".to_string()),
        Value::Text("héllo wörld ✓".to_string()),
        Value::Binary(vec![1, 2, 3, 4]),
        Value::Binary(vec![0, 255, 0, 255, 7]),
        Value::Date(day),
        Value::Time(clock),
        Value::Timestamp(moment),
    ];
    let nulls = vec![Value::Null; full.len()];

    let placeholders = vec!["?"; full.len()].join(", ");
    let mut insert = conn
        .prepare(&format!("INSERT INTO everything VALUES ({})", placeholders))
        .unwrap();
    insert.execute_values(&full).unwrap();
    insert.execute_values(&nulls).unwrap();
    drop(insert);

    let rows = values(&conn, "SELECT * FROM everything");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], full);
    assert_eq!(rows[1], nulls);
}

#[test]
fn test_results_do_not_depend_on_batch_size() {
    let driver = Arc::new(MemoryDriver::new());
    let mut conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE samples (id INT, note VARCHAR(MAX), amount DECIMAL(8, 2))")
        .unwrap();
    let rows: Vec<Vec<Value>> = (0..37)
        .map(|i| {
            vec![
                Value::I32(i),
                if i % 5 == 0 {
                    Value::Null
                } else {
                    Value::Text("x".repeat(i as usize * 3))
                },
                Value::Decimal(Decimal::new(i as i64 * 101, 2)),
            ]
        })
        .collect();
    let mut insert = conn.prepare("INSERT INTO samples VALUES (?, ?, ?)").unwrap();
    insert.execute_batch(&rows).unwrap();
    drop(insert);

    let reference = values(&conn, "SELECT * FROM samples");
    assert_eq!(reference, rows);
    for batch_size in [1, 2, 7, 36, 37, 38, 1000] {
        conn.set_options(Options::default().with_batch_size(batch_size))
            .unwrap();
        let result = conn.query("SELECT * FROM samples").unwrap();
        assert_eq!(result.batches, 37usize.div_ceil(batch_size));
        let fetched: Vec<Vec<Value>> = result.rows().map(|r| r.into_values()).collect();
        assert_eq!(fetched, reference, "batch size {}", batch_size);
    }
}

#[test]
fn test_oversized_cells_are_recovered_in_full() {
    for driver in [MemoryDriver::new(), MemoryDriver::new().with_no_total()] {
        let driver = Arc::new(driver);
        let options = Options::default()
            .with_max_text_size(8)
            .with_max_binary_size(4)
            .with_batch_size(2);
        let conn = connect(&driver, options);

        conn.execute("CREATE TABLE docs (body VARCHAR(20000), wbody NVARCHAR(300), raw VARBINARY(9000))")
            .unwrap();
        let long_text: String = (0..10_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let wide_text = "ünïcødé ".repeat(30);
        let raw: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();
        let rows = vec![
            vec![
                Value::Text(long_text.clone()),
                Value::Text(wide_text.clone()),
                Value::Binary(raw.clone()),
            ],
            vec![
                Value::Text("short".to_string()),
                Value::Text("ok".to_string()),
                Value::Binary(vec![1]),
            ],
            vec![Value::Null, Value::Null, Value::Null],
        ];
        let mut insert = conn.prepare("INSERT INTO docs VALUES (?, ?, ?)").unwrap();
        insert.execute_batch(&rows).unwrap();
        drop(insert);

        let fetched = values(&conn, "SELECT * FROM docs");
        assert_eq!(fetched, rows);
    }
}

#[test]
fn test_cursor_streams_batches() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default().with_batch_size(4));

    conn.execute("CREATE TABLE t (id INT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1), (2), (3), (4), (5), (6), (7), (8), (9), (10)")
        .unwrap();

    let mut cursor = conn.open_cursor("SELECT id FROM t").unwrap();
    assert_eq!(cursor.columns().len(), 1);
    assert!(cursor.has_more());
    let first = cursor.next().unwrap().unwrap();
    assert_eq!(first.num_rows(), 4);

    cursor.set_fetch_size(5).unwrap();
    assert!(cursor.set_fetch_size(0).is_err());
    let second = cursor.next().unwrap().unwrap();
    assert_eq!(second.num_rows(), 5);

    let rest = cursor.fetch_all().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].column(0), Some(&ColumnData::I32(vec![Some(10)])));
    assert_eq!(cursor.rowcount(), 10);
    assert!(cursor.is_closed());
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn test_row_cursor_and_views() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default().with_batch_size(2));

    conn.execute("CREATE TABLE people (name VARCHAR(10), age SMALLINT)")
        .unwrap();
    conn.execute("INSERT INTO people VALUES ('ann', 31), ('bo', NULL), ('cy', 12)")
        .unwrap();

    let mut cursor = conn.open_cursor("SELECT * FROM people").unwrap();
    {
        let view = cursor.next_view().unwrap().unwrap();
        assert_eq!(view.num_rows(), 2);
        assert_eq!(view.text(0, 0).unwrap().as_deref(), Some("ann"));
        assert!(view.is_null(1, 1).unwrap());
        assert_eq!(view.value(1, 0).unwrap(), Value::I16(31));
        assert!(view.value(2, 0).is_err());
    }
    cursor.close().unwrap();

    let cursor = conn.open_cursor("SELECT * FROM people").unwrap();
    let mut rows = cursor.into_rows();
    let mut names = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        names.push(row.text(0).map(str::to_string));
    }
    assert_eq!(
        names,
        vec![Some("ann".into()), Some("bo".into()), Some("cy".into())]
    );
    assert_eq!(rows.rowcount(), 3);
}

#[test]
fn test_closing_twice_is_harmless() {
    let driver = Arc::new(MemoryDriver::new());
    let mut conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE t (id INT)").unwrap();
    {
        let mut cursor = conn.open_cursor("SELECT * FROM t").unwrap();
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert!(cursor.is_closed());
    }
    conn.close().unwrap();
    conn.close().unwrap();
    assert!(conn.is_closed());
    assert!(conn.execute("SELECT * FROM t").is_err());
}

#[test]
fn test_handles_are_released() {
    let driver = Arc::new(MemoryDriver::new());
    {
        let conn = connect(&driver, Options::default());
        conn.execute("CREATE TABLE t (id INT, note VARCHAR(10))").unwrap();
        let mut insert = conn.prepare("INSERT INTO t VALUES (?, ?)").unwrap();
        insert.execute(&[&1i32, &"one"]).unwrap();

        let mut cursor = conn.open_cursor("SELECT * FROM t").unwrap();
        assert_eq!(driver.open_statement_count(), 2);
        cursor.next().unwrap();
        drop(cursor);
        drop(insert);
        assert_eq!(driver.open_statement_count(), 0);
        assert!(driver.open_handle_count() >= 2);
    }
    assert_eq!(driver.open_handle_count(), 0);
}

#[test]
fn test_typeless_null_parameters() {
    let driver = Arc::new(MemoryDriver::new().without_describe_param());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE notes (id INT, note VARCHAR(100))").unwrap();
    let mut insert = conn.prepare("INSERT INTO notes VALUES (?, ?)").unwrap();
    assert!(insert.param_descriptions().iter().all(Option::is_none));

    insert.execute(&[&1i32, &Option::<String>::None]).unwrap();
    insert
        .execute(&[&2i32, &"now with a value that is long enough to need a bigger buffer"])
        .unwrap();
    insert.execute(&[&3i32, &Option::<String>::None]).unwrap();
    drop(insert);

    let rows = values(&conn, "SELECT note FROM notes");
    assert_eq!(
        rows,
        vec![
            vec![Value::Null],
            vec![Value::Text(
                "now with a value that is long enough to need a bigger buffer".to_string()
            )],
            vec![Value::Null],
        ]
    );
}

#[test]
fn test_parameter_buffers_are_reused() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE t (id INT, note VARCHAR(200))").unwrap();
    let mut insert = conn.prepare("INSERT INTO t VALUES (?, ?)").unwrap();
    insert.execute(&[&1i32, &"a"]).unwrap();
    insert.execute(&[&2i32, &"bb"]).unwrap();
    insert.execute(&[&3i32, &"ccc"]).unwrap();
    assert_eq!(insert.rebind_count(), 1);

    insert.execute(&[&4i32, &"d".repeat(100)]).unwrap();
    assert_eq!(insert.rebind_count(), 2);
    insert.execute(&[&5i32, &"e"]).unwrap();
    assert_eq!(insert.rebind_count(), 2);
    drop(insert);

    assert_eq!(conn.query("SELECT * FROM t").unwrap().len(), 5);
}

#[test]
fn test_prepared_select_returns_cursor() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE t (id INT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1), (2)").unwrap();

    let mut select = conn.prepare("SELECT id FROM t").unwrap();
    for _ in 0..2 {
        let execution = select.execute(&[]).unwrap();
        assert_eq!(execution.rows_affected(), None);
        let mut cursor = execution.into_cursor().unwrap();
        let batches = cursor.fetch_all().unwrap();
        assert_eq!(batches[0].num_rows(), 2);
    }
}

#[test]
fn test_sink_and_source() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default().with_batch_size(3));

    conn.execute("CREATE TABLE src (id INT, name VARCHAR(10))").unwrap();
    conn.execute("CREATE TABLE dst (id INT, name VARCHAR(10))").unwrap();
    conn.execute("INSERT INTO src VALUES (1, 'a'), (2, NULL), (3, 'c'), (4, 'd')")
        .unwrap();

    let mut sink = MemorySink::new();
    let mut cursor = conn.open_cursor("SELECT * FROM src").unwrap();
    assert_eq!(cursor.write_to(&mut sink, false).unwrap(), 4);
    drop(cursor);
    assert_eq!(sink.batches_written(), 2);
    assert!(sink.is_finished());

    let collected: ColumnBatch = sink.into_batch().unwrap();
    let mut source = BatchSource::new(vec![collected.clone(), collected]);
    let mut insert = conn.prepare("INSERT INTO dst VALUES (?, ?)").unwrap();
    assert_eq!(insert.load(&mut source).unwrap(), 8);
    drop(insert);

    let copied = values(&conn, "SELECT * FROM dst");
    assert_eq!(copied.len(), 8);
    assert_eq!(copied[1], vec![Value::I32(2), Value::Null]);
    assert_eq!(copied[4], copied[0]);
}

#[test]
fn test_unknown_column_type_falls_back_to_text() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE shapes (g GEOMETRY)").unwrap();
    conn.execute("INSERT INTO shapes VALUES ('POINT(1 2)')").unwrap();

    let rows = values(&conn, "SELECT g FROM shapes");
    assert_eq!(rows, vec![vec![Value::Text("POINT(1 2)".to_string())]]);
}

#[test]
fn test_approximate_decimals() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(
        &driver,
        Options::default().with_decimal_mode(cli_columnar_rs::DecimalMode::Approximate),
    );

    conn.execute("CREATE TABLE prices (p DECIMAL(10, 2))").unwrap();
    conn.execute("INSERT INTO prices VALUES (19.99)").unwrap();
    let rows = values(&conn, "SELECT p FROM prices");
    match rows[0][0] {
        Value::F64(p) => assert!((p - 19.99).abs() < 1e-9, "got {}", p),
        ref other => panic!("Expected F64, got {:?}", other),
    }
}

#[test]
fn test_exact_decimals_keep_every_digit() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = connect(&driver, Options::default());

    conn.execute("CREATE TABLE ratios (r DECIMAL(38, 28))").unwrap();
    conn.execute("INSERT INTO ratios VALUES (0.1234567890123456789012345678)")
        .unwrap();
    let rows = values(&conn, "SELECT r FROM ratios");
    assert_eq!(
        rows[0][0],
        Value::Decimal(Decimal::from_str("0.1234567890123456789012345678").unwrap())
    );

    // thirty fractional digits cannot be stored without rounding
    assert!(conn
        .execute("INSERT INTO ratios VALUES (0.123456789012345678901234567891)")
        .is_err());
    assert_eq!(values(&conn, "SELECT r FROM ratios").len(), 1);
}
