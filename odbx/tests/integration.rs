///
/// Integration tests for odbx
///
/// These tests drive the engine end to end against the SQLite driver on
/// temporary database files.
///

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use odbx::{
    Answer, ConnectOptions, Cursor, Engine, EngineConfig, FindallProgram, NullPolicy, OdbxError, ParamSpec,
    Statistics, StatementOptions, Value,
};
use odbx_driver::{CursorType, FetchOrientation};
use odbx_driver_sqlite::{SqliteDriver, SqliteDriverOptions};
use tempfile::TempDir;

fn engine_with(driver: SqliteDriver) -> (Engine, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    (Engine::new(Arc::new(driver), EngineConfig::default()), dir)
}

fn setup() -> (Engine, TempDir) {
    engine_with(SqliteDriver::default())
}

fn database(dir: &TempDir) -> String {
    dir.path().join("test.db").to_string_lossy().into_owned()
}

fn spec(text: &str) -> ParamSpec {
    text.parse().expect("Invalid parameter spec")
}

fn run(engine: &Engine, conn: odbx::ConnectionId, sql: &str) {
    let answers: Vec<Answer> = engine
        .query(conn, sql, StatementOptions::new())
        .expect("Failed to run statement")
        .collect::<Result<_, _>>()
        .expect("Statement failed");
    assert!(matches!(answers.as_slice(), [Answer::Affected(_)]), "{sql}: {answers:?}");
}

fn collect(cursor: Cursor) -> Vec<Value> {
    cursor
        .map(|answer| answer.expect("Failed to read answer").to_value())
        .collect()
}

fn row(values: Vec<Value>) -> Value {
    Value::compound("row", values)
}

fn people(engine: &Engine, conn: odbx::ConnectionId) {
    run(engine, conn, "CREATE TABLE t (id INTEGER, name VARCHAR(20))");
    run(engine, conn, "INSERT INTO t VALUES (1, 'a'), (2, 'b'), (4, 'd'), (5, 'e')");
}

#[test]
fn test_prepared_select_with_parameter() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    people(&engine, conn);

    let stmt = engine
        .prepare(
            conn,
            "SELECT id, name FROM t WHERE id > ? ORDER BY id",
            &[spec("integer")],
            StatementOptions::new(),
        )
        .expect("Failed to prepare");
    assert_eq!(engine.parameters(stmt).expect("No parameters")[0].to_string(), "integer");

    let mut cursor = engine.execute(stmt, &[Value::Int(3)]).expect("Failed to execute");
    assert_eq!(
        cursor.column_names().expect("No columns"),
        vec!["id".to_string(), "name".to_string()]
    );
    let answers: Vec<Answer> = cursor.by_ref().map(|a| a.expect("Failed to fetch")).collect();
    assert_eq!(
        answers.iter().map(Answer::to_value).collect::<Vec<_>>(),
        vec![
            row(vec![Value::Int(4), Value::atom("d")]),
            row(vec![Value::Int(5), Value::atom("e")]),
        ]
    );
    assert!(matches!(answers.last(), Some(Answer::Row { last: true, .. })));
    assert!(cursor.is_done());
    drop(cursor);

    // The prepared statement is reusable once its result is exhausted.
    let again = collect(engine.execute(stmt, &[Value::Int(4)]).expect("Failed to re-execute"));
    assert_eq!(again, vec![row(vec![Value::Int(5), Value::atom("e")])]);

    assert!(matches!(
        engine.execute(stmt, &[]),
        Err(OdbxError::Domain { domain: "length", .. })
    ));
    engine.free_statement(stmt).expect("Failed to free");
}

#[test]
fn test_findall_matches_row_by_row() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    run(&engine, conn, "CREATE TABLE m (k INTEGER, v DOUBLE, s VARCHAR(10))");
    for k in 0..40 {
        let sql = if k % 7 == 0 {
            format!("INSERT INTO m VALUES ({k}, NULL, 'n{k}')")
        } else {
            format!("INSERT INTO m VALUES ({k}, {k}.5, 's{k}')")
        };
        run(&engine, conn, &sql);
    }
    let sql = "SELECT k, v, s FROM m ORDER BY k";

    let rows = collect(engine.query(conn, sql, StatementOptions::new()).expect("Query failed"));
    assert_eq!(rows.len(), 40);
    assert_eq!(rows[0], row(vec![Value::Int(0), Value::atom("$null$"), Value::atom("n0")]));
    assert_eq!(rows[1], row(vec![Value::Int(1), Value::Float(1.5), Value::atom("s1")]));

    let (a, b, c) = (Value::var(), Value::var(), Value::var());
    let template = row(vec![a.clone(), b.clone(), c.clone()]);
    let spec_row = row(vec![a, b, c]);
    let answers: Vec<Answer> = engine
        .query(conn, sql, StatementOptions::new().findall(template, spec_row))
        .expect("Findall query failed")
        .collect::<Result<_, _>>()
        .expect("Findall failed");
    assert_eq!(answers, vec![Answer::All(rows)]);
}

#[test]
fn test_findall_reorders_columns() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    people(&engine, conn);

    let (id, name) = (Value::var(), Value::var());
    let template = Value::compound("person", vec![name.clone(), Value::compound("id", vec![id.clone()])]);
    let answers = collect(
        engine
            .query(
                conn,
                "SELECT id, name FROM t WHERE id < 3 ORDER BY id",
                StatementOptions::new().findall(template, row(vec![id, name])),
            )
            .expect("Query failed"),
    );
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].to_string(), "[](person(a, id(1)), person(b, id(2)))");
}

#[test]
fn test_findall_program_listing() {
    let (x, y, z) = (Value::var(), Value::var(), Value::var());
    let template = Value::compound(
        "pair",
        vec![
            y.clone(),
            Value::compound("f", vec![x.clone(), z.clone(), z]),
            Value::string("lit"),
        ],
    );
    let program = FindallProgram::compile(&template, &row(vec![x, y]), true).expect("Failed to compile");
    insta::assert_snapshot!(
        program.to_string(),
        @r#"functor pair/3; column 2; functor f/3; column 1; unbound 0; unbound 0; text "lit""#
    );
    assert_eq!(program.max_column(), 2);
}

#[test]
fn test_double_free_and_statistics() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    let stmt = engine
        .prepare(conn, "SELECT 1", &[], StatementOptions::new())
        .expect("Failed to prepare");
    assert_eq!(engine.statistics(), Statistics { created: 1, freed: 0 });

    engine.free_statement(stmt).expect("First free failed");
    assert!(matches!(engine.free_statement(stmt), Err(OdbxError::AlreadyFreed(id)) if id == stmt));
    assert!(matches!(engine.execute(stmt, &[]), Err(OdbxError::AlreadyFreed(_))));
    assert_eq!(engine.statistics(), Statistics { created: 1, freed: 1 });
    assert_eq!(engine.statistics().live(), 0);
}

#[test]
fn test_chunked_text_values() {
    for no_total in [false, true] {
        let (engine, dir) = engine_with(SqliteDriver::new(SqliteDriverOptions {
            no_total,
            ..SqliteDriverOptions::default()
        }));
        let conn = engine
            .connect(&database(&dir), ConnectOptions::new())
            .expect("Failed to connect");
        run(&engine, conn, "CREATE TABLE big (n INTEGER, body TEXT)");

        let insert = engine
            .prepare(
                conn,
                "INSERT INTO big VALUES (?, ?)",
                &[spec("integer"), spec("longvarchar")],
                StatementOptions::new(),
            )
            .expect("Failed to prepare insert");
        let lengths = [100usize, 1000, 10_000];
        for n in lengths {
            let body: String = (0..n).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
            let answers = collect(
                engine
                    .execute(insert, &[Value::Int(n as i64), Value::string(&body)])
                    .expect("Insert failed"),
            );
            assert_eq!(answers, vec![Value::compound("affected", vec![Value::Int(1)])]);
        }

        let rows = collect(
            engine
                .query(conn, "SELECT n, body FROM big ORDER BY n", StatementOptions::new())
                .expect("Select failed"),
        );
        assert_eq!(rows.len(), lengths.len());
        for (value, n) in rows.iter().zip(lengths) {
            let Value::Compound(_, args) = value else {
                panic!("not a row: {value}");
            };
            assert_eq!(args[0], Value::Int(n as i64));
            let text = args[1].text().expect("body is not text");
            assert_eq!(text.len(), n, "no_total = {no_total}");
            assert!(text.starts_with("abcdef"));
            assert_eq!(text.chars().last(), char::from_u32('a' as u32 + ((n - 1) % 26) as u32));
        }
    }
}

#[test]
fn test_null_policies() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");

    let is_null = engine
        .prepare(conn, "SELECT ? IS NULL", &[ParamSpec::default_spec()], StatementOptions::new())
        .expect("Failed to prepare");
    let null = collect(engine.execute(is_null, &[Value::atom("$null$")]).expect("Failed to execute"));
    assert_eq!(null, vec![row(vec![Value::Int(1)])]);
    let other = collect(engine.execute(is_null, &[Value::atom("x")]).expect("Failed to execute"));
    assert_eq!(other, vec![row(vec![Value::Int(0)])]);

    let as_var = collect(
        engine
            .query(conn, "SELECT NULL", StatementOptions::new().null(NullPolicy::Var))
            .expect("Query failed"),
    );
    let Value::Compound(_, args) = &as_var[0] else {
        panic!("not a row");
    };
    assert!(args[0].is_var());

    let custom = collect(
        engine
            .query(
                conn,
                "SELECT NULL",
                StatementOptions::new().null(NullPolicy::Functor(Arc::from("null"))),
            )
            .expect("Query failed"),
    );
    let Value::Compound(_, args) = &custom[0] else {
        panic!("not a row");
    };
    assert!(matches!(&args[0], Value::Compound(name, inner) if &**name == "null" && inner[0].is_var()));

    let connected = engine
        .connect(
            &dir.path().join("other.db").to_string_lossy(),
            ConnectOptions::new().null(NullPolicy::Atom(Arc::from("nothing"))),
        )
        .expect("Failed to connect");
    let inherited = collect(engine.query(connected, "SELECT NULL", StatementOptions::new()).expect("Query failed"));
    assert_eq!(inherited, vec![row(vec![Value::atom("nothing")])]);
}

#[test]
fn test_typed_values_round_trip() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    run(
        &engine,
        conn,
        "CREATE TABLE typed (i INTEGER, d DOUBLE, day DATE, at TIME, ts TIMESTAMP, name VARCHAR(10))",
    );
    let insert = engine
        .prepare(
            conn,
            "INSERT INTO typed VALUES (?, ?, ?, ?, ?, ?)",
            &[
                spec("integer"),
                spec("double"),
                spec("date"),
                spec("time"),
                spec("timestamp"),
                spec("varchar(10)"),
            ],
            StatementOptions::new(),
        )
        .expect("Failed to prepare");

    let day = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
    let at = NaiveTime::from_hms_opt(8, 5, 1).expect("valid time");
    let ts: NaiveDateTime = day.and_hms_opt(23, 59, 58).expect("valid timestamp");
    let values = vec![
        Value::Int(-42),
        Value::Float(2.25),
        Value::Date(day),
        Value::Time(at),
        Value::Timestamp(ts),
        Value::atom("hello"),
    ];
    collect(engine.execute(insert, &values).expect("Insert failed"));

    let rows = collect(engine.query(conn, "SELECT * FROM typed", StatementOptions::new()).expect("Select failed"));
    assert_eq!(rows, vec![row(values)]);

    assert!(matches!(
        engine.execute(insert, &[
            Value::atom("x"),
            Value::Float(0.0),
            Value::Date(day),
            Value::Time(at),
            Value::Timestamp(ts),
            Value::atom("y"),
        ]),
        Err(OdbxError::Type { expected: "32 bit integer", .. })
    ));
    // varchar(10) reserves four bytes per character for UTF-8
    assert!(matches!(
        engine.execute(insert, &[
            Value::Int(1),
            Value::Float(0.0),
            Value::Date(day),
            Value::Time(at),
            Value::Timestamp(ts),
            Value::atom(&"x".repeat(41)),
        ]),
        Err(OdbxError::Representation("column_width"))
    ));
}

#[test]
fn test_scrollable_cursor() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new().cursor_type(CursorType::Static))
        .expect("Failed to connect");
    people(&engine, conn);
    let stmt = engine
        .prepare(
            conn,
            "SELECT id FROM t ORDER BY id",
            &[],
            StatementOptions::new().fetch(odbx::FetchMode::Fetch),
        )
        .expect("Failed to prepare");
    let cursor = engine.execute(stmt, &[]).expect("Failed to execute");

    let id = |orientation| match engine.fetch(stmt, orientation).expect("Fetch failed") {
        odbx::Fetched::Row(row) => row.values()[0].clone(),
        other => panic!("expected a row, got {other:?}"),
    };
    assert_eq!(id(FetchOrientation::Next), Value::Int(1));
    assert_eq!(id(FetchOrientation::Last), Value::Int(5));
    assert_eq!(id(FetchOrientation::Prior), Value::Int(4));
    assert_eq!(id(FetchOrientation::Relative(-2)), Value::Int(1));
    assert_eq!(id(FetchOrientation::Absolute(2)), Value::Int(2));
    assert_eq!(
        engine.fetch(stmt, FetchOrientation::Relative(10)).expect("Fetch failed"),
        odbx::Fetched::EndOfFile
    );
    drop(cursor);
    engine.close_statement(stmt).expect("Failed to close");
    engine.free_statement(stmt).expect("Failed to free");
}

#[test]
fn test_forward_only_cursor_rejects_scrolling() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    let stmt = engine
        .prepare(
            conn,
            "SELECT 1 UNION ALL SELECT 2",
            &[],
            StatementOptions::new().fetch(odbx::FetchMode::Fetch),
        )
        .expect("Failed to prepare");
    let _cursor = engine.execute(stmt, &[]).expect("Failed to execute");
    let err = engine.fetch(stmt, FetchOrientation::Last).expect_err("Scrolling should fail");
    assert_eq!(err.sql_state(), Some("HY106"));
}

#[test]
fn test_connection_aliases_and_listing() {
    let (engine, dir) = setup();
    let dsn = database(&dir);
    let main = engine
        .connect(&dsn, ConnectOptions::new().alias("main"))
        .expect("Failed to connect");
    let again = engine
        .connect(&dsn, ConnectOptions::new().alias("main"))
        .expect("Reconnect with same alias failed");
    assert_eq!(main, again);

    people(&engine, main);
    let rows = collect(engine.query("main", "SELECT count(*) FROM t", StatementOptions::new()).expect("Query failed"));
    assert_eq!(rows, vec![row(vec![Value::Int(4)])]);

    let listed = engine.current_connections();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].label(), "main");
    assert_eq!(listed[0].dsn, dsn);

    engine.disconnect(main).expect("Failed to disconnect");
    assert!(engine.current_connections().is_empty());
    assert!(matches!(
        engine.query("main", "SELECT 1", StatementOptions::new()),
        Err(OdbxError::Existence { kind: "odbc_connection", .. })
    ));
}

#[test]
fn test_syntax_error_carries_driver_state() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    let err = engine
        .query(conn, "SELECT FROM WHERE", StatementOptions::new())
        .expect_err("Query should fail");
    assert!(matches!(err, OdbxError::Driver { .. }), "{err}");
    assert_eq!(err.sql_state(), Some("42000"), "{err}");
    assert_eq!(engine.statistics().live(), 0);
}

#[test]
fn test_reexecution_detaches_earlier_cursor() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    people(&engine, conn);
    let stmt = engine
        .prepare(conn, "SELECT id FROM t WHERE id <= 3 ORDER BY id", &[], StatementOptions::new())
        .expect("Failed to prepare");

    let mut first = engine.execute(stmt, &[]).expect("Failed to execute");
    let head = first.next().expect("No row").expect("Failed to fetch");
    assert_eq!(head.to_value(), row(vec![Value::Int(1)]));
    engine.close_statement(stmt).expect("Failed to close");

    let second = engine.execute(stmt, &[]).expect("Failed to re-execute");
    assert!(matches!(
        first.next(),
        Some(Err(OdbxError::Context { state: "stale_cursor", .. }))
    ));
    assert!(first.next().is_none());
    drop(first);

    assert_eq!(
        collect(second),
        vec![row(vec![Value::Int(1)]), row(vec![Value::Int(2)]), row(vec![Value::Int(3)])]
    );
    engine.free_statement(stmt).expect("Failed to free");
}

#[test]
fn test_values_wider_than_declared_width() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    run(&engine, conn, "CREATE TABLE w (s VARCHAR(2), b VARBINARY(1))");
    run(&engine, conn, "INSERT INTO w VALUES ('abcdefghijklmnopqrstuvwxyz', x'00010203')");
    let rows = collect(engine.query(conn, "SELECT s, b FROM w", StatementOptions::new()).expect("Query failed"));
    assert_eq!(
        rows,
        vec![row(vec![Value::atom("abcdefghijklmnopqrstuvwxyz"), Value::blob(&[0, 1, 2, 3])])]
    );
}
