///
/// Concurrency tests for odbx
///
/// Cloned statements running on separate threads, and a long query
/// cancelled from another thread.
///

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use odbx::{ConnectOptions, Engine, EngineConfig, OdbxError, ParamSpec, Statistics, StatementOptions, Value};
use odbx_driver_sqlite::SqliteDriver;
use tempfile::TempDir;

fn setup() -> (Engine, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    (Engine::new(Arc::new(SqliteDriver::default()), EngineConfig::default()), dir)
}

fn database(dir: &TempDir) -> String {
    dir.path().join("test.db").to_string_lossy().into_owned()
}

fn ints(engine: &Engine, stmt: odbx::StatementId, limit: i64) -> Vec<i64> {
    engine
        .execute(stmt, &[Value::Int(limit)])
        .expect("Failed to execute")
        .map(|answer| {
            let row = answer.expect("Failed to fetch").into_row().expect("Not a row");
            match row.values()[0] {
                Value::Int(i) => i,
                ref other => panic!("not an integer: {other}"),
            }
        })
        .collect()
}

#[test]
fn test_clones_run_independently_on_threads() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    let sql = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < ?) SELECT x FROM c";
    let stmt = engine
        .prepare(conn, sql, &["integer".parse::<ParamSpec>().expect("Invalid spec")], StatementOptions::new())
        .expect("Failed to prepare");
    let clone = engine.clone_statement(stmt).expect("Failed to clone");
    assert_ne!(stmt, clone);
    assert_eq!(engine.parameters(clone).expect("No parameters"), engine.parameters(stmt).expect("No parameters"));

    let (left, right) = thread::scope(|s| {
        let left = s.spawn(|| ints(&engine, stmt, 300));
        let right = s.spawn(|| ints(&engine, clone, 200));
        (
            left.join().expect("Left worker panicked"),
            right.join().expect("Right worker panicked"),
        )
    });
    assert_eq!(left, (1..=300).collect::<Vec<_>>());
    assert_eq!(right, (1..=200).collect::<Vec<_>>());

    engine.free_statement(clone).expect("Failed to free clone");
    assert_eq!(ints(&engine, stmt, 3), vec![1, 2, 3]);
    engine.free_statement(stmt).expect("Failed to free");
    assert_eq!(engine.statistics(), Statistics { created: 2, freed: 2 });
}

#[test]
fn test_cancel_interrupts_a_running_query() {
    let (engine, dir) = setup();
    let conn = engine
        .connect(&database(&dir), ConnectOptions::new())
        .expect("Failed to connect");
    let sql = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000) \
               SELECT count(*) FROM c";
    let finished = AtomicBool::new(false);

    let result = thread::scope(|s| {
        let worker = s.spawn(|| {
            let result = engine
                .query(conn, sql, StatementOptions::new())
                .and_then(|cursor| cursor.collect::<Result<Vec<_>, _>>());
            finished.store(true, Ordering::SeqCst);
            result
        });
        let id = worker.thread().id();
        while !finished.load(Ordering::SeqCst) {
            if engine.executing(id) {
                let _ = engine.cancel(id);
            }
            thread::sleep(Duration::from_millis(5));
        }
        worker.join().expect("Worker panicked")
    });

    let err = result.expect_err("Query should have been cancelled");
    assert_eq!(err.sql_state(), Some("HY008"), "{err}");
    assert!(!engine.executing(thread::current().id()));
    assert_eq!(engine.statistics().live(), 0);

    // The connection is still usable.
    let rows: Vec<_> = engine
        .query(conn, "SELECT 1", StatementOptions::new())
        .expect("Query failed")
        .collect::<Result<_, OdbxError>>()
        .expect("Fetch failed");
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_cancel_of_idle_thread_is_a_no_op() {
    let (engine, _dir) = setup();
    assert!(!engine.cancel(thread::current().id()).expect("Cancel failed"));
}
