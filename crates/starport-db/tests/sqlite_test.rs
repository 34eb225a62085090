//! End-to-end tests against real SQLite databases
#![cfg(feature = "sqlite")]

use starport_db::error::NativeCode;
use starport_db::{Connection, ConnectionConfig, Error, ErrorKind, UpsertOutcome, Value};

fn memory() -> Connection {
    let mut conn = Connection::open(ConnectionConfig::sqlite(":memory:")).unwrap();
    conn.execute(
        "CREATE TABLE players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            credits INTEGER NOT NULL DEFAULT 0,
            alignment REAL,
            banned BOOLEAN NOT NULL DEFAULT 0,
            avatar BLOB
        )",
        &[],
    )
    .unwrap();
    conn.execute(
        "CREATE TABLE ships (
            id INTEGER PRIMARY KEY,
            owner INTEGER NOT NULL REFERENCES players(id),
            name TEXT NOT NULL
        )",
        &[],
    )
    .unwrap();
    conn
}

#[test]
fn test_insert_and_read_back() {
    let mut conn = memory();

    let id = conn
        .execute_returning_id(
            "INSERT INTO players (name, credits, alignment, banned, avatar) VALUES ({1}, {2}, {3}, {4}, {5})",
            &[
                Value::Text("Rook"),
                Value::UInt32(1_000),
                Value::Float64(-0.25),
                Value::Bool(true),
                Value::Blob(&[0x89, 0x50]),
            ],
        )
        .unwrap();
    assert_eq!(id, 1);

    let mut cursor = conn
        .query(
            "SELECT name, credits, alignment, banned, avatar FROM players WHERE id = {1}",
            &[Value::Int64(id)],
        )
        .unwrap();
    assert_eq!(cursor.column_count(), 5);
    assert_eq!(cursor.column_name(3).unwrap(), "banned");
    assert_eq!(cursor.column_type(3).unwrap(), "BOOLEAN");

    assert!(cursor.advance().unwrap());
    assert_eq!(cursor.get_text(0).unwrap(), "Rook");
    assert_eq!(cursor.get_u32(1).unwrap(), 1_000);
    assert_eq!(cursor.get_f64(2).unwrap(), -0.25);
    assert!(cursor.get_bool(3).unwrap());
    assert_eq!(cursor.get_blob(4).unwrap(), &[0x89, 0x50]);
    assert!(!cursor.advance().unwrap());
    cursor.finalize();

    assert_eq!(conn.stats().statements, 4);
}

#[test]
fn test_null_columns_fail_closed() {
    let mut conn = memory();
    conn.execute("INSERT INTO players (name) VALUES ({1})", &[Value::Text("Wren")])
        .unwrap();

    let mut cursor = conn
        .query("SELECT alignment, avatar FROM players", &[])
        .unwrap();
    assert!(cursor.advance().unwrap());
    assert!(cursor.is_null(0).unwrap());
    assert!(matches!(cursor.get_f64(0), Err(Error::NullValue { index: 0 })));
    assert_eq!(cursor.get_f64(0).unwrap_or_default(), 0.0);
    assert!(cursor.get_blob(1).is_err());
}

#[test]
fn test_reused_placeholder() {
    let mut conn = memory();
    let mut cursor = conn
        .query("SELECT {1} * {1} + {2}", &[Value::Int32(6), Value::Int32(6)])
        .unwrap();
    assert!(cursor.advance().unwrap());
    assert_eq!(cursor.get_i64(0).unwrap(), 42);
}

#[test]
fn test_unique_violation_is_constraint() {
    let mut conn = memory();
    let insert = "INSERT INTO players (name) VALUES ({1})";
    conn.execute(insert, &[Value::Text("Rook")]).unwrap();

    let err = conn.execute(insert, &[Value::Text("Rook")]).unwrap_err();
    assert!(err.is_constraint_violation());
    assert!(matches!(
        err.native_code(),
        Some(NativeCode::Sqlite { primary: 19, extended: 2067 })
    ));
    match err {
        Error::Database { sql, .. } => {
            assert_eq!(sql.as_deref(), Some("INSERT INTO players (name) VALUES (?1)"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_foreign_keys_enforced() {
    let mut conn = memory();
    let err = conn
        .execute(
            "INSERT INTO ships (owner, name) VALUES ({1}, {2})",
            &[Value::Int64(99), Value::Text("Ghost")],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
}

#[test]
fn test_syntax_error() {
    let mut conn = memory();
    let err = conn.query("SELECT * FORM players", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(conn.stats().failures, 1);
}

#[test]
fn test_missing_bind_never_reaches_backend() {
    let mut conn = memory();
    let before = conn.stats().statements;
    let err = conn
        .execute("UPDATE players SET credits = {2} WHERE id = {1}", &[Value::Int64(1)])
        .unwrap_err();
    assert!(matches!(err, Error::MissingBind { index: 2, supplied: 1 }));
    assert_eq!(conn.stats().statements, before);
}

#[test]
fn test_statement_bound_from_config() {
    let mut conn =
        Connection::open(ConnectionConfig::sqlite(":memory:").with_max_statement_len(16)).unwrap();
    conn.execute("SELECT 1", &[]).unwrap();
    let err = conn
        .execute("SELECT 1 WHERE 1 = {1}", &[Value::Int32(1)])
        .unwrap_err();
    assert!(matches!(err, Error::TemplateOverflow { limit: 16 }));
}

#[test]
fn test_upsert_update_then_insert() {
    let mut conn = memory();
    conn.execute("INSERT INTO players (name) VALUES ({1})", &[Value::Text("Rook")])
        .unwrap();

    let update = "UPDATE players SET credits = credits + {2} WHERE name = {1}";
    let insert = "INSERT INTO players (name, credits) VALUES ({1}, {2})";

    let outcome = conn
        .upsert(update, insert, &[Value::Text("Rook"), Value::Int64(50)])
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated(1));

    let outcome = conn
        .upsert(update, insert, &[Value::Text("Vale"), Value::Int64(75)])
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    let mut cursor = conn
        .query("SELECT name, credits FROM players ORDER BY name", &[])
        .unwrap();
    let mut seen = Vec::new();
    while cursor.advance().unwrap() {
        seen.push((cursor.get_text(0).unwrap().to_string(), cursor.get_i64(1).unwrap()));
    }
    assert_eq!(seen, vec![("Rook".to_string(), 50), ("Vale".to_string(), 75)]);
}

#[test]
fn test_upsert_loses_insert_race() {
    let mut conn = memory();
    // the update's predicate never matches, so the insert runs against an
    // existing row exactly as if another writer had created it first
    conn.execute("INSERT INTO players (name) VALUES ({1})", &[Value::Text("Rook")])
        .unwrap();

    let outcome = conn
        .upsert(
            "UPDATE players SET credits = {2} WHERE name = {1} AND credits < 0",
            "INSERT INTO players (name, credits) VALUES ({1}, {2})",
            &[Value::Text("Rook"), Value::Int64(10)],
        )
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::RetriedUpdate(0));
    assert_eq!(conn.stats().upsert_retries, 1);
}

#[test]
fn test_transaction_rollback_discards_writes() {
    let mut conn = memory();

    conn.begin().unwrap();
    conn.begin().unwrap();
    conn.execute("INSERT INTO players (name) VALUES ({1})", &[Value::Text("Ash")])
        .unwrap();
    conn.rollback().unwrap();

    let mut cursor = conn.query("SELECT COUNT(*) FROM players", &[]).unwrap();
    assert!(cursor.advance().unwrap());
    assert_eq!(cursor.get_i64(0).unwrap(), 0);
}

#[test]
fn test_file_database_persists_and_reports_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("starport.db");
    let path = path.to_str().unwrap();

    let mut writer = Connection::open(ConnectionConfig::sqlite(path)).unwrap();
    writer
        .execute("CREATE TABLE sectors (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .unwrap();

    let mut other = Connection::open(ConnectionConfig::sqlite(path).with_lock_timeout(0)).unwrap();

    writer.begin().unwrap();
    writer
        .execute("INSERT INTO sectors (name) VALUES ({1})", &[Value::Text("Sol")])
        .unwrap();

    let err = other
        .execute("INSERT INTO sectors (name) VALUES ({1})", &[Value::Text("Vega")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.is_retriable());

    writer.commit().unwrap();
    other
        .execute("INSERT INTO sectors (name) VALUES ({1})", &[Value::Text("Vega")])
        .unwrap();
    writer.close().unwrap();
    other.close().unwrap();

    let mut reopened = Connection::open(ConnectionConfig::sqlite(path)).unwrap();
    let mut cursor = reopened.query("SELECT COUNT(*) FROM sectors", &[]).unwrap();
    assert!(cursor.advance().unwrap());
    assert_eq!(cursor.get_i64(0).unwrap(), 2);
}

#[test]
fn test_open_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no/such/dir/game.db");
    let err = Connection::open(ConnectionConfig::sqlite(path.to_str().unwrap())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
