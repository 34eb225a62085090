//! Transaction nesting tests against the scripted backend

mod common;

use common::{scripted_connection, Reply};
use starport_db::{BackendKind, Error, ErrorKind, Value};

#[test]
fn test_nested_begin_commit_is_one_physical_transaction() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);

    conn.begin().unwrap();
    conn.begin().unwrap();
    assert_eq!(conn.depth(), 2);
    conn.commit().unwrap();
    assert_eq!(conn.depth(), 1);
    conn.commit().unwrap();
    assert_eq!(conn.depth(), 0);

    assert_eq!(script.log(), vec!["BEGIN", "COMMIT"]);
    assert_eq!(conn.stats().commits, 1);
}

#[test]
fn test_rollback_resets_nesting() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);

    conn.begin().unwrap();
    conn.begin().unwrap();
    conn.rollback().unwrap();
    assert_eq!(conn.depth(), 0);
    assert_eq!(script.log(), vec!["BEGIN", "ROLLBACK"]);

    // no open transaction: still safe, no physical statement
    conn.rollback().unwrap();
    assert_eq!(conn.depth(), 0);
    assert_eq!(script.count("ROLLBACK"), 1);
}

#[test]
fn test_commit_without_begin_is_an_error() {
    let (mut conn, script) = scripted_connection(BackendKind::Sqlite);

    let err = conn.commit().unwrap_err();
    assert!(matches!(err, Error::Transaction { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(script.log().is_empty());
}

#[test]
fn test_failed_begin_leaves_depth_zero() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script.fail_begin();

    let err = conn.begin().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(conn.depth(), 0);
}

#[test]
fn test_failed_commit_keeps_transaction_open() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script.fail_commit();

    conn.begin().unwrap();
    let err = conn.commit().unwrap_err();
    assert!(err.is_retriable());
    assert_eq!(conn.depth(), 1);

    conn.rollback().unwrap();
    assert_eq!(script.log(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);
}

#[test]
fn test_transaction_closure_commits_on_ok() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script.reply(Reply::Affected(1));

    let touched = conn
        .transaction(|conn| {
            conn.execute_affected("UPDATE ships SET hull = {2} WHERE id = {1}", &[
                Value::Int64(4),
                Value::Int32(90),
            ])
        })
        .unwrap();

    assert_eq!(touched, 1);
    assert_eq!(
        script.log(),
        vec!["BEGIN", "UPDATE ships SET hull = $2 WHERE id = $1", "COMMIT"]
    );
}

#[test]
fn test_transaction_closure_rolls_back_on_err() {
    let (mut conn, script) = scripted_connection(BackendKind::Sqlite);
    script.reply(Reply::Fail(ErrorKind::Transient));

    let err = conn
        .transaction(|conn| {
            conn.begin()?;
            conn.execute("DELETE FROM cargo WHERE ship = {1}", &[Value::Int64(4)])?;
            conn.commit()
        })
        .unwrap_err();

    assert!(err.is_retriable());
    assert_eq!(conn.depth(), 0);
    assert_eq!(
        script.log(),
        vec!["BEGIN", "DELETE FROM cargo WHERE ship = ?1", "ROLLBACK"]
    );
    assert_eq!(conn.stats().rollbacks, 1);
    assert_eq!(conn.stats().failures, 1);
}

#[test]
fn test_closed_connection_fails_with_connection_kind() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    conn.close().unwrap();
    conn.close().unwrap();
    assert!(conn.is_closed());
    assert!(script.is_closed());

    assert_eq!(conn.begin().unwrap_err().kind(), ErrorKind::Connection);
    assert_eq!(
        conn.execute("SELECT 1", &[]).unwrap_err().kind(),
        ErrorKind::Connection
    );
    assert!(conn.query("SELECT 1", &[]).is_err());
}

#[test]
fn test_drop_closes_backend() {
    let (conn, script) = scripted_connection(BackendKind::Sqlite);
    drop(conn);
    assert!(script.is_closed());
}
