//! Optimistic upsert protocol tests against the scripted backend

mod common;

use common::{scripted_connection, Reply};
use starport_db::{BackendKind, ErrorKind, Upsert, UpsertOutcome, Value};

const UPDATE: &str = "UPDATE bank_accounts SET balance = balance + {2} WHERE player_id = {1}";
const INSERT: &str = "INSERT INTO bank_accounts (player_id, balance) VALUES ({1}, {2})";

const PG_UPDATE: &str = "UPDATE bank_accounts SET balance = balance + $2 WHERE player_id = $1";
const PG_INSERT: &str = "INSERT INTO bank_accounts (player_id, balance) VALUES ($1, $2)";

fn binds() -> [Value<'static>; 2] {
    [Value::Int64(7), Value::Int64(250)]
}

#[test]
fn test_matching_update_skips_insert() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script.reply(Reply::Affected(1));

    let outcome = conn.upsert(UPDATE, INSERT, &binds()).unwrap();

    assert_eq!(outcome, UpsertOutcome::Updated(1));
    assert_eq!(script.log(), vec![PG_UPDATE]);
}

#[test]
fn test_missing_row_is_inserted() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script.reply(Reply::Affected(0)).reply(Reply::Affected(1));

    let outcome = conn.upsert(UPDATE, INSERT, &binds()).unwrap();

    assert_eq!(outcome, UpsertOutcome::Inserted);
    assert_eq!(script.log(), vec![PG_UPDATE, PG_INSERT]);
}

#[test]
fn test_lost_insert_race_retries_update_once() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script
        .reply(Reply::Affected(0))
        .reply(Reply::Fail(ErrorKind::Constraint))
        .reply(Reply::Affected(1));

    let outcome = conn.upsert(UPDATE, INSERT, &binds()).unwrap();

    assert_eq!(outcome, UpsertOutcome::RetriedUpdate(1));
    assert_eq!(script.log(), vec![PG_UPDATE, PG_INSERT, PG_UPDATE]);
    assert_eq!(conn.stats().upsert_retries, 1);
}

#[test]
fn test_retried_update_result_is_final() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script
        .reply(Reply::Affected(0))
        .reply(Reply::Fail(ErrorKind::Constraint))
        .reply(Reply::Affected(0));

    let outcome = conn.upsert(UPDATE, INSERT, &binds()).unwrap();
    assert_eq!(outcome, UpsertOutcome::RetriedUpdate(0));
    assert_eq!(script.log().len(), 3);

    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script
        .reply(Reply::Affected(0))
        .reply(Reply::Fail(ErrorKind::Constraint))
        .reply(Reply::Fail(ErrorKind::Transient));

    let err = conn.upsert(UPDATE, INSERT, &binds()).unwrap_err();
    assert!(err.is_retriable());
    assert_eq!(script.log().len(), 3);
}

#[test]
fn test_other_insert_failure_is_not_retried() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script
        .reply(Reply::Affected(0))
        .reply(Reply::Fail(ErrorKind::Transient));

    let err = conn.upsert(UPDATE, INSERT, &binds()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(script.log(), vec![PG_UPDATE, PG_INSERT]);
    assert_eq!(conn.stats().upsert_retries, 0);
}

#[test]
fn test_insert_guarded_by_savepoint_inside_postgres_transaction() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script
        .reply(Reply::Affected(0))
        .reply(Reply::Fail(ErrorKind::Constraint))
        .reply(Reply::Affected(1));

    conn.begin().unwrap();
    let outcome = conn.upsert(UPDATE, INSERT, &binds()).unwrap();
    conn.commit().unwrap();

    assert_eq!(outcome, UpsertOutcome::RetriedUpdate(1));
    assert_eq!(
        script.log(),
        vec![
            "BEGIN",
            PG_UPDATE,
            "SAVEPOINT starport_upsert",
            PG_INSERT,
            "ROLLBACK TO SAVEPOINT starport_upsert",
            "RELEASE SAVEPOINT starport_upsert",
            PG_UPDATE,
            "COMMIT",
        ]
    );
}

#[test]
fn test_failed_savepoint_restore_stops_the_upsert() {
    let (mut conn, script) = scripted_connection(BackendKind::Postgres);
    script
        .reply(Reply::Affected(0))
        .reply(Reply::Fail(ErrorKind::Constraint));
    script.fail_savepoint_rollback();

    conn.begin().unwrap();
    let err = conn.upsert(UPDATE, INSERT, &binds()).unwrap_err();
    conn.rollback().unwrap();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(conn.stats().upsert_retries, 0);
    assert_eq!(
        script.log(),
        vec![
            "BEGIN",
            PG_UPDATE,
            "SAVEPOINT starport_upsert",
            PG_INSERT,
            "ROLLBACK TO SAVEPOINT starport_upsert",
            "ROLLBACK",
        ]
    );
}

#[test]
fn test_no_savepoint_outside_transaction_or_on_sqlite() {
    let (mut conn, script) = scripted_connection(BackendKind::Sqlite);
    script.reply(Reply::Affected(0)).reply(Reply::Affected(1));

    conn.begin().unwrap();
    conn.upsert(UPDATE, INSERT, &binds()).unwrap();
    conn.commit().unwrap();

    assert!(script.log().iter().all(|s| !s.contains("SAVEPOINT")));
}

#[test]
fn test_separate_bind_sets() {
    let (mut conn, script) = scripted_connection(BackendKind::MySql);
    script.reply(Reply::Affected(0)).reply(Reply::Affected(1));

    let update = [Value::Text("Vega"), Value::Int64(3)];
    let insert = [Value::Int64(3), Value::Text("Vega")];
    let outcome = Upsert::new(
        "UPDATE corporations SET name = {1} WHERE id = {2}",
        "INSERT INTO corporations (id, name, founder) VALUES ({1}, {2}, {1})",
    )
    .update_binds(&update)
    .insert_binds(&insert)
    .execute(&mut conn)
    .unwrap();

    assert!(outcome.inserted());
    assert_eq!(
        script.log()[1],
        "INSERT INTO corporations (id, name, founder) VALUES (?, ?, ?)"
    );
    assert_eq!(
        script.binds()[1],
        vec!["Int64(3)", "Text(\"Vega\")", "Int64(3)"]
    );
}
