//! Table definitions for the feature stores

use starport_db::{BackendKind, Connection, Error};

use crate::error::StoreResult;

const SQLITE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL,
        last_login INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS bank_accounts (
        player_id INTEGER PRIMARY KEY REFERENCES players(id) ON DELETE CASCADE,
        balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS channel_subscriptions (
        player_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        channel TEXT NOT NULL,
        PRIMARY KEY (player_id, channel)
    )",
];

const POSTGRES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at BIGINT NOT NULL,
        last_login BIGINT
    )",
    "CREATE TABLE IF NOT EXISTS bank_accounts (
        player_id BIGINT PRIMARY KEY REFERENCES players(id) ON DELETE CASCADE,
        balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS channel_subscriptions (
        player_id BIGINT NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        channel TEXT NOT NULL,
        PRIMARY KEY (player_id, channel)
    )",
];

/// Create the store tables if they do not exist, in one transaction
pub fn install(conn: &mut Connection) -> StoreResult<()> {
    let statements = match conn.kind() {
        BackendKind::Sqlite => SQLITE,
        BackendKind::Postgres => POSTGRES,
        BackendKind::MySql => {
            return Err(Error::not_implemented(BackendKind::MySql, "schema install").into())
        }
    };

    conn.transaction(|conn| {
        statements
            .iter()
            .try_for_each(|ddl| conn.execute(ddl, &[]))
    })?;
    tracing::info!(backend = %conn.kind(), tables = statements.len(), "store schema installed");
    Ok(())
}
