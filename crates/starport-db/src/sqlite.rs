//! SQLite backend for starport-db
//!
//! Embedded, file or `:memory:` databases through rusqlite. Query results
//! are read in full when the statement runs, so the cursor holds no
//! statement handle and the connection's single active statement is
//! released before the cursor is handed out.

use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};

use crate::classify::classify_sqlite;
use crate::config::{BackendKind, ConnectionConfig};
use crate::connection::Backend;
use crate::cursor::{BufferedRows, ResultSet};
use crate::error::{Error, ErrorKind, NativeCode, Result};
use crate::types::{Cell, ColumnInfo, Value};

/// Target that opens a private in-memory database
pub const MEMORY_TARGET: &str = ":memory:";

fn classified(extended: i32, message: String) -> Error {
    let kind = classify_sqlite(extended).unwrap_or(ErrorKind::Internal);
    Error::database(
        kind,
        Some(NativeCode::Sqlite {
            primary: extended & 0xff,
            extended,
        }),
        message,
    )
}

/// Map a rusqlite error onto the generic taxonomy
fn map_err(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let message = message.unwrap_or_else(|| failure.to_string());
            classified(failure.extended_code, message)
        }
        // prepare-time failures carry the error offset (bundled builds)
        rusqlite::Error::SqlInputError {
            error, msg, offset, ..
        } => classified(error.extended_code, format!("{} at offset {}", msg, offset)),
        other => Error::database(ErrorKind::Internal, None, other.to_string()),
    }
}

/// Encode a bind descriptor as a SQLite value
fn to_sqlite<'a>(value: &Value<'a>) -> Result<ToSqlOutput<'a>> {
    let value = match *value {
        Value::Null => ValueRef::Null,
        Value::Int32(n) => ValueRef::Integer(i64::from(n)),
        Value::UInt32(n) => ValueRef::Integer(i64::from(n)),
        Value::Int64(n) => ValueRef::Integer(n),
        Value::UInt64(n) => ValueRef::Integer(
            i64::try_from(n).map_err(|_| Error::bind("uint64", format!("{} exceeds INTEGER", n)))?,
        ),
        Value::Float64(f) => ValueRef::Real(f),
        Value::Bool(b) => ValueRef::Integer(i64::from(b)),
        Value::Text(s) => ValueRef::Text(s.as_bytes()),
        Value::Blob(b) => ValueRef::Blob(b),
    };
    Ok(ToSqlOutput::Borrowed(value))
}

fn to_cell(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(n) => Cell::Int(n),
        ValueRef::Real(f) => Cell::Float(f),
        ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Cell::Blob(bytes.to_vec()),
    }
}

/// SQLite backend
pub struct SqliteBackend {
    conn: Option<rusqlite::Connection>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl SqliteBackend {
    /// Open the database named by `config.target`
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let conn = if config.target == MEMORY_TARGET {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&config.target)
        }
        .map_err(|e| {
            Error::connection_with_source(
                format!("cannot open SQLite database {}", config.target),
                e,
            )
        })?;

        conn.busy_timeout(Duration::from_millis(config.lock_timeout_ms))
            .map_err(map_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(map_err)?;

        tracing::debug!(
            target_path = %config.target,
            busy_timeout_ms = config.lock_timeout_ms,
            "sqlite session configured"
        );
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::connection("connection is closed"))
    }

    fn prepare<'c>(
        conn: &'c rusqlite::Connection,
        sql: &str,
        params: &[Value<'_>],
    ) -> Result<rusqlite::CachedStatement<'c>> {
        let mut stmt = conn.prepare_cached(sql).map_err(map_err)?;
        let count = stmt.parameter_count();
        for (i, value) in params.iter().take(count).enumerate() {
            stmt.raw_bind_parameter(i + 1, to_sqlite(value)?)
                .map_err(map_err)?;
        }
        Ok(stmt)
    }

    fn batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql).map_err(map_err)
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| map_err(e)),
            None => Ok(()),
        }
    }

    fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.batch("ROLLBACK")
    }

    fn execute_affected(&mut self, sql: &str, params: &[Value<'_>]) -> Result<u64> {
        let conn = self.conn()?;
        let mut stmt = Self::prepare(conn, sql, params)?;
        if stmt.column_count() == 0 {
            let changed = stmt.raw_execute().map_err(map_err)?;
            return Ok(changed as u64);
        }

        // SELECT, PRAGMA and RETURNING run to completion and count their rows
        let mut rows = stmt.raw_query();
        let mut count = 0u64;
        while rows.next().map_err(map_err)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    fn execute_returning_id(&mut self, sql: &str, params: &[Value<'_>]) -> Result<i64> {
        let conn = self.conn()?;
        let mut stmt = Self::prepare(conn, sql, params)?;
        if stmt.column_count() == 0 {
            stmt.raw_execute().map_err(map_err)?;
            return Ok(conn.last_insert_rowid());
        }

        let mut rows = stmt.raw_query();
        let returned = match rows.next().map_err(map_err)? {
            Some(row) => match row.get_ref(0).map_err(map_err)? {
                ValueRef::Integer(id) => Some(id),
                other => {
                    return Err(Error::TypeMismatch {
                        index: 0,
                        expected: "i64",
                        actual: to_cell(other).type_name(),
                    })
                }
            },
            None => None,
        };
        while rows.next().map_err(map_err)?.is_some() {}
        Ok(returned.unwrap_or_else(|| conn.last_insert_rowid()))
    }

    fn query(&mut self, sql: &str, params: &[Value<'_>]) -> Result<Box<dyn ResultSet>> {
        let conn = self.conn()?;
        let mut stmt = Self::prepare(conn, sql, params)?;

        let columns: Vec<ColumnInfo> = stmt
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name(), c.decl_type().unwrap_or("")))
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut raw = stmt.raw_query();
        while let Some(row) = raw.next().map_err(map_err)? {
            let cells = (0..width)
                .map(|i| row.get_ref(i).map(to_cell))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_err)?;
            rows.push(cells);
        }

        Ok(Box::new(BufferedRows::new(columns, rows)))
    }
}
