//! PostgreSQL backend for starport-db
//!
//! Built on the blocking `postgres` client:
//! - Session parameters (statement/lock timeout, application name) set at open
//! - Binds encoded against the parameter type the server inferred
//! - Rows decoded into owned cells when the query runs
//! - SQLSTATE classification for every server error
//!
//! A failed statement aborts the open transaction until it is rolled back,
//! so the upsert protocol guards its INSERT with a savepoint here.

use std::str::FromStr;
use std::time::Duration;

use bytes::BytesMut;
use postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use postgres::{Client, NoTls, Row, Statement};
use rust_decimal::Decimal;

use crate::classify::classify_sqlstate;
use crate::config::{BackendKind, ConnectionConfig};
use crate::connection::Backend;
use crate::cursor::{BufferedRows, ResultSet};
use crate::error::{Error, ErrorKind, NativeCode, Result};
use crate::types::{Cell, ColumnInfo, Value};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Map a client error onto the generic taxonomy
fn map_err(e: postgres::Error) -> Error {
    if let Some(db) = e.as_db_error() {
        let state = db.code().code();
        let kind = classify_sqlstate(state).unwrap_or(ErrorKind::Internal);
        return Error::database(
            kind,
            Some(NativeCode::SqlState(state.to_string())),
            db.message(),
        );
    }

    let io = std::error::Error::source(&e).is_some_and(|s| s.is::<std::io::Error>());
    if e.is_closed() || io {
        return Error::connection_with_source("PostgreSQL connection lost", e);
    }
    Error::database(ErrorKind::Internal, None, e.to_string())
}

/// Bind descriptor encoded for the parameter type the server expects
#[derive(Debug)]
struct PgParam<'a>(Value<'a>);

fn mismatch(value: &str, ty: &Type) -> BoxError {
    format!("cannot encode {} as {}", value, ty).into()
}

fn encode_int(n: i128, name: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => i64::try_from(n)?.to_sql(ty, out),
        Type::OID => u32::try_from(n)?.to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from_i128_with_scale(n, 0)?.to_sql(ty, out),
        Type::BOOL => (n != 0).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => n.to_string().to_sql(ty, out),
        _ => Err(mismatch(name, ty)),
    }
}

fn encode_float(f: f64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => f.to_string().to_sql(ty, out),
        _ => Err(mismatch("float64", ty)),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if <&str as ToSql>::accepts(ty) {
        return s.to_sql(ty, out);
    }
    match *ty {
        Type::JSON | Type::JSONB => serde_json::Value::from_str(s)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(s)?
            .with_timezone(&chrono::Utc)
            .to_sql(ty, out),
        Type::TIMESTAMP => chrono::NaiveDateTime::from_str(s)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => encode_int(s.trim().parse()?, "text", ty, out),
        _ => Err(mismatch("text", ty)),
    }
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Int32(n) => encode_int(i128::from(n), "int32", ty, out),
            Value::UInt32(n) => encode_int(i128::from(n), "uint32", ty, out),
            Value::Int64(n) => encode_int(i128::from(n), "int64", ty, out),
            Value::UInt64(n) => encode_int(i128::from(n), "uint64", ty, out),
            Value::Float64(f) => encode_float(f, ty, out),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => encode_int(i128::from(b), "bool", ty, out),
            },
            Value::Text(s) => encode_text(s, ty, out),
            Value::Blob(b) => match *ty {
                Type::BYTEA => b.to_sql(ty, out),
                _ => Err(mismatch("blob", ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn get<'r, T: FromSql<'r>>(row: &'r Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(map_err)
}

/// Decode one column into an owned cell
fn decode(row: &Row, idx: usize, ty: &Type) -> Result<Cell> {
    let cell = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Cell::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(|n| Cell::Int(n.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|n| Cell::Int(n.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(Cell::Int),
        Type::OID => get::<u32>(row, idx)?.map(|n| Cell::Int(n.into())),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|f| Cell::Float(f.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Cell::Float),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(|d| Cell::Text(d.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Cell::Blob),
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?.map(|d| Cell::Text(d.to_string())),
        Type::TIMESTAMP => {
            get::<chrono::NaiveDateTime>(row, idx)?.map(|t| Cell::Text(t.to_string()))
        }
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx)?
            .map(|t| Cell::Text(t.to_rfc3339())),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|u| Cell::Text(u.to_string())),
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx)?.map(|j| Cell::Text(j.to_string()))
        }
        _ if <String as FromSql>::accepts(ty) => get::<String>(row, idx)?.map(Cell::Text),
        _ => {
            return Err(Error::database(
                ErrorKind::Internal,
                None,
                format!("column {} has unsupported type {}", idx, ty),
            ))
        }
    };
    Ok(cell.unwrap_or(Cell::Null))
}

/// PostgreSQL backend
pub struct PgBackend {
    client: Option<Client>,
}

impl std::fmt::Debug for PgBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgBackend")
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl PgBackend {
    /// Connect and apply session parameters from `config`
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg = postgres::Config::from_str(&config.target)
            .map_err(|e| Error::config(format!("invalid PostgreSQL target: {}", e)))?;
        if config.connect_timeout_ms > 0 {
            pg.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        }
        if let Some(name) = &config.application_name {
            pg.application_name(name);
        }

        let mut client = pg.connect(NoTls).map_err(|e| {
            if e.as_db_error().is_some() {
                map_err(e)
            } else {
                Error::connection_with_source(
                    format!("cannot connect to {}", config.redacted_target()),
                    e,
                )
            }
        })?;

        client
            .batch_execute(&format!(
                "SET statement_timeout = {}; SET lock_timeout = {}",
                config.statement_timeout_ms, config.lock_timeout_ms
            ))
            .map_err(map_err)?;

        tracing::debug!(
            statement_timeout_ms = config.statement_timeout_ms,
            lock_timeout_ms = config.lock_timeout_ms,
            "postgres session configured"
        );
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))
    }

    fn batch(&mut self, sql: &str) -> Result<()> {
        self.client()?.batch_execute(sql).map_err(map_err)
    }

    fn rows(&mut self, sql: &str, params: &[Value<'_>]) -> Result<(Statement, Vec<Row>)> {
        let binds: Vec<PgParam<'_>> = params.iter().copied().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = binds
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let client = self.client()?;
        let stmt = client.prepare(sql).map_err(map_err)?;
        let rows = client.query(&stmt, &refs).map_err(map_err)?;
        Ok((stmt, rows))
    }
}

impl Backend for PgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn close(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.close().map_err(map_err),
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
        let binds: Vec<PgParam<'_>> = params.iter().copied().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = binds
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        self.client()?.execute(sql, &refs).map_err(map_err)
    }

    fn execute_returning_id(&mut self, sql: &str, params: &[Value<'_>]) -> Result<i64> {
        let (_, rows) = self.rows(sql, params)?;
        let row = rows.first().ok_or_else(|| {
            Error::database(
                ErrorKind::Internal,
                None,
                "insert returned no key; add RETURNING to the statement",
            )
        })?;
        let column = row.columns().first().ok_or_else(|| {
            Error::database(ErrorKind::Internal, None, "RETURNING produced no columns")
        })?;
        match decode(row, 0, column.type_())? {
            Cell::Int(id) => Ok(id),
            other => Err(Error::TypeMismatch {
                index: 0,
                expected: "i64",
                actual: other.type_name(),
            }),
        }
    }

    fn query(&mut self, sql: &str, params: &[Value<'_>]) -> Result<Box<dyn ResultSet>> {
        let (stmt, rows) = self.rows(sql, params)?;
        let columns: Vec<ColumnInfo> = stmt
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name(), c.type_().name()))
            .collect();

        let cells = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| decode(row, i, c.type_()))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(BufferedRows::new(columns, cells)))
    }

    fn failure_aborts_transaction(&self) -> bool {
        true
    }
}
