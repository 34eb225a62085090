//! Connections for starport-db
//!
//! Core abstractions for database access:
//! - Backend: per-backend capability table (one implementation per store)
//! - Connection: owns a backend, compiles templates, tracks transaction nesting
//!
//! Execution is blocking. A connection is not internally synchronized; use
//! one per thread or guard it externally.

use std::time::{Duration, Instant};

use crate::config::{BackendKind, ConnectionConfig};
use crate::cursor::{Cursor, ResultSet};
use crate::dialect::{dialect_for, SqlDialect};
use crate::error::{Error, Result};
use crate::ident::Ident;
use crate::template::{CompiledSql, TemplateCompiler};
use crate::types::Value;
use crate::upsert::{Upsert, UpsertOutcome};

/// Capability table implemented by each backend.
///
/// Statements reaching a backend are already compiled to its native
/// placeholder syntax and binds are already arranged.
pub trait Backend: Send {
    /// Backend kind
    fn kind(&self) -> BackendKind;

    /// Release the native handle; later calls fail
    fn close(&mut self) -> Result<()>;

    /// Start a physical transaction
    fn begin(&mut self) -> Result<()>;

    /// Commit the physical transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the physical transaction
    fn rollback(&mut self) -> Result<()>;

    /// Execute a statement that returns no rows
    fn execute(&mut self, sql: &str, params: &[Value<'_>]) -> Result<()> {
        self.execute_affected(sql, params).map(|_| ())
    }

    /// Execute a statement, returning the number of rows it touched
    fn execute_affected(&mut self, sql: &str, params: &[Value<'_>]) -> Result<u64>;

    /// Execute an INSERT, returning the generated key
    fn execute_returning_id(&mut self, sql: &str, params: &[Value<'_>]) -> Result<i64>;

    /// Run a query, returning its result set
    fn query(&mut self, sql: &str, params: &[Value<'_>]) -> Result<Box<dyn ResultSet>>;

    /// Whether a failed statement poisons the open transaction until rolled back
    fn failure_aborts_transaction(&self) -> bool {
        false
    }

    /// Create a savepoint
    fn savepoint(&mut self, name: &str) -> Result<()> {
        let name = Ident::bare(name)?;
        self.execute(&format!("SAVEPOINT {}", name), &[])
    }

    /// Rollback to a savepoint
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let name = Ident::bare(name)?;
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name), &[])
    }

    /// Release a savepoint
    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let name = Ident::bare(name)?;
        self.execute(&format!("RELEASE SAVEPOINT {}", name), &[])
    }
}

/// Per-connection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Statements sent to the backend
    pub statements: u64,
    /// Statements that failed
    pub failures: u64,
    /// Statements at or above the slow query threshold
    pub slow_statements: u64,
    /// Physical commits
    pub commits: u64,
    /// Physical rollbacks
    pub rollbacks: u64,
    /// Upserts that lost the insert race and retried their update
    pub upsert_retries: u64,
}

/// An open database session
pub struct Connection {
    config: ConnectionConfig,
    kind: BackendKind,
    backend: Option<Box<dyn Backend>>,
    compiler: TemplateCompiler,
    compiled: CompiledSql,
    depth: u32,
    stats: ConnectionStats,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("closed", &self.backend.is_none())
            .field("depth", &self.depth)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Connection {
    /// Validate the configuration and open a backend session
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let backend: Box<dyn Backend> = match config.backend {
            #[cfg(feature = "postgres")]
            BackendKind::Postgres => Box::new(crate::postgres::PgBackend::connect(&config)?),
            #[cfg(feature = "sqlite")]
            BackendKind::Sqlite => Box::new(crate::sqlite::SqliteBackend::open(&config)?),
            BackendKind::MySql => crate::mysql::connect(&config)?,
            #[allow(unreachable_patterns)]
            other => {
                return Err(Error::config(format!(
                    "{} support is not compiled into this build",
                    other
                )))
            }
        };

        tracing::info!(
            backend = %config.backend,
            target = %config.redacted_target(),
            "database connection opened"
        );
        Ok(Self::with_backend(config, backend))
    }

    /// Wrap an already-open backend
    pub fn with_backend(config: ConnectionConfig, backend: Box<dyn Backend>) -> Self {
        let kind = backend.kind();
        let compiler = TemplateCompiler::new(dialect_for(kind).placeholder_style())
            .with_limit(config.max_statement_len);
        Self {
            config,
            kind,
            backend: Some(backend),
            compiler,
            compiled: CompiledSql::default(),
            depth: 0,
            stats: ConnectionStats::default(),
        }
    }

    /// Close the session, releasing the backend handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        match self.backend.take() {
            Some(mut backend) => {
                self.depth = 0;
                let result = backend.close();
                tracing::info!(backend = %self.kind, "database connection closed");
                result
            }
            None => Ok(()),
        }
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Backend kind
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Dialect fragments for this connection's backend
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        dialect_for(self.kind)
    }

    /// Configuration the connection was opened with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current transaction nesting depth
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Counters since open
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Begin a transaction. Nested calls only deepen the nesting.
    pub fn begin(&mut self) -> Result<()> {
        if self.depth == 0 {
            self.backend_mut()?.begin()?;
        }
        self.depth += 1;
        tracing::trace!(depth = self.depth, "begin");
        Ok(())
    }

    /// Commit a transaction. Only the outermost commit reaches the backend.
    pub fn commit(&mut self) -> Result<()> {
        match self.depth {
            0 => Err(Error::transaction("commit without an open transaction")),
            1 => {
                self.backend_mut()?.commit()?;
                self.depth = 0;
                self.stats.commits += 1;
                tracing::trace!(depth = 0, "commit");
                Ok(())
            }
            _ => {
                self.depth -= 1;
                tracing::trace!(depth = self.depth, "nested commit");
                Ok(())
            }
        }
    }

    /// Roll back whatever is open and reset nesting to zero.
    ///
    /// Safe to call at any depth, including zero.
    pub fn rollback(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Ok(());
        }
        let from = self.depth;
        self.depth = 0;
        self.stats.rollbacks += 1;
        tracing::trace!(from, "rollback");
        self.backend_mut()?.rollback()
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(e) => {
                    if let Err(rollback) = self.rollback() {
                        tracing::warn!(error = %rollback, "rollback after failed commit failed");
                    }
                    Err(e)
                }
            },
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed transaction failed");
                }
                Err(e)
            }
        }
    }

    /// Execute a template that returns no rows
    pub fn execute(&mut self, template: &str, params: &[Value<'_>]) -> Result<()> {
        self.run(template, params, |backend, sql, binds| {
            backend.execute(sql, binds)
        })
    }

    /// Execute a template, returning the number of rows it touched
    pub fn execute_affected(&mut self, template: &str, params: &[Value<'_>]) -> Result<u64> {
        self.run(template, params, |backend, sql, binds| {
            backend.execute_affected(sql, binds)
        })
    }

    /// Execute an INSERT template, returning the generated key.
    ///
    /// On PostgreSQL the template must end in `RETURNING <key>`; SQLite
    /// reports the last inserted rowid.
    pub fn execute_returning_id(&mut self, template: &str, params: &[Value<'_>]) -> Result<i64> {
        self.run(template, params, |backend, sql, binds| {
            backend.execute_returning_id(sql, binds)
        })
    }

    /// Run a query template. The cursor borrows the connection until dropped.
    pub fn query(&mut self, template: &str, params: &[Value<'_>]) -> Result<Cursor<'_>> {
        let rows = self.run(template, params, |backend, sql, binds| {
            backend.query(sql, binds)
        })?;
        Ok(Cursor::new(rows))
    }

    /// Update-then-insert with a single retried update on insert conflict
    pub fn upsert(
        &mut self,
        update: &str,
        insert: &str,
        params: &[Value<'_>],
    ) -> Result<UpsertOutcome> {
        Upsert::new(update, insert).binds(params).execute(self)
    }

    pub(crate) fn note_upsert_retry(&mut self) {
        self.stats.upsert_retries += 1;
    }

    pub(crate) fn failure_aborts_transaction(&self) -> bool {
        self.backend
            .as_ref()
            .is_some_and(|b| b.failure_aborts_transaction())
    }

    pub(crate) fn savepoint(&mut self, name: &str) -> Result<()> {
        self.backend_mut()?.savepoint(name)
    }

    pub(crate) fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.backend_mut()?.rollback_to_savepoint(name)
    }

    pub(crate) fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.backend_mut()?.release_savepoint(name)
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn Backend>> {
        self.backend
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))
    }

    fn run<T, F>(&mut self, template: &str, params: &[Value<'_>], op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Backend, &str, &[Value<'_>]) -> Result<T>,
    {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))?;

        self.compiler.compile_into(template, &mut self.compiled)?;
        let binds = self
            .compiled
            .arrange_binds(self.compiler.style(), params)?;

        let sql = self.compiled.sql();
        let started = Instant::now();
        let result = op(backend.as_mut(), sql, &binds);
        let elapsed = started.elapsed();

        self.stats.statements += 1;
        tracing::debug!(
            backend = %self.kind,
            elapsed_us = elapsed.as_micros() as u64,
            ok = result.is_ok(),
            sql,
            "statement"
        );

        let threshold = self.config.slow_query_threshold_ms;
        if threshold > 0 && elapsed >= Duration::from_millis(threshold) {
            self.stats.slow_statements += 1;
            tracing::warn!(
                backend = %self.kind,
                elapsed_ms = elapsed.as_millis() as u64,
                sql,
                "slow statement"
            );
        }

        result.map_err(|e| {
            self.stats.failures += 1;
            e.with_sql(sql)
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.depth > 0 {
            tracing::warn!(depth = self.depth, "connection dropped with open transaction");
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "error closing connection on drop");
        }
    }
}
