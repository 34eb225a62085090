//! MySQL backend stub
//!
//! The dialect and error classifier for MySQL are complete, so templates
//! and fragments can be checked against it, but no driver is wired in.
//! Opening a MySQL connection fails with [`Error::NotImplemented`], and a
//! [`MySqlBackend`] handed to [`Connection::with_backend`] fails every
//! operation the same way.
//!
//! [`Connection::with_backend`]: crate::Connection::with_backend

use crate::config::{BackendKind, ConnectionConfig};
use crate::connection::Backend;
use crate::cursor::ResultSet;
use crate::error::{Error, Result};
use crate::types::Value;

/// Open a MySQL session
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Backend>> {
    tracing::warn!(
        target_url = %config.redacted_target(),
        "MySQL backend requested but not implemented"
    );
    Err(Error::not_implemented(BackendKind::MySql, "open"))
}

/// Backend whose every operation reports not-implemented
#[derive(Debug, Default)]
pub struct MySqlBackend;

impl MySqlBackend {
    fn stub<T>(operation: &'static str) -> Result<T> {
        Err(Error::not_implemented(BackendKind::MySql, operation))
    }
}

impl Backend for MySqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        Self::stub("begin")
    }

    fn commit(&mut self) -> Result<()> {
        Self::stub("commit")
    }

    fn rollback(&mut self) -> Result<()> {
        Self::stub("rollback")
    }

    fn execute_affected(&mut self, _sql: &str, _params: &[Value<'_>]) -> Result<u64> {
        Self::stub("execute")
    }

    fn execute_returning_id(&mut self, _sql: &str, _params: &[Value<'_>]) -> Result<i64> {
        Self::stub("execute_returning_id")
    }

    fn query(&mut self, _sql: &str, _params: &[Value<'_>]) -> Result<Box<dyn ResultSet>> {
        Self::stub("query")
    }
}
