//! # starport-db
//!
//! Portable database access for the Starport game server.
//!
//! Feature modules write one dialect-neutral statement with numbered
//! placeholders and run it against whichever backend the server was
//! configured with:
//!
//! - **Connection**: open/close, nested transactions, execute and query
//! - **Template compiler**: `{N}` placeholders retargeted to `$N`, `?N` or `?`
//! - **Dialect fragments**: time, upsert, locking and JSON snippets per backend
//! - **Error classification**: native codes bucketed into a retry-relevant [`ErrorKind`]
//! - **Optimistic upsert**: update, insert, retry the update once on conflict
//!
//! ## Quick Start
//!
//! ```no_run
//! use starport_db::prelude::*;
//!
//! # fn main() -> starport_db::Result<()> {
//! let mut conn = Connection::open(ConnectionConfig::sqlite("starport.db"))?;
//!
//! conn.transaction(|conn| {
//!     conn.execute(
//!         "UPDATE ships SET hull = hull - {2} WHERE id = {1}",
//!         &[Value::Int64(17), Value::Int32(40)],
//!     )
//! })?;
//!
//! let mut cursor = conn.query("SELECT id, name FROM ships WHERE owner = {1}", &[Value::Int64(3)])?;
//! while cursor.advance()? {
//!     println!("{} {}", cursor.get_i64(0)?, cursor.get_text(1)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL support via the blocking `postgres` client (default)
//! - `sqlite` - SQLite support via rusqlite (default)
//!
//! MySQL is always present as a stub whose operations report
//! [`ErrorKind::NotImplemented`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod classify;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod mysql;
pub mod template;
pub mod types;
pub mod upsert;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{BackendKind, ConnectionConfig};
    pub use crate::connection::{Backend, Connection, ConnectionStats};
    pub use crate::cursor::Cursor;
    pub use crate::dialect::{dialect_for, SqlDialect};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::template::{CompiledSql, PlaceholderStyle, TemplateCompiler};
    pub use crate::types::Value;
    pub use crate::upsert::{Upsert, UpsertOutcome};
}

pub use config::{BackendKind, ConnectionConfig};
pub use connection::{Connection, ConnectionStats};
pub use cursor::Cursor;
pub use error::{Error, ErrorKind, Result};
pub use types::Value;
pub use upsert::{Upsert, UpsertOutcome};

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _value = Value::Int32(42);
        let config = ConnectionConfig::postgres("postgres://localhost/starport");
        assert_eq!(config.backend, BackendKind::Postgres);
    }

    #[test]
    fn test_dialect_matches_compiler() {
        for kind in [BackendKind::Postgres, BackendKind::Sqlite, BackendKind::MySql] {
            let compiler = TemplateCompiler::new(dialect_for(kind).placeholder_style());
            let out = compiler.compile("SELECT {1}").unwrap();
            assert_eq!(out.placeholders(), &[1]);
        }
    }

    #[test]
    fn test_open_mysql_is_not_implemented() {
        let err = Connection::open(ConnectionConfig::new(BackendKind::MySql, "mysql://db/game"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_open_sqlite_memory() {
        let mut conn = Connection::open(ConnectionConfig::sqlite(":memory:")).unwrap();
        let mut cursor = conn.query("SELECT {1} + {2}", &[Value::Int32(2), Value::Int32(3)]).unwrap();
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.get_i64(0).unwrap(), 5);
    }
}
