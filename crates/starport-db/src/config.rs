//! Connection configuration
//!
//! A configuration names the backend kind plus a backend-specific target
//! (connection URL / conninfo for PostgreSQL, file path for SQLite) and a
//! handful of session tunables that are applied once when the connection
//! is opened.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default bound for a compiled statement, in bytes
pub const DEFAULT_MAX_STATEMENT_LEN: usize = 16 * 1024;

/// Backend kind selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
    /// MySQL/MariaDB (not implemented)
    #[serde(alias = "mariadb")]
    MySql,
}

impl BackendKind {
    /// Stable lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::Sqlite => write!(f, "SQLite"),
            Self::MySql => write!(f, "MySQL"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(Error::config(format!("unknown backend kind '{}'", other))),
        }
    }
}

/// Configuration for opening a connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Backend kind
    pub backend: BackendKind,
    /// Connection URL / conninfo (PostgreSQL) or database file path (SQLite)
    pub target: String,
    /// Connect timeout in milliseconds (0 = backend default)
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds (0 = none)
    pub statement_timeout_ms: u64,
    /// Lock wait timeout in milliseconds (0 = backend default)
    pub lock_timeout_ms: u64,
    /// Application name reported to the server
    pub application_name: Option<String>,
    /// Statements running at least this long are logged (0 = disabled)
    pub slow_query_threshold_ms: u64,
    /// Upper bound for a compiled statement, in bytes
    pub max_statement_len: usize,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("target", &self.redacted_target())
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("lock_timeout_ms", &self.lock_timeout_ms)
            .field("application_name", &self.application_name)
            .field("slow_query_threshold_ms", &self.slow_query_threshold_ms)
            .field("max_statement_len", &self.max_statement_len)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            target: String::new(),
            connect_timeout_ms: 10_000,
            statement_timeout_ms: 0,
            lock_timeout_ms: 5_000,
            application_name: Some("starport".into()),
            slow_query_threshold_ms: 250,
            max_statement_len: DEFAULT_MAX_STATEMENT_LEN,
        }
    }
}

impl ConnectionConfig {
    /// Create configuration for a backend and target
    pub fn new(backend: BackendKind, target: impl Into<String>) -> Self {
        Self {
            backend,
            target: target.into(),
            ..Default::default()
        }
    }

    /// PostgreSQL configuration from a URL or conninfo string
    pub fn postgres(target: impl Into<String>) -> Self {
        Self::new(BackendKind::Postgres, target)
    }

    /// SQLite configuration from a file path (`:memory:` for a private in-memory database)
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(BackendKind::Sqlite, path)
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set statement timeout
    pub fn with_statement_timeout(mut self, ms: u64) -> Self {
        self.statement_timeout_ms = ms;
        self
    }

    /// Set lock wait timeout
    pub fn with_lock_timeout(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    /// Set application name
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Set slow query threshold
    pub fn with_slow_query_threshold(mut self, ms: u64) -> Self {
        self.slow_query_threshold_ms = ms;
        self
    }

    /// Set the compiled statement bound
    pub fn with_max_statement_len(mut self, len: usize) -> Self {
        self.max_statement_len = len;
        self
    }

    /// Check the configuration before any backend is contacted
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::config(format!(
                "missing connection target for {}",
                self.backend
            )));
        }
        if self.max_statement_len == 0 {
            return Err(Error::config("max_statement_len must be greater than zero"));
        }
        if let Some(name) = &self.application_name {
            if name.contains('\0') {
                return Err(Error::config("application_name contains a NUL byte"));
            }
        }
        Ok(())
    }

    /// Target with any password replaced, safe for logs
    pub fn redacted_target(&self) -> String {
        match self.backend {
            BackendKind::Sqlite => self.target.clone(),
            BackendKind::Postgres | BackendKind::MySql => match url::Url::parse(&self.target) {
                Ok(mut parsed) => {
                    if parsed.password().is_some() {
                        let _ = parsed.set_password(Some("***"));
                    }
                    parsed.to_string()
                }
                Err(_) if self.target.contains("password") => "***".to_string(),
                Err(_) => self.target.clone(),
            },
        }
    }
}
