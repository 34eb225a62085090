//! Error types for starport-db
//!
//! Every failure carries a classified [`ErrorKind`]; callers branch on the
//! kind only. Native backend codes are retained in [`NativeCode`] for
//! diagnostics and must not drive control flow:
//! - Transient errors (lock wait, serialization conflict, busy) may be retried
//! - Constraint violations signal "already exists" and drive the upsert retry
//! - Everything else is surfaced as fatal

use std::fmt;
use thiserror::Error;

use crate::config::BackendKind;

/// Result type for starport-db operations
pub type Result<T> = std::result::Result<T, Error>;

/// Generic error taxonomy shared by all backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lock-wait timeout, serialization conflict, deadlock, busy/locked database
    Transient,
    /// Unique, foreign-key, not-null or check constraint violated
    Constraint,
    /// Authentication or privilege failure
    Authorization,
    /// Malformed SQL or reference to an unknown object
    Syntax,
    /// Connection could not be established or was lost
    Connection,
    /// Invalid configuration supplied by the caller
    Configuration,
    /// Operation not available on this backend
    NotImplemented,
    /// Anything else, including unmapped native codes
    Internal,
}

impl ErrorKind {
    /// Whether errors of this kind may succeed when retried
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Short stable label for logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Constraint => "constraint",
            Self::Authorization => "authorization",
            Self::Syntax => "syntax",
            Self::Connection => "connection",
            Self::Configuration => "configuration",
            Self::NotImplemented => "not_implemented",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-native status code, kept for diagnostics only
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeCode {
    /// PostgreSQL SQLSTATE (five characters)
    SqlState(String),
    /// SQLite primary and extended result codes
    Sqlite {
        /// Primary result code (low byte of the extended code)
        primary: i32,
        /// Extended result code
        extended: i32,
    },
    /// MySQL server or client error number
    MySql(u16),
}

impl fmt::Display for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SqlState(state) => write!(f, "SQLSTATE {}", state),
            Self::Sqlite { primary, extended } => {
                write!(f, "sqlite {} (extended {})", primary, extended)
            }
            Self::MySql(code) => write!(f, "mysql {}", code),
        }
    }
}

/// Main error type for starport-db
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Backend reported a failure; `kind` is the classified bucket
    #[error("{kind} error: {message}")]
    Database {
        kind: ErrorKind,
        native: Option<NativeCode>,
        message: String,
        sql: Option<String>,
    },

    /// Connection failed or is unusable
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Name cannot be written into statement text
    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// Transaction nesting misuse
    #[error("transaction error: {message}")]
    Transaction { message: String },

    /// Compiled template would exceed the output bound
    #[error("compiled statement exceeds {limit} bytes")]
    TemplateOverflow { limit: usize },

    /// Template references a bind that was not supplied
    #[error("template references bind {{{index}}} but only {supplied} supplied")]
    MissingBind { index: usize, supplied: usize },

    /// Column index outside the result's column range
    #[error("column {index} out of range ({count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    /// Column value is NULL
    #[error("column {index} is null")]
    NullValue { index: usize },

    /// Column value cannot be represented as the requested type
    #[error("column {index}: cannot read {actual} as {expected}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// Accessor called before the first advance or after exhaustion
    #[error("cursor is not positioned on a row")]
    NoCurrentRow,

    /// Bind value cannot be encoded for the target backend
    #[error("cannot bind {value}: {message}")]
    Bind {
        value: &'static str,
        message: String,
    },

    /// Dialect fragment not supported by the backend
    #[error("{feature} is not supported by {backend}")]
    Unsupported {
        backend: BackendKind,
        feature: &'static str,
    },

    /// Backend exists only as a stub
    #[error("{operation} is not implemented for {backend}")]
    NotImplemented {
        backend: BackendKind,
        operation: &'static str,
    },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the classified error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database { kind, .. } => *kind,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Configuration { .. } | Self::InvalidIdentifier { .. } => {
                ErrorKind::Configuration
            }
            Self::Unsupported { .. } | Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Transaction { .. }
            | Self::TemplateOverflow { .. }
            | Self::MissingBind { .. }
            | Self::ColumnOutOfRange { .. }
            | Self::NullValue { .. }
            | Self::TypeMismatch { .. }
            | Self::NoCurrentRow
            | Self::Bind { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this error may succeed when retried
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }

    /// Whether this error is a constraint violation ("already exists")
    #[inline]
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == ErrorKind::Constraint
    }

    /// Native backend code, if the failure came from a backend
    pub fn native_code(&self) -> Option<&NativeCode> {
        match self {
            Self::Database { native, .. } => native.as_ref(),
            _ => None,
        }
    }

    /// Create a classified backend error
    pub fn database(
        kind: ErrorKind,
        native: Option<NativeCode>,
        message: impl Into<String>,
    ) -> Self {
        Self::Database {
            kind,
            native,
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the failing SQL text to a backend error
    pub fn with_sql(self, statement: &str) -> Self {
        match self {
            Self::Database {
                kind,
                native,
                message,
                ..
            } => Self::Database {
                kind,
                native,
                message,
                sql: Some(statement.to_string()),
            },
            other => other,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a bind encoding error
    pub fn bind(value: &'static str, message: impl Into<String>) -> Self {
        Self::Bind {
            value,
            message: message.into(),
        }
    }

    /// Create an unsupported fragment error
    pub fn unsupported(backend: BackendKind, feature: &'static str) -> Self {
        Self::Unsupported { backend, feature }
    }

    /// Create a not-implemented error
    pub fn not_implemented(backend: BackendKind, operation: &'static str) -> Self {
        Self::NotImplemented { backend, operation }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
