//! Error types for starport-store

use starport_db::ErrorKind;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by feature stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row with the given key
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Lookup key
        key: String,
    },

    /// A row with the given key already exists
    #[error("{entity} already exists: {key}")]
    AlreadyExists {
        /// Entity kind
        entity: &'static str,
        /// Conflicting key
        key: String,
    },

    /// Withdrawal larger than the account balance
    #[error("insufficient funds for player {player_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account owner
        player_id: i64,
        /// Current balance
        balance: i64,
        /// Requested amount
        requested: i64,
    },

    /// Amount must be positive
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Database failure
    #[error(transparent)]
    Db(#[from] starport_db::Error),
}

impl StoreError {
    /// Whether the caller should report a temporary failure and may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(e) if e.kind() == ErrorKind::Transient)
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}
