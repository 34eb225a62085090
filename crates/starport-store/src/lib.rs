//! # starport-store
//!
//! Per-feature data access for the Starport game server, written against
//! the portable [`starport_db`] connection surface only:
//!
//! - [`players`]: create, look up, stamp logins
//! - [`bank`]: deposits through the optimistic upsert, locked withdrawals
//! - [`subscriptions`]: chat channel membership
//! - [`schema`]: table creation for SQLite and PostgreSQL
//!
//! Constraint violations on plain inserts mean "not applicable" (an
//! existing subscription, a taken name). Transient failures are returned
//! for the caller to report as temporary; see [`StoreError::is_transient`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bank;
pub mod error;
pub mod players;
pub mod schema;
pub mod subscriptions;

pub use error::{StoreError, StoreResult};
pub use players::Player;
