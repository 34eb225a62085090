//! Optimistic upsert
//!
//! 1. Run the UPDATE; if it touched any row, done.
//! 2. Otherwise run the INSERT; if it succeeds, done.
//! 3. If the INSERT failed with a constraint violation, a concurrent writer
//!    inserted the row first: run the UPDATE exactly once more and return
//!    its result, whatever it is. Any other INSERT failure is returned as is.
//!
//! This wins against one competing writer. With two or more simultaneous
//! racers the retried UPDATE can still lose; callers accept that.
//!
//! On backends where a failed statement aborts the open transaction the
//! INSERT runs under a savepoint so step 3 can still execute.

use crate::connection::Connection;
use crate::error::Result;
use crate::types::Value;

const INSERT_SAVEPOINT: &str = "starport_upsert";

/// How an upsert completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The first UPDATE touched `n` rows
    Updated(u64),
    /// No row matched and the INSERT succeeded
    Inserted,
    /// The INSERT lost a race; the retried UPDATE touched `n` rows
    RetriedUpdate(u64),
}

impl UpsertOutcome {
    /// Rows written by the statement that decided the outcome
    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::Updated(n) | Self::RetriedUpdate(n) => *n,
            Self::Inserted => 1,
        }
    }

    /// Whether the row was created by this call
    pub fn inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// An UPDATE/INSERT template pair with their binds
///
/// ```no_run
/// use starport_db::{Connection, ConnectionConfig, Upsert, Value};
///
/// # fn main() -> starport_db::Result<()> {
/// let mut conn = Connection::open(ConnectionConfig::sqlite("game.db"))?;
/// let outcome = Upsert::new(
///     "UPDATE bank_accounts SET balance = balance + {2} WHERE player_id = {1}",
///     "INSERT INTO bank_accounts (player_id, balance) VALUES ({1}, {2})",
/// )
/// .binds(&[Value::Int64(7), Value::Int64(500)])
/// .execute(&mut conn)?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Upsert<'a> {
    update: &'a str,
    insert: &'a str,
    update_binds: &'a [Value<'a>],
    insert_binds: &'a [Value<'a>],
}

impl<'a> Upsert<'a> {
    /// Create an upsert from an UPDATE and an INSERT template
    pub fn new(update: &'a str, insert: &'a str) -> Self {
        Self {
            update,
            insert,
            update_binds: &[],
            insert_binds: &[],
        }
    }

    /// Use one bind set for both statements
    pub fn binds(mut self, binds: &'a [Value<'a>]) -> Self {
        self.update_binds = binds;
        self.insert_binds = binds;
        self
    }

    /// Binds for the UPDATE only
    pub fn update_binds(mut self, binds: &'a [Value<'a>]) -> Self {
        self.update_binds = binds;
        self
    }

    /// Binds for the INSERT only
    pub fn insert_binds(mut self, binds: &'a [Value<'a>]) -> Self {
        self.insert_binds = binds;
        self
    }

    /// Run the protocol on `conn`
    pub fn execute(&self, conn: &mut Connection) -> Result<UpsertOutcome> {
        let updated = conn.execute_affected(self.update, self.update_binds)?;
        if updated > 0 {
            return Ok(UpsertOutcome::Updated(updated));
        }

        match self.insert(conn) {
            Ok(()) => Ok(UpsertOutcome::Inserted),
            Err(e) if e.is_constraint_violation() => {
                conn.note_upsert_retry();
                tracing::warn!(
                    backend = %conn.kind(),
                    error = %e,
                    "upsert insert lost a race, retrying update"
                );
                conn.execute_affected(self.update, self.update_binds)
                    .map(UpsertOutcome::RetriedUpdate)
            }
            Err(e) => Err(e),
        }
    }

    fn insert(&self, conn: &mut Connection) -> Result<()> {
        let guarded = conn.depth() > 0 && conn.failure_aborts_transaction();
        if !guarded {
            return conn.execute(self.insert, self.insert_binds);
        }

        conn.savepoint(INSERT_SAVEPOINT)?;
        match conn.execute(self.insert, self.insert_binds) {
            Ok(()) => conn.release_savepoint(INSERT_SAVEPOINT),
            Err(e) => {
                let restored = conn
                    .rollback_to_savepoint(INSERT_SAVEPOINT)
                    .and_then(|()| conn.release_savepoint(INSERT_SAVEPOINT));
                if let Err(restore) = restored {
                    tracing::warn!(
                        backend = %conn.kind(),
                        insert_error = %e,
                        error = %restore,
                        "could not restore savepoint after failed upsert insert"
                    );
                    return Err(restore);
                }
                Err(e)
            }
        }
    }
}
