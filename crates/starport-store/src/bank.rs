//! Player bank accounts
//!
//! Accounts are created lazily by the first deposit. A player without an
//! account has a balance of zero.

use starport_db::{Connection, ErrorKind, UpsertOutcome, Value};

use crate::error::{StoreError, StoreResult};

const DEPOSIT_UPDATE: &str = "UPDATE bank_accounts SET balance = balance + {2} WHERE player_id = {1}";
const DEPOSIT_INSERT: &str = "INSERT INTO bank_accounts (player_id, balance) VALUES ({1}, {2})";

/// Add `amount` to the player's account, opening it if needed.
///
/// Fails with [`StoreError::NotFound`] when no such player exists.
pub fn deposit(conn: &mut Connection, player_id: i64, amount: i64) -> StoreResult<UpsertOutcome> {
    if amount <= 0 {
        return Err(StoreError::InvalidAmount(amount));
    }
    let outcome = conn.upsert(
        DEPOSIT_UPDATE,
        DEPOSIT_INSERT,
        &[Value::Int64(player_id), Value::Int64(amount)],
    )?;
    // the insert lost to the players foreign key and the retry matched nothing
    if outcome.rows_affected() == 0 {
        return Err(StoreError::not_found("player", player_id));
    }
    tracing::debug!(player_id, amount, ?outcome, "deposit");
    Ok(outcome)
}

/// Current balance
pub fn balance(conn: &mut Connection, player_id: i64) -> StoreResult<i64> {
    let mut cursor = conn.query(
        "SELECT balance FROM bank_accounts WHERE player_id = {1}",
        &[Value::Int64(player_id)],
    )?;
    if cursor.advance()? {
        Ok(cursor.get_i64(0)?)
    } else {
        Ok(0)
    }
}

/// Take `amount` from the player's account, returning the new balance.
///
/// The balance is read under a row lock where the backend has one; SQLite
/// serializes writers at the database level instead.
pub fn withdraw(conn: &mut Connection, player_id: i64, amount: i64) -> StoreResult<i64> {
    if amount <= 0 {
        return Err(StoreError::InvalidAmount(amount));
    }

    let lock = match conn.dialect().row_lock_clause() {
        Ok(clause) => clause,
        Err(e) if e.kind() == ErrorKind::NotImplemented => "",
        Err(e) => return Err(e.into()),
    };
    let select = format!(
        "SELECT balance FROM bank_accounts WHERE player_id = {{1}} {}",
        lock
    );

    conn.begin()?;
    match withdraw_locked(conn, select.trim_end(), player_id, amount) {
        Ok(remaining) => {
            conn.commit()?;
            tracing::debug!(player_id, amount, remaining, "withdraw");
            Ok(remaining)
        }
        Err(e) => {
            if let Err(rollback) = conn.rollback() {
                tracing::warn!(player_id, error = %rollback, "withdraw rollback failed");
            }
            Err(e)
        }
    }
}

fn withdraw_locked(
    conn: &mut Connection,
    select: &str,
    player_id: i64,
    amount: i64,
) -> StoreResult<i64> {
    let current = {
        let mut cursor = conn.query(select, &[Value::Int64(player_id)])?;
        if cursor.advance()? {
            Some(cursor.get_i64(0)?)
        } else {
            None
        }
    };

    match current {
        None => Err(StoreError::not_found("bank account", player_id)),
        Some(balance) if balance < amount => Err(StoreError::InsufficientFunds {
            player_id,
            balance,
            requested: amount,
        }),
        Some(balance) => {
            conn.execute(
                "UPDATE bank_accounts SET balance = balance - {2} WHERE player_id = {1}",
                &[Value::Int64(player_id), Value::Int64(amount)],
            )?;
            Ok(balance - amount)
        }
    }
}
