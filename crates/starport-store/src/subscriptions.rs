//! Chat channel subscriptions

use starport_db::{Connection, Value};

use crate::error::StoreResult;

/// Subscribe a player to a channel.
///
/// Returns `Ok(false)` when the player was already subscribed or the
/// player does not exist.
pub fn subscribe(conn: &mut Connection, player_id: i64, channel: &str) -> StoreResult<bool> {
    let sql = conn.dialect().insert_ignore(
        "INSERT INTO channel_subscriptions (player_id, channel) VALUES ({1}, {2})",
    )?;
    let result = conn.execute_affected(&sql, &[Value::Int64(player_id), Value::Text(channel)]);
    match result {
        Ok(0) => {
            tracing::debug!(player_id, channel, "already subscribed");
            Ok(false)
        }
        Ok(_) => Ok(true),
        // foreign keys are not covered by insert-ignore
        Err(e) if e.is_constraint_violation() => {
            tracing::debug!(player_id, channel, error = %e, "subscription rejected");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a subscription; `Ok(false)` if there was none
pub fn unsubscribe(conn: &mut Connection, player_id: i64, channel: &str) -> StoreResult<bool> {
    let removed = conn.execute_affected(
        "DELETE FROM channel_subscriptions WHERE player_id = {1} AND channel = {2}",
        &[Value::Int64(player_id), Value::Text(channel)],
    )?;
    Ok(removed > 0)
}

/// Channels the player is subscribed to, by name
pub fn list(conn: &mut Connection, player_id: i64) -> StoreResult<Vec<String>> {
    let mut cursor = conn.query(
        "SELECT channel FROM channel_subscriptions WHERE player_id = {1} ORDER BY channel",
        &[Value::Int64(player_id)],
    )?;
    let mut channels = Vec::with_capacity(cursor.row_count());
    while cursor.advance()? {
        channels.push(cursor.get_text(0)?.to_string());
    }
    Ok(channels)
}
