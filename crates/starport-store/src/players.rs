//! Player accounts

use starport_db::{BackendKind, Connection, Cursor, Value};

use crate::error::{StoreError, StoreResult};

/// A player row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Player id
    pub id: i64,
    /// Unique display name
    pub name: String,
    /// Creation time, epoch seconds
    pub created_at: i64,
    /// Last login, epoch seconds
    pub last_login: Option<i64>,
}

impl Player {
    fn from_row(cursor: &Cursor<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: cursor.get_i64(0)?,
            name: cursor.get_text(1)?.to_string(),
            created_at: cursor.get_i64(2)?,
            last_login: if cursor.is_null(3)? {
                None
            } else {
                Some(cursor.get_i64(3)?)
            },
        })
    }
}

/// Create a player, returning the new id
pub fn create(conn: &mut Connection, name: &str) -> StoreResult<i64> {
    let mut sql = format!(
        "INSERT INTO players (name, created_at) VALUES ({{1}}, {})",
        conn.dialect().epoch_now()?
    );
    if conn.kind() == BackendKind::Postgres {
        sql.push_str(" RETURNING id");
    }

    match conn.execute_returning_id(&sql, &[Value::Text(name)]) {
        Ok(id) => {
            tracing::debug!(id, name, "player created");
            Ok(id)
        }
        Err(e) if e.is_constraint_violation() => Err(StoreError::AlreadyExists {
            entity: "player",
            key: name.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Look up a player by name
pub fn find_by_name(conn: &mut Connection, name: &str) -> StoreResult<Option<Player>> {
    let mut cursor = conn.query(
        "SELECT id, name, created_at, last_login FROM players WHERE name = {1}",
        &[Value::Text(name)],
    )?;
    if !cursor.advance()? {
        return Ok(None);
    }
    Player::from_row(&cursor).map(Some)
}

/// Stamp the player's last login with the current time
pub fn touch_login(conn: &mut Connection, id: i64) -> StoreResult<()> {
    let sql = format!(
        "UPDATE players SET last_login = {} WHERE id = {{1}}",
        conn.dialect().epoch_now()?
    );
    match conn.execute_affected(&sql, &[Value::Int64(id)])? {
        0 => Err(StoreError::not_found("player", id)),
        _ => Ok(()),
    }
}
