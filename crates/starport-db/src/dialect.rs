//! SQL dialect fragments for starport-db
//!
//! Call sites splice backend-specific snippets into otherwise neutral
//! templates through these lookups instead of inlining them:
//! - SqlDialect: Trait for database-specific fragments
//! - Time expressions (now, epoch seconds, timestamp to epoch)
//! - Conflict handling (insert-ignore, do-nothing, upsert clause)
//! - Row locking and JSON builder function names
//!
//! A fragment the backend cannot express returns [`Error::Unsupported`]
//! rather than falling back to another backend's syntax.

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::ident::Ident;
use crate::template::PlaceholderStyle;

/// SQL dialect for vendor-specific fragments
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Backend this dialect belongs to
    fn kind(&self) -> BackendKind;

    /// Native positional parameter syntax
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Rewrite a complete `INSERT ...` statement so a row that conflicts
    /// with an existing key is skipped instead of failing
    fn insert_ignore(&self, insert: &str) -> Result<String>;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Get the boolean literal
    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Current timestamp expression
    fn now(&self) -> Result<&'static str>;

    /// Current time as integer seconds since the Unix epoch
    fn epoch_now(&self) -> Result<&'static str>;

    /// Convert a timestamp expression to integer epoch seconds
    fn to_epoch(&self, expr: &str) -> Result<String>;

    /// Clause appended to an INSERT to silently skip conflicting rows
    fn on_conflict_do_nothing(&self) -> Result<&'static str>;

    /// Clause appended to an INSERT to update `update_columns` on conflict
    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> Result<String>;

    /// Clause appended to a SELECT to lock the returned rows exclusively
    fn row_lock_clause(&self) -> Result<&'static str>;

    /// Function building a JSON object from key/value pairs
    fn json_object_fn(&self) -> Result<&'static str>;

    /// Aggregate function collecting values into a JSON array
    fn json_array_agg_fn(&self) -> Result<&'static str>;
}

/// Text after a leading `INSERT` keyword
fn after_insert_keyword(insert: &str) -> Result<&str> {
    let trimmed = insert.trim_start();
    match (trimmed.get(..6), trimmed.get(6..)) {
        (Some(head), Some(rest))
            if head.eq_ignore_ascii_case("INSERT") && rest.starts_with(char::is_whitespace) =>
        {
            Ok(rest)
        }
        _ => Err(Error::config("insert-ignore needs a statement starting with INSERT")),
    }
}

fn check_identifiers(columns: &[&str]) -> Result<()> {
    columns.iter().try_for_each(|c| Ident::new(c).map(drop))
}

/// `ON CONFLICT (..) DO UPDATE SET c = <excluded>.c`, shared by PostgreSQL and SQLite
fn on_conflict_update(
    dialect: &dyn SqlDialect,
    excluded: &str,
    conflict_columns: &[&str],
    update_columns: &[&str],
) -> Result<String> {
    if conflict_columns.is_empty() {
        return Err(Error::config("upsert clause needs at least one conflict column"));
    }
    if update_columns.is_empty() {
        return Err(Error::config("upsert clause needs at least one update column"));
    }
    check_identifiers(conflict_columns)?;
    check_identifiers(update_columns)?;

    let target: Vec<_> = conflict_columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect();
    let assignments: Vec<_> = update_columns
        .iter()
        .map(|c| {
            let col = dialect.quote_identifier(c);
            format!("{} = {}.{}", col, excluded, col)
        })
        .collect();

    Ok(format!(
        "ON CONFLICT ({}) DO UPDATE SET {}",
        target.join(", "),
        assignments.join(", ")
    ))
}

// ===========================================================================
// PostgreSQL
// ===========================================================================

/// PostgreSQL dialect
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn now(&self) -> Result<&'static str> {
        Ok("NOW()")
    }

    fn epoch_now(&self) -> Result<&'static str> {
        Ok("CAST(EXTRACT(EPOCH FROM NOW()) AS BIGINT)")
    }

    fn to_epoch(&self, expr: &str) -> Result<String> {
        Ok(format!("CAST(EXTRACT(EPOCH FROM {}) AS BIGINT)", expr))
    }

    fn on_conflict_do_nothing(&self) -> Result<&'static str> {
        Ok("ON CONFLICT DO NOTHING")
    }

    fn insert_ignore(&self, insert: &str) -> Result<String> {
        after_insert_keyword(insert)?;
        Ok(format!("{} ON CONFLICT DO NOTHING", insert.trim_end()))
    }

    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> Result<String> {
        on_conflict_update(self, "EXCLUDED", conflict_columns, update_columns)
    }

    fn row_lock_clause(&self) -> Result<&'static str> {
        Ok("FOR UPDATE")
    }

    fn json_object_fn(&self) -> Result<&'static str> {
        Ok("json_build_object")
    }

    fn json_array_agg_fn(&self) -> Result<&'static str> {
        Ok("json_agg")
    }
}

// ===========================================================================
// SQLite
// ===========================================================================

/// SQLite dialect
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionNumbered
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn now(&self) -> Result<&'static str> {
        Ok("CURRENT_TIMESTAMP")
    }

    fn epoch_now(&self) -> Result<&'static str> {
        Ok("CAST(strftime('%s', 'now') AS INTEGER)")
    }

    fn to_epoch(&self, expr: &str) -> Result<String> {
        Ok(format!("CAST(strftime('%s', {}) AS INTEGER)", expr))
    }

    fn on_conflict_do_nothing(&self) -> Result<&'static str> {
        Ok("ON CONFLICT DO NOTHING")
    }

    fn insert_ignore(&self, insert: &str) -> Result<String> {
        Ok(format!("INSERT OR IGNORE{}", after_insert_keyword(insert)?))
    }

    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> Result<String> {
        on_conflict_update(self, "excluded", conflict_columns, update_columns)
    }

    fn row_lock_clause(&self) -> Result<&'static str> {
        // the whole database is locked by the write transaction instead
        Err(Error::unsupported(BackendKind::Sqlite, "row-level locking"))
    }

    fn json_object_fn(&self) -> Result<&'static str> {
        Ok("json_object")
    }

    fn json_array_agg_fn(&self) -> Result<&'static str> {
        Ok("json_group_array")
    }
}

// ===========================================================================
// MySQL
// ===========================================================================

/// MySQL dialect
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn now(&self) -> Result<&'static str> {
        Ok("NOW()")
    }

    fn epoch_now(&self) -> Result<&'static str> {
        Ok("UNIX_TIMESTAMP()")
    }

    fn to_epoch(&self, expr: &str) -> Result<String> {
        Ok(format!("UNIX_TIMESTAMP({})", expr))
    }

    fn on_conflict_do_nothing(&self) -> Result<&'static str> {
        // no trailing form; insert_ignore rewrites the keyword instead
        Err(Error::unsupported(BackendKind::MySql, "ON CONFLICT DO NOTHING"))
    }

    fn insert_ignore(&self, insert: &str) -> Result<String> {
        Ok(format!("INSERT IGNORE{}", after_insert_keyword(insert)?))
    }

    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> Result<String> {
        if !conflict_columns.is_empty() {
            return Err(Error::unsupported(
                BackendKind::MySql,
                "explicit conflict target",
            ));
        }
        if update_columns.is_empty() {
            return Err(Error::config("upsert clause needs at least one update column"));
        }
        check_identifiers(update_columns)?;

        let assignments: Vec<_> = update_columns
            .iter()
            .map(|c| {
                let col = self.quote_identifier(c);
                format!("{} = VALUES({})", col, col)
            })
            .collect();
        Ok(format!("ON DUPLICATE KEY UPDATE {}", assignments.join(", ")))
    }

    fn row_lock_clause(&self) -> Result<&'static str> {
        Ok("FOR UPDATE")
    }

    fn json_object_fn(&self) -> Result<&'static str> {
        Ok("JSON_OBJECT")
    }

    fn json_array_agg_fn(&self) -> Result<&'static str> {
        Ok("JSON_ARRAYAGG")
    }
}

/// Get the dialect for a backend kind
pub fn dialect_for(kind: BackendKind) -> &'static dyn SqlDialect {
    match kind {
        BackendKind::Postgres => &PostgresDialect,
        BackendKind::Sqlite => &SqliteDialect,
        BackendKind::MySql => &MySqlDialect,
    }
}
