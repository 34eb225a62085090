//! Native status code classification
//!
//! Each backend reports failures in its own vocabulary. These functions
//! bucket a native code into [`ErrorKind`]; `None` means the code denotes
//! success. Unmapped failure codes fall into [`ErrorKind::Internal`].

use crate::error::ErrorKind;

/// Classify a PostgreSQL SQLSTATE
pub fn classify_sqlstate(state: &str) -> Option<ErrorKind> {
    if state.len() != 5 {
        return Some(ErrorKind::Internal);
    }

    let kind = match state {
        "00000" => return None,
        // serialization_failure, deadlock_detected, lock_not_available, query_canceled
        "40001" | "40P01" | "55P03" | "57014" => ErrorKind::Transient,
        // insufficient_privilege
        "42501" => ErrorKind::Authorization,
        // admin_shutdown, crash_shutdown, cannot_connect_now
        "57P01" | "57P02" | "57P03" => ErrorKind::Connection,
        _ => match state.get(..2) {
            Some("01" | "02") => return None,
            Some("08") => ErrorKind::Connection,
            Some("23") => ErrorKind::Constraint,
            Some("28") => ErrorKind::Authorization,
            Some("40" | "53") => ErrorKind::Transient,
            Some("42") => ErrorKind::Syntax,
            _ => ErrorKind::Internal,
        },
    };
    Some(kind)
}

/// SQLite primary result codes
pub mod sqlite_codes {
    /// Successful result
    pub const OK: i32 = 0;
    /// Generic error, most often a syntax error or missing object
    pub const ERROR: i32 = 1;
    /// Access permission denied
    pub const PERM: i32 = 3;
    /// The database file is locked
    pub const BUSY: i32 = 5;
    /// A table in the database is locked
    pub const LOCKED: i32 = 6;
    /// Unable to open the database file
    pub const CANTOPEN: i32 = 14;
    /// Abort due to constraint violation
    pub const CONSTRAINT: i32 = 19;
    /// Authorization denied
    pub const AUTH: i32 = 23;
    /// File opened that is not a database file
    pub const NOTADB: i32 = 26;
    /// Another row is ready
    pub const ROW: i32 = 100;
    /// Finished executing
    pub const DONE: i32 = 101;
}

/// Classify a SQLite result code (primary or extended)
pub fn classify_sqlite(code: i32) -> Option<ErrorKind> {
    use sqlite_codes::*;

    let kind = match code & 0xff {
        OK | ROW | DONE => return None,
        BUSY | LOCKED => ErrorKind::Transient,
        CONSTRAINT => ErrorKind::Constraint,
        PERM | AUTH => ErrorKind::Authorization,
        ERROR => ErrorKind::Syntax,
        CANTOPEN | NOTADB => ErrorKind::Connection,
        _ => ErrorKind::Internal,
    };
    Some(kind)
}

/// Classify a MySQL server or client error number
pub fn classify_mysql(code: u16) -> Option<ErrorKind> {
    let kind = match code {
        0 => return None,
        // ER_LOCK_WAIT_TIMEOUT, ER_LOCK_DEADLOCK
        1205 | 1213 => ErrorKind::Transient,
        // duplicate entry/key, foreign key, not null, check constraint
        1022 | 1048 | 1062 | 1169 | 1216 | 1217 | 1451 | 1452 | 1557 | 1586 | 3819 => {
            ErrorKind::Constraint
        }
        // access denied variants
        1044 | 1045 | 1142 | 1143 | 1227 | 1698 => ErrorKind::Authorization,
        // parse error, syntax error, unknown column, unknown table
        1054 | 1064 | 1146 | 1149 => ErrorKind::Syntax,
        // client: can't connect (socket, tcp), server gone away, lost connection
        2002 | 2003 | 2005 | 2006 | 2013 => ErrorKind::Connection,
        _ => ErrorKind::Internal,
    };
    Some(kind)
}
