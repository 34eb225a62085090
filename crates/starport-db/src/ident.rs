//! Identifiers written into statement text
//!
//! Upsert clause columns and savepoint names cannot be bound as
//! parameters. [`Ident`] is the checked form: ASCII letters, digits and
//! `_`, not starting with a digit, at most [`MAX_IDENT_LEN`] bytes.
//! Columns are quoted by the dialect afterwards; savepoint names go out
//! unquoted, so [`Ident::bare`] also refuses keywords the savepoint
//! statements would misparse.

use std::fmt;

use crate::error::{Error, Result};

/// PostgreSQL silently truncates longer names
pub const MAX_IDENT_LEN: usize = 63;

const KEYWORDS: &[&str] = &[
    "all", "and", "as", "begin", "commit", "end", "from", "insert", "into", "not", "null", "or",
    "release", "rollback", "savepoint", "select", "set", "table", "to", "transaction", "update",
    "where",
];

/// A validated identifier borrowed from the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident<'a>(&'a str);

impl<'a> Ident<'a> {
    /// Check a name that will be quoted before use
    pub fn new(name: &'a str) -> Result<Self> {
        let bytes = name.as_bytes();
        let reason = if bytes.is_empty() {
            Some("empty")
        } else if bytes.len() > MAX_IDENT_LEN {
            Some("longer than 63 bytes")
        } else if bytes[0].is_ascii_digit() {
            Some("starts with a digit")
        } else if !bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_') {
            Some("only ASCII letters, digits and '_' are allowed")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidIdentifier {
                name: name.to_string(),
                reason,
            }),
            None => Ok(Self(name)),
        }
    }

    /// Check a name that will be written unquoted
    pub fn bare(name: &'a str) -> Result<Self> {
        let ident = Self::new(name)?;
        if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            return Err(Error::InvalidIdentifier {
                name: name.to_string(),
                reason: "reserved word",
            });
        }
        Ok(ident)
    }

    /// The identifier text
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
