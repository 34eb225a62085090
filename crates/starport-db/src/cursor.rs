//! Forward-only result cursor
//!
//! A [`Cursor`] mutably borrows the connection that produced it, so the
//! connection cannot run another statement until the cursor is finalized
//! or dropped. Text and blob accessors borrow from the cursor and are
//! invalidated by the next [`Cursor::advance`], which the borrow checker
//! enforces.
//!
//! Accessors fail closed: an invalid column index, a NULL value or a type
//! that cannot be represented as the requested one yields an error, never
//! a guessed value. `cursor.get_i64(0).unwrap_or_default()` gives the
//! zero/empty default where a caller wants one.

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::types::{Cell, ColumnInfo};

/// Backend result set behind a cursor
pub trait ResultSet: Send + std::fmt::Debug {
    /// Column descriptions
    fn columns(&self) -> &[ColumnInfo];

    /// Number of rows in the result
    fn row_count(&self) -> usize;

    /// Move to the next row; `Ok(false)` once exhausted
    fn advance(&mut self) -> Result<bool>;

    /// Index of the current row, if positioned on one
    fn position(&self) -> Option<usize>;

    /// Cell of the current row
    fn cell(&self, index: usize) -> Result<&Cell>;
}

/// Result set fully read from the backend when the query ran
#[derive(Debug, Clone, Default)]
pub struct BufferedRows {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Cell>>,
    next: usize,
    current: Option<usize>,
}

impl BufferedRows {
    /// Create a result set from columns and rows
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns,
            rows,
            next: 0,
            current: None,
        }
    }

    /// Result set with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }
}

impl ResultSet for BufferedRows {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn advance(&mut self) -> Result<bool> {
        if self.next < self.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn position(&self) -> Option<usize> {
        self.current
    }

    fn cell(&self, index: usize) -> Result<&Cell> {
        let row = self
            .current
            .and_then(|r| self.rows.get(r))
            .ok_or(Error::NoCurrentRow)?;
        row.get(index).ok_or(Error::ColumnOutOfRange {
            index,
            count: self.columns.len(),
        })
    }
}

/// Forward-only cursor over a query result
pub struct Cursor<'conn> {
    inner: Box<dyn ResultSet>,
    _conn: PhantomData<&'conn mut ()>,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("columns", &self.inner.columns())
            .field("row_count", &self.inner.row_count())
            .field("position", &self.inner.position())
            .finish()
    }
}

impl<'conn> Cursor<'conn> {
    /// Wrap a backend result set
    pub fn new(inner: Box<dyn ResultSet>) -> Self {
        Self {
            inner,
            _conn: PhantomData,
        }
    }

    /// Move to the next row.
    ///
    /// Returns `Ok(false)` when the result is exhausted and `Err` on a
    /// backend failure, so exhaustion and failure are never confused.
    pub fn advance(&mut self) -> Result<bool> {
        self.inner.advance()
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.inner.columns().len()
    }

    /// Number of rows in the result
    pub fn row_count(&self) -> usize {
        self.inner.row_count()
    }

    /// Index of the current row
    pub fn row_index(&self) -> Option<usize> {
        self.inner.position()
    }

    /// Column name
    pub fn column_name(&self, index: usize) -> Result<&str> {
        self.column(index).map(|c| c.name.as_str())
    }

    /// Declared column type as reported by the backend
    pub fn column_type(&self, index: usize) -> Result<&str> {
        self.column(index).map(|c| c.declared_type.as_str())
    }

    /// Index of the first column with the given name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.inner.columns().iter().position(|c| c.name == name)
    }

    /// Whether the current row's column is NULL
    pub fn is_null(&self, index: usize) -> Result<bool> {
        self.inner.cell(index).map(Cell::is_null)
    }

    /// Raw cell of the current row
    pub fn cell(&self, index: usize) -> Result<&Cell> {
        self.inner.cell(index)
    }

    /// Read a signed 64-bit integer
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        match self.non_null(index)? {
            Cell::Int(n) => Ok(*n),
            Cell::Bool(b) => Ok(i64::from(*b)),
            other => Err(mismatch(index, "i64", other)),
        }
    }

    /// Read a signed 32-bit integer
    pub fn get_i32(&self, index: usize) -> Result<i32> {
        self.get_narrow(index, "i32")
    }

    /// Read an unsigned 32-bit integer
    pub fn get_u32(&self, index: usize) -> Result<u32> {
        self.get_narrow(index, "u32")
    }

    /// Read an unsigned 64-bit integer
    pub fn get_u64(&self, index: usize) -> Result<u64> {
        self.get_narrow(index, "u64")
    }

    /// Read a floating point value; integers are widened
    pub fn get_f64(&self, index: usize) -> Result<f64> {
        match self.non_null(index)? {
            Cell::Float(f) => Ok(*f),
            Cell::Int(n) => Ok(*n as f64),
            other => Err(mismatch(index, "f64", other)),
        }
    }

    /// Read a boolean; integers read as `!= 0`
    pub fn get_bool(&self, index: usize) -> Result<bool> {
        match self.non_null(index)? {
            Cell::Bool(b) => Ok(*b),
            Cell::Int(n) => Ok(*n != 0),
            other => Err(mismatch(index, "bool", other)),
        }
    }

    /// Borrow a text value, valid until the next advance
    pub fn get_text(&self, index: usize) -> Result<&str> {
        match self.non_null(index)? {
            Cell::Text(s) => Ok(s.as_str()),
            other => Err(mismatch(index, "text", other)),
        }
    }

    /// Borrow a binary value, valid until the next advance; text reads as its bytes
    pub fn get_blob(&self, index: usize) -> Result<&[u8]> {
        match self.non_null(index)? {
            Cell::Blob(b) => Ok(b.as_slice()),
            Cell::Text(s) => Ok(s.as_bytes()),
            other => Err(mismatch(index, "blob", other)),
        }
    }

    /// Release the result set
    pub fn finalize(self) {}

    fn column(&self, index: usize) -> Result<&ColumnInfo> {
        let columns = self.inner.columns();
        columns.get(index).ok_or(Error::ColumnOutOfRange {
            index,
            count: columns.len(),
        })
    }

    fn non_null(&self, index: usize) -> Result<&Cell> {
        match self.inner.cell(index)? {
            Cell::Null => Err(Error::NullValue { index }),
            cell => Ok(cell),
        }
    }

    fn get_narrow<T: TryFrom<i64>>(&self, index: usize, expected: &'static str) -> Result<T> {
        let wide = self.get_i64(index).map_err(|e| match e {
            Error::TypeMismatch { actual, .. } => Error::TypeMismatch {
                index,
                expected,
                actual,
            },
            other => other,
        })?;
        T::try_from(wide).map_err(|_| Error::TypeMismatch {
            index,
            expected,
            actual: "out-of-range integer",
        })
    }
}

fn mismatch(index: usize, expected: &'static str, actual: &Cell) -> Error {
    Error::TypeMismatch {
        index,
        expected,
        actual: actual.type_name(),
    }
}
