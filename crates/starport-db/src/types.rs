//! Value types for starport-db
//!
//! - [`Value`]: a bind descriptor, borrowed and `Copy`, valid only for the
//!   call it is passed to
//! - [`Cell`]: an owned column value held by a result cursor
//! - [`ColumnInfo`]: column name plus the backend's declared type

/// Statement parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// SQL NULL
    Null,
    /// 32-bit signed integer
    Int32(i32),
    /// 32-bit unsigned integer
    UInt32(u32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit unsigned integer
    UInt64(u64),
    /// 64-bit floating point
    Float64(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 text
    Text(&'a str),
    /// Binary data
    Blob(&'a [u8]),
}

impl<'a> Value<'a> {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Tag name used in diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int32(_) => "int32",
            Self::UInt32(_) => "uint32",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Float64(_) => "float64",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Integer payload widened to i128, if this is an integer tag
    pub const fn as_i128(&self) -> Option<i128> {
        match *self {
            Self::Int32(n) => Some(n as i128),
            Self::UInt32(n) => Some(n as i128),
            Self::Int64(n) => Some(n as i128),
            Self::UInt64(n) => Some(n as i128),
            _ => None,
        }
    }
}

impl From<i32> for Value<'_> {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u32> for Value<'_> {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<i64> for Value<'_> {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<u64> for Value<'_> {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<f64> for Value<'_> {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<bool> for Value<'_> {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(v: &'a str) -> Self {
        Self::Text(v)
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(v: &'a String) -> Self {
        Self::Text(v.as_str())
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(v: &'a [u8]) -> Self {
        Self::Blob(v)
    }
}

impl<'a> From<&'a Vec<u8>> for Value<'a> {
    fn from(v: &'a Vec<u8>) -> Self {
        Self::Blob(v.as_slice())
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Column value owned by a result set
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// SQL NULL
    Null,
    /// Any integer column
    Int(i64),
    /// Any floating point column
    Float(f64),
    /// Boolean column
    Bool(bool),
    /// Text, including values rendered from types without a native mapping
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl Cell {
    /// Check if cell is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Tag name used in diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(s) => f.write_str(s),
            Self::Blob(bytes) => {
                f.write_str("\\x")?;
                bytes.iter().try_for_each(|b| write!(f, "{:02x}", b))
            }
        }
    }
}

/// Result column description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name or alias
    pub name: String,
    /// Type name as declared by the backend (empty when the backend has none)
    pub declared_type: String,
}

impl ColumnInfo {
    /// Create a column description
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}
