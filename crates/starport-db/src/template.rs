//! SQL template compiler
//!
//! Call sites write one dialect-neutral statement using numbered
//! placeholders `{1}`, `{2}`, ... and the compiler rewrites it into the
//! positional parameter syntax of the target backend:
//!
//! | style              | `{3}` becomes |
//! |--------------------|---------------|
//! | `Dollar`           | `$3`          |
//! | `QuestionNumbered` | `?3`          |
//! | `Question`         | `?`           |
//!
//! `{{` and `}}` are escapes for literal braces. Anything that is not a
//! well-formed placeholder (`{}`, `{0}`, `{x}`, an unterminated `{12`) is
//! copied through unchanged. Output is bounded: if the compiled statement
//! would exceed the limit the output is cleared and an error returned, so a
//! truncated statement never reaches a backend.

use std::borrow::Cow;

use crate::config::DEFAULT_MAX_STATEMENT_LEN;
use crate::error::{Error, Result};
use crate::types::Value;

/// Largest accepted placeholder index
pub const MAX_PLACEHOLDER_INDEX: usize = 65_535;

/// Native positional parameter syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderStyle {
    /// `$N` (PostgreSQL)
    Dollar,
    /// `?N` (SQLite)
    QuestionNumbered,
    /// `?`, bound in order of appearance (MySQL and generic drivers)
    Question,
}

impl PlaceholderStyle {
    /// Whether the native syntax carries the parameter index
    #[inline]
    pub const fn is_numbered(self) -> bool {
        !matches!(self, Self::Question)
    }
}

/// A compiled statement plus the placeholder indices in order of appearance
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledSql {
    sql: String,
    placeholders: Vec<usize>,
}

impl CompiledSql {
    /// Native SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Placeholder indices (1-based) in order of appearance, repeats included
    pub fn placeholders(&self) -> &[usize] {
        &self.placeholders
    }

    /// Highest placeholder index referenced (0 if none)
    pub fn max_index(&self) -> usize {
        self.placeholders.iter().copied().max().unwrap_or(0)
    }

    /// Arrange caller binds for the native statement.
    ///
    /// Numbered styles take binds `1..=max_index` as-is. The unnumbered
    /// style needs one bind per occurrence, so binds are repeated and
    /// reordered to match. Extra trailing binds are ignored.
    pub fn arrange_binds<'p, 'v>(
        &self,
        style: PlaceholderStyle,
        params: &'p [Value<'v>],
    ) -> Result<Cow<'p, [Value<'v>]>> {
        let max = self.max_index();
        if max > params.len() {
            return Err(Error::MissingBind {
                index: max,
                supplied: params.len(),
            });
        }

        if style.is_numbered() {
            return Ok(Cow::Borrowed(&params[..max]));
        }

        let ordered = self
            .placeholders
            .iter()
            .map(|&index| params[index - 1])
            .collect::<Vec<_>>();
        Ok(Cow::Owned(ordered))
    }

    fn clear(&mut self) {
        self.sql.clear();
        self.placeholders.clear();
    }
}

/// Template compiler for one placeholder style and output bound
#[derive(Debug, Clone, Copy)]
pub struct TemplateCompiler {
    style: PlaceholderStyle,
    limit: usize,
}

impl TemplateCompiler {
    /// Create a compiler with the default output bound
    pub const fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            limit: DEFAULT_MAX_STATEMENT_LEN,
        }
    }

    /// Set the output bound in bytes
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Placeholder style
    pub const fn style(&self) -> PlaceholderStyle {
        self.style
    }

    /// Output bound in bytes
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Compile into a fresh buffer
    pub fn compile(&self, template: &str) -> Result<CompiledSql> {
        let mut out = CompiledSql::default();
        self.compile_into(template, &mut out)?;
        Ok(out)
    }

    /// Compile into a caller-owned buffer, reusing its allocation.
    ///
    /// On error `out` is left empty.
    pub fn compile_into(&self, template: &str, out: &mut CompiledSql) -> Result<()> {
        out.clear();
        let result = self.emit(template, out);
        if result.is_err() {
            out.clear();
        }
        result
    }

    fn emit(&self, template: &str, out: &mut CompiledSql) -> Result<()> {
        let bytes = template.as_bytes();
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' if bytes.get(i + 1) == Some(&b'{') => {
                    self.push(out, &template[literal_start..i])?;
                    self.push(out, "{")?;
                    i += 2;
                    literal_start = i;
                }
                b'}' if bytes.get(i + 1) == Some(&b'}') => {
                    self.push(out, &template[literal_start..i])?;
                    self.push(out, "}")?;
                    i += 2;
                    literal_start = i;
                }
                b'{' => match parse_placeholder(&bytes[i + 1..]) {
                    Some((index, consumed)) => {
                        self.push(out, &template[literal_start..i])?;
                        self.push_placeholder(out, index)?;
                        i += 1 + consumed;
                        literal_start = i;
                    }
                    None => i += 1,
                },
                _ => i += 1,
            }
        }

        self.push(out, &template[literal_start..])
    }

    fn push(&self, out: &mut CompiledSql, piece: &str) -> Result<()> {
        if out.sql.len() + piece.len() > self.limit {
            return Err(Error::TemplateOverflow { limit: self.limit });
        }
        out.sql.push_str(piece);
        Ok(())
    }

    fn push_placeholder(&self, out: &mut CompiledSql, index: usize) -> Result<()> {
        let native = match self.style {
            PlaceholderStyle::Dollar => Cow::Owned(format!("${}", index)),
            PlaceholderStyle::QuestionNumbered => Cow::Owned(format!("?{}", index)),
            PlaceholderStyle::Question => Cow::Borrowed("?"),
        };
        self.push(out, &native)?;
        out.placeholders.push(index);
        Ok(())
    }
}

/// Parse `N}` following an opening brace; returns the index and bytes consumed
fn parse_placeholder(rest: &[u8]) -> Option<(usize, usize)> {
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > 5 || rest.get(digits) != Some(&b'}') {
        return None;
    }

    let index = rest[..digits]
        .iter()
        .fold(0usize, |acc, b| acc * 10 + usize::from(b - b'0'));
    if index == 0 || index > MAX_PLACEHOLDER_INDEX {
        return None;
    }
    Some((index, digits + 1))
}

/// Compile a template with the default output bound
pub fn compile(template: &str, style: PlaceholderStyle) -> Result<CompiledSql> {
    TemplateCompiler::new(style).compile(template)
}
