//! Parameterized SQL fragments.
//!
//! A [`Sql`] is an inert chunk list: raw text, identifiers, and bound
//! parameter values interleaved in order. Fragments compose by concatenation
//! and never interpolate parameter values into the text — rendering against a
//! [`Dialect`] produces the final statement string with `$n` or `?`
//! placeholders plus the parameter vector, in order.

use crate::dialect::{Dialect, DialectExt};
use crate::value::Value;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

/// One element of a SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlChunk {
    /// Raw SQL text, emitted verbatim. The caller asserts safety.
    Raw(Cow<'static, str>),
    /// An identifier, quoted per dialect at render time.
    Ident(Cow<'static, str>),
    /// A bound parameter value.
    Param(Value),
    /// Concatenation identity.
    Empty,
}

impl From<&'static str> for SqlChunk {
    fn from(text: &'static str) -> Self {
        SqlChunk::Raw(Cow::Borrowed(text))
    }
}

impl From<String> for SqlChunk {
    fn from(text: String) -> Self {
        SqlChunk::Raw(Cow::Owned(text))
    }
}

impl From<Value> for SqlChunk {
    fn from(value: Value) -> Self {
        SqlChunk::Param(value)
    }
}

/// SQL fragment builder with flat chunk storage.
///
/// Typical fragments fit the inline `SmallVec` capacity without touching the
/// heap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sql {
    chunks: SmallVec<[SqlChunk; 8]>,
}

/// A fragment rendered for a concrete dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Sql {
    /// Creates an empty fragment — the identity for [`Sql::append`].
    #[inline]
    pub const fn empty() -> Self {
        Self {
            chunks: SmallVec::new_const(),
        }
    }

    /// Creates a fragment of raw text.
    #[inline]
    pub fn raw(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Raw(text.into())],
        }
    }

    /// Creates a fragment holding a quoted identifier.
    #[inline]
    pub fn ident(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Ident(name.into())],
        }
    }

    /// Creates a fragment holding a single bound parameter.
    #[inline]
    pub fn param(value: impl Into<Value>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Param(value.into())],
        }
    }

    /// Creates a fragment for a function call: `NAME(args)`.
    pub fn func(name: impl Into<Cow<'static, str>>, args: Sql) -> Self {
        Sql::raw(name).push("(").append(args).push(")")
    }

    /// Appends another fragment (flat extend).
    #[inline]
    pub fn append(mut self, other: impl Into<Sql>) -> Self {
        self.chunks.extend(other.into().chunks);
        self
    }

    /// Pushes a single chunk.
    #[inline]
    pub fn push(mut self, chunk: impl Into<SqlChunk>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Joins fragments with a raw-text separator. Joining nothing yields
    /// [`Sql::empty`].
    pub fn join<I>(fragments: I, separator: &'static str) -> Sql
    where
        I: IntoIterator<Item = Sql>,
    {
        let mut iter = fragments.into_iter();
        let Some(first) = iter.next() else {
            return Sql::empty();
        };
        let mut result = first;
        for item in iter {
            result = result.push(separator).append(item);
        }
        result
    }

    /// Wraps the fragment in parentheses.
    #[inline]
    pub fn parens(self) -> Self {
        Sql::raw("(").append(self).push(")")
    }

    /// True when the fragment renders to no text and binds no parameters.
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|chunk| match chunk {
            SqlChunk::Empty => true,
            SqlChunk::Raw(text) => text.is_empty(),
            _ => false,
        })
    }

    /// Returns references to the bound parameter values, in order.
    pub fn params(&self) -> Vec<&Value> {
        self.chunks
            .iter()
            .filter_map(|chunk| match chunk {
                SqlChunk::Param(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Renders the fragment for a dialect.
    ///
    /// Pure and idempotent: the same fragment renders to the same text and
    /// parameter vector every time. PostgreSQL placeholders are numbered
    /// densely `$1..$n` in parameter order; MySQL/SQLite emit one `?` per
    /// parameter.
    pub fn render(&self, dialect: Dialect) -> Rendered {
        let mut sql = String::with_capacity(self.estimate_capacity());
        let mut params = Vec::new();
        for chunk in &self.chunks {
            match chunk {
                SqlChunk::Empty => {}
                SqlChunk::Raw(text) => sql.push_str(text),
                SqlChunk::Ident(name) => dialect.write_ident(name, &mut sql),
                SqlChunk::Param(value) => {
                    params.push(value.clone());
                    dialect.write_placeholder(params.len(), &mut sql);
                }
            }
        }
        Rendered { sql, params }
    }

    fn estimate_capacity(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| match chunk {
                SqlChunk::Empty => 0,
                SqlChunk::Raw(text) => text.len(),
                SqlChunk::Ident(name) => name.len() + 2,
                SqlChunk::Param(_) => 3,
            })
            .sum()
    }
}

impl From<&'static str> for Sql {
    fn from(text: &'static str) -> Self {
        Sql::raw(text)
    }
}

impl From<String> for Sql {
    fn from(text: String) -> Self {
        Sql::raw(text)
    }
}

impl FromIterator<SqlChunk> for Sql {
    fn from_iter<I: IntoIterator<Item = SqlChunk>>(iter: I) -> Self {
        Self {
            chunks: SmallVec::from_iter(iter),
        }
    }
}

impl fmt::Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Debug rendering; real statements go through `render(dialect)`.
        let rendered = self.render(Dialect::PostgreSQL);
        write!(f, r#"sql: "{}", params: {:?}"#, rendered.sql, rendered.params)
    }
}
