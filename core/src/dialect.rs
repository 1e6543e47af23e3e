//! SQL dialect identifiers and placeholder/identifier rendering.

use std::borrow::Cow;
use std::fmt;

/// The SQL dialects the engine can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl Dialect {
    /// Stable lowercase name, used in telemetry attributes (`db.system.name`).
    pub const fn name(&self) -> &'static str {
        match self {
            Dialect::PostgreSQL => "postgresql",
            Dialect::MySQL => "mysql",
            Dialect::SQLite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extension trait for dialect-specific rendering of placeholders and
/// identifiers.
pub trait DialectExt {
    /// Renders a placeholder for this dialect with the given 1-based index.
    ///
    /// Returns `Cow::Borrowed("?")` for SQLite/MySQL (zero allocation),
    /// `Cow::Owned` for PostgreSQL numbered placeholders.
    fn render_placeholder(&self, index: usize) -> Cow<'static, str>;

    /// Appends a placeholder directly into an output buffer.
    fn write_placeholder(&self, index: usize, out: &mut String);

    /// Appends a quoted identifier into an output buffer, escaping any
    /// embedded quote characters by doubling them.
    fn write_ident(&self, name: &str, out: &mut String);
}

impl DialectExt for Dialect {
    #[inline]
    fn render_placeholder(&self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::PostgreSQL => Cow::Owned(format!("${index}")),
            Dialect::SQLite | Dialect::MySQL => Cow::Borrowed("?"),
        }
    }

    #[inline]
    fn write_placeholder(&self, index: usize, out: &mut String) {
        use std::fmt::Write;
        match self {
            Dialect::PostgreSQL => {
                out.push('$');
                let _ = write!(out, "{index}");
            }
            Dialect::SQLite | Dialect::MySQL => out.push('?'),
        }
    }

    fn write_ident(&self, name: &str, out: &mut String) {
        let quote = match self {
            Dialect::MySQL => '`',
            Dialect::PostgreSQL | Dialect::SQLite => '"',
        };
        out.push(quote);
        for ch in name.chars() {
            out.push(ch);
            if ch == quote {
                out.push(quote);
            }
        }
        out.push(quote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::PostgreSQL.render_placeholder(3), "$3");
        assert_eq!(Dialect::MySQL.render_placeholder(3), "?");
        assert_eq!(Dialect::SQLite.render_placeholder(1), "?");
    }

    #[test]
    fn ident_quoting_escapes_embedded_quotes() {
        let mut out = String::new();
        Dialect::PostgreSQL.write_ident(r#"we"ird"#, &mut out);
        assert_eq!(out, r#""we""ird""#);

        let mut out = String::new();
        Dialect::MySQL.write_ident("ta`ble", &mut out);
        assert_eq!(out, "`ta``ble`");
    }
}
