//! The `SqlAdapter` implementation for SQLite.

use crate::ddl;
use viborm_core::adapter::{Capabilities, DdlOp, SqlAdapter};
use viborm_core::error::Result;
use viborm_core::parse;
use viborm_core::schema::{FieldState, RelationKind, Schema};
use viborm_core::sql::Sql;
use viborm_core::value::Value;
use viborm_core::Dialect;
use serde_json::Value as JsonValue;

/// SQLite fragment emitters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteAdapter;

impl SqliteAdapter {
    pub const fn new() -> Self {
        Self
    }

    fn json_path_text(path: &[String]) -> String {
        let mut out = String::from("$");
        for segment in path {
            out.push('.');
            out.push_str(segment);
        }
        out
    }
}

impl SqlAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SQLITE
    }

    // ==================== literals ====================

    /// SQLite stores JSON, arrays, UUIDs, and temporals as TEXT.
    fn value(&self, value: Value) -> Sql {
        match value {
            Value::Json(json) => Sql::param(Value::Text(json.to_string())),
            Value::List(items) => {
                let json = Value::List(items).to_json();
                Sql::param(Value::Text(json.to_string()))
            }
            Value::Uuid(uuid) => Sql::param(Value::Text(uuid.to_string())),
            other => Sql::param(other),
        }
    }

    fn json_literal(&self, value: &JsonValue) -> Sql {
        Sql::param(Value::Text(value.to_string()))
    }

    // ==================== operators ====================

    fn ilike(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" LIKE ").append(rhs).push(" COLLATE NOCASE")
    }

    // ==================== json ====================

    fn json_object(&self, pairs: Vec<(String, Sql)>) -> Sql {
        let args = Sql::join(
            pairs.into_iter().map(|(key, expr)| {
                Sql::raw(format!("'{}', ", key.replace('\'', "''"))).append(expr)
            }),
            ", ",
        );
        Sql::func("json_object", args)
    }

    fn json_array(&self, items: Vec<Sql>) -> Sql {
        Sql::func("json_array", Sql::join(items, ", "))
    }

    fn json_empty_array(&self) -> Sql {
        Sql::raw("json('[]')")
    }

    /// `json_group_array` yields `[]` over an empty group on its own.
    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql {
        let _ = order_by;
        Sql::func("json_group_array", expr)
    }

    fn json_extract(&self, expr: Sql, path: &[String]) -> Sql {
        Sql::raw("json_extract(")
            .append(expr)
            .push(", ")
            .append(Sql::param(Value::Text(Self::json_path_text(path))))
            .push(")")
    }

    /// `json_extract` already returns SQL text for JSON strings.
    fn json_extract_text(&self, expr: Sql, path: &[String]) -> Sql {
        self.json_extract(expr, path)
    }

    // ==================== arrays (JSON-backed) ====================

    fn array_literal(&self, items: Vec<Value>) -> Sql {
        Sql::func(
            "json_array",
            Sql::join(items.into_iter().map(|item| self.value(item)), ", "),
        )
    }

    fn array_has(&self, column: Sql, value: Value) -> Sql {
        let probe = Sql::raw("SELECT 1 FROM json_each(")
            .append(column)
            .push(") WHERE json_each.value = ")
            .append(self.value(value));
        self.exists(probe)
    }

    fn array_has_every(&self, column: Sql, values: Vec<Value>) -> Sql {
        let expected = values.len() as i64;
        let matched = Sql::raw("SELECT COUNT(DISTINCT json_each.value) FROM json_each(")
            .append(column)
            .push(") WHERE json_each.value IN ")
            .append(self.list(values));
        self.eq(matched.parens(), Sql::raw(expected.to_string()))
    }

    fn array_has_some(&self, column: Sql, values: Vec<Value>) -> Sql {
        let probe = Sql::raw("SELECT 1 FROM json_each(")
            .append(column)
            .push(") WHERE json_each.value IN ")
            .append(self.list(values));
        self.exists(probe)
    }

    fn array_is_empty(&self, column: Sql, empty: bool) -> Sql {
        let length = self.array_length(column);
        if empty {
            self.eq(length, Sql::raw("0"))
        } else {
            self.gt(length, Sql::raw("0"))
        }
    }

    fn array_length(&self, column: Sql) -> Sql {
        Sql::func("json_array_length", column)
    }

    fn array_element(&self, column: Sql, index: i64) -> Sql {
        Sql::raw("json_extract(")
            .append(column)
            .push(format!(", '$[{index}]')"))
    }

    fn assign_push(&self, column: Sql, value: Value) -> Sql {
        let target = column.clone();
        self.assign(
            target,
            Sql::raw("json_insert(COALESCE(")
                .append(column)
                .push(", json('[]')), '$[#]', ")
                .append(self.value(value))
                .push(")"),
        )
    }

    /// No prepend primitive; rebuild the array with the new head.
    fn assign_unshift(&self, column: Sql, value: Value) -> Sql {
        let target = column.clone();
        self.assign(
            target,
            Sql::raw("(SELECT json_group_array(item.value) FROM (SELECT ")
                .append(self.value(value))
                .push(" AS value UNION ALL SELECT je.value FROM json_each(COALESCE(")
                .append(column)
                .push(", json('[]'))) AS je) AS item)"),
        )
    }

    // ==================== mutations ====================

    /// No DEFAULT keyword inside multi-row VALUES; absent cells insert NULL
    /// (engine-side generators have already filled what they own).
    fn default_keyword(&self) -> Sql {
        Sql::raw("NULL")
    }

    // ==================== session ====================

    fn last_insert_id(&self) -> Sql {
        Sql::raw("last_insert_rowid()")
    }

    // ==================== migration hooks ====================

    fn introspection_queries(&self) -> Vec<(&'static str, Sql)> {
        vec![
            (
                "tables",
                Sql::raw(
                    "SELECT name, sql FROM sqlite_master WHERE type = 'table' \
                     AND name NOT LIKE 'sqlite_%'",
                ),
            ),
            (
                "indexes",
                Sql::raw("SELECT name, tbl_name, sql FROM sqlite_master WHERE type = 'index'"),
            ),
        ]
    }

    fn generate_ddl(&self, schema: &Schema, op: DdlOp<'_>) -> Result<Sql> {
        ddl::generate(schema, op)
    }

    fn map_field_type(&self, field: &FieldState) -> String {
        ddl::column_type(field)
    }

    fn default_expression(&self, field: &FieldState) -> Option<Sql> {
        ddl::default_expression(field)
    }

    // ==================== result middleware ====================

    /// JSON aggregates arrive as strings; decode before the default
    /// traversal.
    fn parse_relation(&self, value: Value, kind: RelationKind) -> Result<Value> {
        let value = match value {
            Value::Text(text) => Value::Json(serde_json::from_str(&text)?),
            other => other,
        };
        parse::builtin_relation(value, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nocase_like() {
        let adapter = SqliteAdapter::new();
        let sql = adapter.ilike(
            adapter.column("t0", "name"),
            Sql::param(Value::Text("%ann%".into())),
        );
        assert_eq!(
            sql.render(Dialect::SQLite).sql,
            r#""t0"."name" LIKE ? COLLATE NOCASE"#
        );
    }

    #[test]
    fn array_has_uses_json_each() {
        let adapter = SqliteAdapter::new();
        let sql = adapter.array_has(adapter.column("t0", "tags"), Value::Text("rust".into()));
        let rendered = sql.render(Dialect::SQLite);
        assert!(rendered.sql.contains("json_each(\"t0\".\"tags\")"));
        assert_eq!(rendered.params.len(), 1);
    }

    #[test]
    fn skip_duplicates_is_a_suffix() {
        let adapter = SqliteAdapter::new();
        let sql = adapter.insert(
            adapter.escape("user"),
            vec![adapter.escape("id")],
            vec![vec![Sql::param(Value::Int(1))]],
            true,
        );
        assert_eq!(
            sql.render(Dialect::SQLite).sql,
            r#"INSERT INTO "user" ("id") VALUES (?) ON CONFLICT DO NOTHING"#
        );
    }

    #[test]
    fn json_group_array_needs_no_coalesce() {
        let adapter = SqliteAdapter::new();
        assert_eq!(
            adapter.json_agg(Sql::raw("x"), None).render(Dialect::SQLite).sql,
            "json_group_array(x)"
        );
    }
}
