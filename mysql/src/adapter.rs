//! The `SqlAdapter` implementation for MySQL.

use crate::ddl;
use viborm_core::adapter::{Capabilities, DdlOp, SkipDuplicates, SqlAdapter};
use viborm_core::error::Result;
use viborm_core::parse;
use viborm_core::schema::{FieldState, RelationKind, Schema};
use viborm_core::sql::Sql;
use viborm_core::value::Value;
use viborm_core::Dialect;
use serde_json::Value as JsonValue;

/// MySQL fragment emitters.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlAdapter;

impl MySqlAdapter {
    pub const fn new() -> Self {
        Self
    }

    /// `$.a.b` JSON path text from segments.
    fn json_path_text(path: &[String]) -> String {
        let mut out = String::from("$");
        for segment in path {
            out.push('.');
            out.push('"');
            out.push_str(&segment.replace('"', "\\\""));
            out.push('"');
        }
        out
    }

    /// A bound parameter reinterpreted as a JSON document.
    fn json_candidate(&self, value: Value) -> Sql {
        let text = match value {
            Value::Json(json) => json.to_string(),
            other => other.to_json().to_string(),
        };
        Sql::raw("CAST(")
            .append(Sql::param(Value::Text(text)))
            .push(" AS JSON)")
    }
}

impl SqlAdapter for MySqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::MySQL
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::MYSQL
    }

    // ==================== literals ====================

    /// JSON, arrays, and UUIDs bind as text; MySQL has no native parameter
    /// form for them.
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

    /// Case-insensitivity via lower-folding; collation-dependent LIKE is
    /// already insensitive on the default collations, this makes it explicit.
    fn ilike(&self, lhs: Sql, rhs: Sql) -> Sql {
        self.like(self.lower(lhs), self.lower(rhs))
    }

    // ==================== json ====================

    fn json_object(&self, pairs: Vec<(String, Sql)>) -> Sql {
        let args = Sql::join(
            pairs.into_iter().map(|(key, expr)| {
                Sql::raw(format!("'{}', ", key.replace('\'', "''"))).append(expr)
            }),
            ", ",
        );
        Sql::func("JSON_OBJECT", args)
    }

    fn json_array(&self, items: Vec<Sql>) -> Sql {
        Sql::func("JSON_ARRAY", Sql::join(items, ", "))
    }

    fn json_empty_array(&self) -> Sql {
        Sql::raw("JSON_ARRAY()")
    }

    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql {
        // JSON_ARRAYAGG has no ORDER BY; ordered aggregation pre-sorts in a
        // derived table (the planner knows via json_agg_supports_order).
        let _ = order_by;
        Sql::raw("COALESCE(JSON_ARRAYAGG(")
            .append(expr)
            .push("), JSON_ARRAY())")
    }

    fn json_extract(&self, expr: Sql, path: &[String]) -> Sql {
        Sql::raw("JSON_EXTRACT(")
            .append(expr)
            .push(", ")
            .append(Sql::param(Value::Text(Self::json_path_text(path))))
            .push(")")
    }

    fn json_extract_text(&self, expr: Sql, path: &[String]) -> Sql {
        Sql::raw("JSON_UNQUOTE(")
            .append(self.json_extract(expr, path))
            .push(")")
    }

    // ==================== arrays (JSON-backed) ====================

    fn array_literal(&self, items: Vec<Value>) -> Sql {
        Sql::func(
            "JSON_ARRAY",
            Sql::join(items.into_iter().map(|item| self.value(item)), ", "),
        )
    }

    fn array_has(&self, column: Sql, value: Value) -> Sql {
        Sql::raw("JSON_CONTAINS(")
            .append(column)
            .push(", ")
            .append(self.json_candidate(value))
            .push(")")
    }

    fn array_has_every(&self, column: Sql, values: Vec<Value>) -> Sql {
        self.array_has(column, Value::List(values))
    }

    fn array_has_some(&self, column: Sql, values: Vec<Value>) -> Sql {
        Sql::raw("JSON_OVERLAPS(")
            .append(column)
            .push(", ")
            .append(self.json_candidate(Value::List(values)))
            .push(")")
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
        Sql::func("JSON_LENGTH", column)
    }

    fn array_element(&self, column: Sql, index: i64) -> Sql {
        Sql::raw("JSON_EXTRACT(")
            .append(column)
            .push(format!(", '$[{index}]')"))
    }

    fn assign_push(&self, column: Sql, value: Value) -> Sql {
        let target = column.clone();
        self.assign(
            target,
            Sql::raw("JSON_ARRAY_APPEND(COALESCE(")
                .append(column)
                .push(", JSON_ARRAY()), '$', ")
                .append(self.value(value))
                .push(")"),
        )
    }

    fn assign_unshift(&self, column: Sql, value: Value) -> Sql {
        let target = column.clone();
        self.assign(
            target,
            Sql::raw("JSON_MERGE_PRESERVE(JSON_ARRAY(")
                .append(self.value(value))
                .push("), COALESCE(")
                .append(column)
                .push(", JSON_ARRAY()))"),
        )
    }

    // ==================== mutations ====================

    /// MySQL has no RETURNING; the executor chains `LAST_INSERT_ID()`.
    fn returning(&self, _columns: Vec<Sql>) -> Sql {
        Sql::empty()
    }

    fn on_conflict_update(&self, _target: Vec<Sql>, assignments: Vec<Sql>) -> Sql {
        Sql::raw(" ON DUPLICATE KEY UPDATE ").append(Sql::join(assignments, ", "))
    }

    fn skip_duplicates(&self) -> SkipDuplicates {
        SkipDuplicates {
            prefix: Sql::raw(" IGNORE"),
            suffix: Sql::empty(),
        }
    }

    fn default_values_clause(&self) -> Sql {
        Sql::raw(" () VALUES ()")
    }

    // ==================== session ====================

    fn last_insert_id(&self) -> Sql {
        Sql::raw("LAST_INSERT_ID()")
    }

    // ==================== casts ====================

    fn text_cast_type(&self) -> &'static str {
        "CHAR"
    }

    fn numeric_cast_type(&self) -> &'static str {
        "DECIMAL(65,30)"
    }

    // ==================== migration hooks ====================

    fn introspection_queries(&self) -> Vec<(&'static str, Sql)> {
        vec![
            (
                "tables",
                Sql::raw(
                    "SELECT table_name FROM information_schema.tables \
                     WHERE table_schema = DATABASE()",
                ),
            ),
            (
                "columns",
                Sql::raw(
                    "SELECT table_name, column_name, column_type, is_nullable, column_default, extra \
                     FROM information_schema.columns WHERE table_schema = DATABASE()",
                ),
            ),
            (
                "indexes",
                Sql::raw(
                    "SELECT table_name, index_name, column_name, non_unique \
                     FROM information_schema.statistics WHERE table_schema = DATABASE()",
                ),
            ),
        ]
    }

    fn generate_ddl(&self, schema: &Schema, op: DdlOp<'_>) -> Result<Sql> {
        ddl::generate(self, schema, op)
    }

    fn map_field_type(&self, field: &FieldState) -> String {
        ddl::column_type(field)
    }

    fn default_expression(&self, field: &FieldState) -> Option<Sql> {
        ddl::default_expression(field)
    }

    fn supports_native_enums(&self) -> bool {
        true
    }

    fn enum_column_type(&self, _name: &str, values: &[String]) -> String {
        let variants = values
            .iter()
            .map(|value| format!("'{}'", value.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        format!("ENUM({variants})")
    }

    // ==================== result middleware ====================

    /// JSON aggregates arrive as strings from the wire; decode before the
    /// default traversal.
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
    fn backtick_idents_and_question_placeholders() {
        let adapter = MySqlAdapter::new();
        let sql = adapter.eq(
            adapter.column("t0", "email"),
            Sql::param(Value::Text("a@b.c".into())),
        );
        assert_eq!(sql.render(Dialect::MySQL).sql, "`t0`.`email` = ?");
    }

    #[test]
    fn insert_ignore_prefix() {
        let adapter = MySqlAdapter::new();
        let sql = adapter.insert(
            adapter.escape("user"),
            vec![adapter.escape("id")],
            vec![vec![Sql::param(Value::Int(1))]],
            true,
        );
        assert_eq!(
            sql.render(Dialect::MySQL).sql,
            "INSERT IGNORE INTO `user` (`id`) VALUES (?)"
        );
    }

    #[test]
    fn returning_is_empty() {
        let adapter = MySqlAdapter::new();
        assert!(adapter.returning(vec![Sql::raw("x")]).is_empty());
    }

    #[test]
    fn json_agg_coalesces() {
        let adapter = MySqlAdapter::new();
        let sql = adapter.json_agg(Sql::raw("x"), None);
        assert_eq!(
            sql.render(Dialect::MySQL).sql,
            "COALESCE(JSON_ARRAYAGG(x), JSON_ARRAY())"
        );
    }

    #[test]
    fn relation_strings_decode_to_json() {
        let adapter = MySqlAdapter::new();
        let decoded = adapter
            .parse_relation(Value::Text("[{\"id\":1}]".into()), RelationKind::OneToMany)
            .unwrap();
        assert!(matches!(decoded, Value::Json(JsonValue::Array(_))));
    }
}
