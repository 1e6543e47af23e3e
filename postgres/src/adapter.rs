//! The `SqlAdapter` implementation for PostgreSQL.

use crate::ddl;
use crate::features::{PostgresGeo, PostgresVector};
use viborm_core::adapter::{
    Capabilities, DdlOp, Distinct, FeatureSupport, GeoOps, SelectParts, SqlAdapter, VectorOps,
};
use viborm_core::error::Result;
use viborm_core::schema::{FieldState, Schema};
use viborm_core::sql::Sql;
use viborm_core::value::Value;
use viborm_core::Dialect;
use serde_json::Value as JsonValue;

/// PostgreSQL fragment emitters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    pub const fn new() -> Self {
        Self
    }

    /// `expr -> 'a' -> 'b'`, with the last hop rendered by `last_op`.
    fn json_path(&self, expr: Sql, path: &[String], last_op: &'static str) -> Sql {
        let mut sql = expr.parens();
        for (i, segment) in path.iter().enumerate() {
            let op = if i + 1 == path.len() { last_op } else { " -> " };
            sql = sql.push(op).append(Sql::param(Value::Text(segment.clone())));
        }
        sql
    }
}

impl SqlAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::POSTGRES
    }

    // ==================== literals ====================

    fn json_literal(&self, value: &JsonValue) -> Sql {
        // Native JSON binding; the driver sends it as jsonb.
        Sql::param(Value::Json(value.clone()))
    }

    // ==================== operators ====================

    fn ilike(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" ILIKE ").append(rhs)
    }

    // ==================== json ====================

    fn json_object(&self, pairs: Vec<(String, Sql)>) -> Sql {
        // Keys are schema-declared field names; inline them as literals so
        // the statement stays readable and the parameter list stays flat.
        let args = Sql::join(
            pairs.into_iter().map(|(key, expr)| {
                Sql::raw(format!("'{}', ", key.replace('\'', "''"))).append(expr)
            }),
            ", ",
        );
        Sql::func("json_build_object", args)
    }

    fn json_array(&self, items: Vec<Sql>) -> Sql {
        Sql::func("json_build_array", Sql::join(items, ", "))
    }

    fn json_empty_array(&self) -> Sql {
        Sql::raw("'[]'::json")
    }

    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql {
        let mut agg = Sql::raw("json_agg(").append(expr);
        if let Some(order) = order_by {
            agg = agg.push(" ORDER BY ").append(order);
        }
        agg = agg.push(")");
        Sql::raw("COALESCE(").append(agg).push(", '[]'::json)")
    }

    fn json_agg_supports_order(&self) -> bool {
        true
    }

    fn row_to_json(&self, alias: &str) -> Result<Sql> {
        Ok(Sql::func("row_to_json", Sql::ident(alias.to_string())))
    }

    fn json_extract(&self, expr: Sql, path: &[String]) -> Sql {
        self.json_path(expr, path, " -> ")
    }

    fn json_extract_text(&self, expr: Sql, path: &[String]) -> Sql {
        self.json_path(expr, path, " ->> ")
    }

    // ==================== arrays ====================

    fn array_literal(&self, items: Vec<Value>) -> Sql {
        Sql::raw("ARRAY[")
            .append(Sql::join(items.into_iter().map(|item| Sql::param(item)), ", "))
            .push("]")
    }

    fn array_has(&self, column: Sql, value: Value) -> Sql {
        Sql::param(value).push(" = ANY(").append(column).push(")")
    }

    fn array_has_every(&self, column: Sql, values: Vec<Value>) -> Sql {
        column.push(" @> ").append(self.array_literal(values))
    }

    fn array_has_some(&self, column: Sql, values: Vec<Value>) -> Sql {
        column.push(" && ").append(self.array_literal(values))
    }

    fn array_is_empty(&self, column: Sql, empty: bool) -> Sql {
        let length = Sql::func("cardinality", column);
        if empty {
            self.eq(length, Sql::raw("0"))
        } else {
            self.gt(length, Sql::raw("0"))
        }
    }

    fn array_length(&self, column: Sql) -> Sql {
        Sql::func("cardinality", column)
    }

    fn array_element(&self, column: Sql, index: i64) -> Sql {
        // SQL arrays are 1-based.
        column.parens().push(format!("[{}]", index + 1))
    }

    fn assign_push(&self, column: Sql, value: Value) -> Sql {
        let target = column.clone();
        self.assign(
            target,
            Sql::raw("array_append(")
                .append(column)
                .push(", ")
                .append(Sql::param(value))
                .push(")"),
        )
    }

    fn assign_unshift(&self, column: Sql, value: Value) -> Sql {
        let target = column.clone();
        self.assign(
            target,
            Sql::raw("array_prepend(")
                .append(Sql::param(value))
                .push(", ")
                .append(column)
                .push(")"),
        )
    }

    // ==================== ordering ====================

    fn order_term(&self, expr: Sql, descending: bool, nulls_first: Option<bool>) -> Sql {
        let mut term = expr.push(if descending { " DESC" } else { " ASC" });
        match nulls_first {
            Some(true) => term = term.push(" NULLS FIRST"),
            Some(false) => term = term.push(" NULLS LAST"),
            None => {}
        }
        term
    }

    // ==================== assembly ====================

    fn assemble_select(&self, mut parts: SelectParts) -> Sql {
        let exprs = match std::mem::replace(&mut parts.distinct, Distinct::None) {
            Distinct::On { exprs, .. } => exprs,
            other => {
                parts.distinct = other;
                return self.assemble_plain_select(parts);
            }
        };
        let mut sql = Sql::raw("SELECT DISTINCT ON (")
            .append(Sql::join(exprs, ", "))
            .push(") ")
            .append(Sql::join(parts.columns, ", "));
        sql = sql.append(self.from_clause(parts.from));
        for join in parts.joins {
            sql = sql.append(join);
        }
        if let Some(condition) = parts.where_clause {
            sql = sql.append(self.where_clause(condition));
        }
        if !parts.group_by.is_empty() {
            sql = sql.append(self.group_by_clause(parts.group_by));
        }
        if let Some(condition) = parts.having {
            sql = sql.append(self.having_clause(condition));
        }
        if !parts.order_by.is_empty() {
            sql = sql.append(self.order_by_clause(parts.order_by));
        }
        if let Some(limit) = parts.limit {
            sql = sql.append(self.limit_clause(limit));
        }
        if let Some(offset) = parts.offset {
            sql = sql.append(self.offset_clause(offset));
        }
        sql
    }

    // ==================== session ====================

    fn last_insert_id(&self) -> Sql {
        Sql::raw("lastval()")
    }

    // ==================== migration hooks ====================

    fn introspection_queries(&self) -> Vec<(&'static str, Sql)> {
        vec![
            (
                "tables",
                Sql::raw(
                    "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = 'public'",
                ),
            ),
            (
                "columns",
                Sql::raw(
                    "SELECT table_name, column_name, data_type, is_nullable, column_default \
                     FROM information_schema.columns WHERE table_schema = 'public'",
                ),
            ),
            (
                "indexes",
                Sql::raw(
                    "SELECT tablename, indexname, indexdef FROM pg_catalog.pg_indexes \
                     WHERE schemaname = 'public'",
                ),
            ),
        ]
    }

    fn generate_ddl(&self, schema: &Schema, op: DdlOp<'_>) -> Result<Sql> {
        ddl::generate(self, schema, op)
    }

    fn map_field_type(&self, field: &FieldState) -> String {
        ddl::column_type(self, field)
    }

    fn default_expression(&self, field: &FieldState) -> Option<Sql> {
        ddl::default_expression(field)
    }

    fn supports_native_enums(&self) -> bool {
        true
    }

    fn enum_column_type(&self, name: &str, _values: &[String]) -> String {
        format!("\"{name}\"")
    }

    // ==================== optional feature groups ====================

    fn vector(&self) -> FeatureSupport<'_, dyn VectorOps> {
        FeatureSupport::Supported(&PostgresVector)
    }

    fn geospatial(&self) -> FeatureSupport<'_, dyn GeoOps> {
        FeatureSupport::Supported(&PostgresGeo)
    }
}
