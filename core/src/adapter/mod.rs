//! The dialect adapter: every SQL fragment the engine emits goes through one
//! of these methods.
//!
//! An adapter is a set of small pure emitters from [`Sql`] inputs (or plain
//! values) to [`Sql`]. It encodes a dialect's syntax, never a query's
//! semantics — the planner decides *what* to emit, the adapter decides *how*
//! it is spelled. Portable spellings live here as default methods; each
//! dialect crate overrides the divergent ones.

mod capabilities;
mod feature;

pub use capabilities::Capabilities;
pub use feature::{FeatureSupport, GeoOps, VectorOps};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::parse::Row;
use crate::query::Operation;
use crate::schema::{FieldState, IndexDef, ModelState, RelationKind};
use crate::sql::Sql;
use crate::value::Value;
use serde_json::Value as JsonValue;

/// DISTINCT treatment for an assembled SELECT.
#[derive(Debug, Clone)]
pub enum Distinct {
    None,
    /// Plain `SELECT DISTINCT`.
    All,
    /// `DISTINCT ON (exprs)` on PostgreSQL; simulated with `ROW_NUMBER() OVER
    /// (PARTITION BY exprs)` elsewhere. `output_aliases` lists the projected
    /// column names the simulation must re-select from its inner query.
    On {
        exprs: Vec<Sql>,
        output_aliases: Vec<String>,
    },
}

/// Named parts handed to [`SqlAdapter::assemble_select`].
#[derive(Debug, Clone)]
pub struct SelectParts {
    pub distinct: Distinct,
    pub columns: Vec<Sql>,
    pub from: Sql,
    pub joins: Vec<Sql>,
    pub where_clause: Option<Sql>,
    pub group_by: Vec<Sql>,
    pub having: Option<Sql>,
    pub order_by: Vec<Sql>,
    pub limit: Option<i64>,
    pub offset: Option<u64>,
}

impl SelectParts {
    pub fn new(columns: Vec<Sql>, from: Sql) -> Self {
        Self {
            distinct: Distinct::None,
            columns,
            from,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// Prefix/suffix pair applied to an INSERT that must tolerate duplicates.
#[derive(Debug, Clone)]
pub struct SkipDuplicates {
    /// Inserted between `INSERT` and `INTO` (`" IGNORE"` on MySQL).
    pub prefix: Sql,
    /// Appended after the VALUES list (`" ON CONFLICT DO NOTHING"`).
    pub suffix: Sql,
}

/// A DDL operation for the migration hooks.
#[derive(Debug, Clone, Copy)]
pub enum DdlOp<'a> {
    CreateTable(&'a ModelState),
    DropTable(&'a str),
    CreateIndex {
        model: &'a ModelState,
        index: &'a IndexDef,
    },
    CreateEnum {
        name: &'a str,
        values: &'a [String],
    },
}

/// The full emitter set for one dialect.
///
/// Grouped by concern, matching the planner's call sites: identifiers,
/// literals, operators, expressions, aggregates, json, arrays, ordering,
/// clauses, set-assignments, relation-filter wrappers, subqueries, assembly,
/// CTEs, mutations, joins, set operations, migration hooks, optional feature
/// groups, and result-parsing middleware.
pub trait SqlAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;
    fn capabilities(&self) -> Capabilities;

    // ==================== identifiers ====================

    fn escape(&self, name: &str) -> Sql {
        Sql::ident(name.to_string())
    }

    /// `"alias"."column"`
    fn column(&self, alias: &str, column: &str) -> Sql {
        Sql::ident(alias.to_string())
            .push(".")
            .append(Sql::ident(column.to_string()))
    }

    /// `"table" AS "alias"`
    fn table(&self, name: &str, alias: &str) -> Sql {
        Sql::ident(name.to_string())
            .push(" AS ")
            .append(Sql::ident(alias.to_string()))
    }

    /// `expr AS "alias"`
    fn aliased(&self, expr: Sql, alias: &str) -> Sql {
        expr.push(" AS ").append(Sql::ident(alias.to_string()))
    }

    // ==================== literals ====================

    /// Binds a value as a parameter, coercing shapes the dialect cannot bind
    /// natively (JSON and lists on MySQL/SQLite serialize to text).
    fn value(&self, value: Value) -> Sql {
        Sql::param(value)
    }

    fn null_literal(&self) -> Sql {
        Sql::raw("NULL")
    }

    fn true_literal(&self) -> Sql {
        Sql::raw("TRUE")
    }

    fn false_literal(&self) -> Sql {
        Sql::raw("FALSE")
    }

    /// A parenthesized, comma-separated parameter list.
    fn list(&self, items: Vec<Value>) -> Sql {
        Sql::join(items.into_iter().map(|item| self.value(item)), ", ").parens()
    }

    /// A JSON document parameter. PostgreSQL binds JSON natively; the others
    /// serialize first.
    fn json_literal(&self, value: &JsonValue) -> Sql {
        Sql::param(Value::Text(value.to_string()))
    }

    // ==================== operators ====================

    fn eq(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" = ").append(rhs)
    }

    fn ne(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" <> ").append(rhs)
    }

    fn lt(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" < ").append(rhs)
    }

    fn lte(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" <= ").append(rhs)
    }

    fn gt(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" > ").append(rhs)
    }

    fn gte(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" >= ").append(rhs)
    }

    fn like(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" LIKE ").append(rhs)
    }

    /// Case-insensitive LIKE: `ILIKE` on PostgreSQL, `COLLATE NOCASE` on
    /// SQLite, lower-folded LIKE on MySQL.
    fn ilike(&self, lhs: Sql, rhs: Sql) -> Sql {
        self.like(lhs, rhs)
    }

    /// `lhs IN (items)`; an empty list degrades to FALSE.
    fn in_list(&self, lhs: Sql, items: Vec<Value>) -> Sql {
        if items.is_empty() {
            return self.false_literal();
        }
        lhs.push(" IN ").append(self.list(items))
    }

    /// `lhs NOT IN (items)`; an empty list degrades to TRUE.
    fn not_in_list(&self, lhs: Sql, items: Vec<Value>) -> Sql {
        if items.is_empty() {
            return self.true_literal();
        }
        lhs.push(" NOT IN ").append(self.list(items))
    }

    fn is_null(&self, expr: Sql) -> Sql {
        expr.push(" IS NULL")
    }

    fn is_not_null(&self, expr: Sql) -> Sql {
        expr.push(" IS NOT NULL")
    }

    fn between(&self, expr: Sql, low: Sql, high: Sql) -> Sql {
        expr.push(" BETWEEN ").append(low).push(" AND ").append(high)
    }

    /// Conjunction; empty input degrades to TRUE, a single condition passes
    /// through unwrapped.
    fn and(&self, mut conditions: Vec<Sql>) -> Sql {
        match conditions.len() {
            0 => self.true_literal(),
            1 => conditions.remove(0),
            _ => Sql::join(conditions.into_iter().map(Sql::parens), " AND "),
        }
    }

    /// Disjunction; empty input degrades to FALSE, a single condition passes
    /// through unwrapped.
    fn or(&self, mut conditions: Vec<Sql>) -> Sql {
        match conditions.len() {
            0 => self.false_literal(),
            1 => conditions.remove(0),
            _ => Sql::join(conditions.into_iter().map(Sql::parens), " OR "),
        }
    }

    fn not(&self, condition: Sql) -> Sql {
        Sql::raw("NOT ").append(condition.parens())
    }

    fn exists(&self, subquery: Sql) -> Sql {
        Sql::raw("EXISTS ").append(subquery.parens())
    }

    fn not_exists(&self, subquery: Sql) -> Sql {
        Sql::raw("NOT EXISTS ").append(subquery.parens())
    }

    // ==================== expressions ====================

    fn add(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" + ").append(rhs)
    }

    fn sub(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" - ").append(rhs)
    }

    fn mul(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" * ").append(rhs)
    }

    fn div(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" / ").append(rhs)
    }

    fn upper(&self, expr: Sql) -> Sql {
        Sql::func("UPPER", expr)
    }

    fn lower(&self, expr: Sql) -> Sql {
        Sql::func("LOWER", expr)
    }

    fn concat(&self, parts: Vec<Sql>) -> Sql {
        Sql::func("CONCAT", Sql::join(parts, ", "))
    }

    fn coalesce(&self, parts: Vec<Sql>) -> Sql {
        Sql::func("COALESCE", Sql::join(parts, ", "))
    }

    fn greatest(&self, parts: Vec<Sql>) -> Sql {
        Sql::func("GREATEST", Sql::join(parts, ", "))
    }

    fn least(&self, parts: Vec<Sql>) -> Sql {
        Sql::func("LEAST", Sql::join(parts, ", "))
    }

    fn cast(&self, expr: Sql, ty: &str) -> Sql {
        Sql::raw("CAST(")
            .append(expr)
            .push(" AS ")
            .push(ty.to_string())
            .push(")")
    }

    // ==================== aggregates ====================

    fn count_star(&self) -> Sql {
        Sql::raw("COUNT(*)")
    }

    fn count(&self, expr: Sql) -> Sql {
        Sql::func("COUNT", expr)
    }

    fn count_distinct(&self, expr: Sql) -> Sql {
        Sql::raw("COUNT(DISTINCT ").append(expr).push(")")
    }

    fn sum(&self, expr: Sql) -> Sql {
        Sql::func("SUM", expr)
    }

    fn avg(&self, expr: Sql) -> Sql {
        Sql::func("AVG", expr)
    }

    fn min(&self, expr: Sql) -> Sql {
        Sql::func("MIN", expr)
    }

    fn max(&self, expr: Sql) -> Sql {
        Sql::func("MAX", expr)
    }

    // ==================== json ====================

    /// A JSON object from key/expression pairs.
    fn json_object(&self, pairs: Vec<(String, Sql)>) -> Sql;

    /// A JSON array from expressions.
    fn json_array(&self, items: Vec<Sql>) -> Sql;

    /// The empty JSON array literal.
    fn json_empty_array(&self) -> Sql;

    /// Aggregates `expr` over the group into a JSON array, never NULL: an
    /// empty group yields the empty array. `order_by` orders elements within
    /// the aggregate where the dialect allows it.
    fn json_agg(&self, expr: Sql, order_by: Option<Sql>) -> Sql;

    /// Whether [`SqlAdapter::json_agg`] accepts an ORDER BY inside the
    /// aggregate. When false, ordered to-many relations pre-sort in an inner
    /// subquery instead.
    fn json_agg_supports_order(&self) -> bool {
        false
    }

    /// The type name used to cast wide numerics to text inside JSON
    /// aggregation (`TEXT`; MySQL spells it `CHAR`).
    fn text_cast_type(&self) -> &'static str {
        "TEXT"
    }

    /// The type name used to cast JSON-extracted text for numeric
    /// comparison.
    fn numeric_cast_type(&self) -> &'static str {
        "NUMERIC"
    }

    /// The whole row of `alias` as a JSON object. PostgreSQL only; portable
    /// callers use [`SqlAdapter::json_object`] over explicit columns.
    fn row_to_json(&self, alias: &str) -> Result<Sql> {
        let _ = alias;
        Err(Error::FeatureNotSupported {
            feature: "row_to_json",
            dialect: self.dialect().name(),
        })
    }

    /// Extracts the JSON value at `path`.
    fn json_extract(&self, expr: Sql, path: &[String]) -> Sql;

    /// Extracts the value at `path` as text.
    fn json_extract_text(&self, expr: Sql, path: &[String]) -> Sql;

    // ==================== arrays ====================

    /// An array literal: native `ARRAY[..]` on PostgreSQL, a JSON array
    /// elsewhere.
    fn array_literal(&self, items: Vec<Value>) -> Sql;

    /// The array column contains `value`.
    fn array_has(&self, column: Sql, value: Value) -> Sql;

    /// The array column contains every listed value.
    fn array_has_every(&self, column: Sql, values: Vec<Value>) -> Sql;

    /// The array column contains at least one listed value.
    fn array_has_some(&self, column: Sql, values: Vec<Value>) -> Sql;

    fn array_is_empty(&self, column: Sql, empty: bool) -> Sql;

    fn array_length(&self, column: Sql) -> Sql;

    /// Zero-based element access.
    fn array_element(&self, column: Sql, index: i64) -> Sql;

    // ==================== ordering ====================

    /// One ORDER BY term. NULLS placement is emitted on PostgreSQL and
    /// dropped elsewhere.
    fn order_term(
        &self,
        expr: Sql,
        descending: bool,
        nulls_first: Option<bool>,
    ) -> Sql {
        let _ = nulls_first;
        expr.push(if descending { " DESC" } else { " ASC" })
    }

    // ==================== clauses ====================

    fn select_clause(&self, columns: Vec<Sql>) -> Sql {
        Sql::raw("SELECT ").append(Sql::join(columns, ", "))
    }

    fn select_distinct_clause(&self, columns: Vec<Sql>) -> Sql {
        Sql::raw("SELECT DISTINCT ").append(Sql::join(columns, ", "))
    }

    fn from_clause(&self, table: Sql) -> Sql {
        Sql::raw(" FROM ").append(table)
    }

    fn where_clause(&self, condition: Sql) -> Sql {
        Sql::raw(" WHERE ").append(condition)
    }

    fn order_by_clause(&self, terms: Vec<Sql>) -> Sql {
        Sql::raw(" ORDER BY ").append(Sql::join(terms, ", "))
    }

    fn group_by_clause(&self, exprs: Vec<Sql>) -> Sql {
        Sql::raw(" GROUP BY ").append(Sql::join(exprs, ", "))
    }

    fn having_clause(&self, condition: Sql) -> Sql {
        Sql::raw(" HAVING ").append(condition)
    }

    fn limit_clause(&self, limit: i64) -> Sql {
        Sql::raw(" LIMIT ").push(limit.to_string())
    }

    fn offset_clause(&self, offset: u64) -> Sql {
        Sql::raw(" OFFSET ").push(offset.to_string())
    }

    // ==================== set (update assignments) ====================

    fn assign(&self, column: Sql, value: Sql) -> Sql {
        column.push(" = ").append(value)
    }

    fn assign_increment(&self, column: Sql, value: Sql) -> Sql {
        let target = column.clone();
        self.assign(target, self.add(column, value))
    }

    fn assign_decrement(&self, column: Sql, value: Sql) -> Sql {
        let target = column.clone();
        self.assign(target, self.sub(column, value))
    }

    fn assign_multiply(&self, column: Sql, value: Sql) -> Sql {
        let target = column.clone();
        self.assign(target, self.mul(column, value))
    }

    fn assign_divide(&self, column: Sql, value: Sql) -> Sql {
        let target = column.clone();
        self.assign(target, self.div(column, value))
    }

    /// Appends an element to an array column.
    fn assign_push(&self, column: Sql, value: Value) -> Sql;

    /// Prepends an element to an array column.
    fn assign_unshift(&self, column: Sql, value: Value) -> Sql;

    // ==================== relation-filter wrappers ====================

    /// `some` — at least one related row matches.
    fn filter_some(&self, subquery: Sql) -> Sql {
        self.exists(subquery)
    }

    /// `every` — receives the subquery of *non-matching* rows.
    fn filter_every(&self, non_matching_subquery: Sql) -> Sql {
        self.not_exists(non_matching_subquery)
    }

    /// `none` — no related row matches.
    fn filter_none(&self, subquery: Sql) -> Sql {
        self.not_exists(subquery)
    }

    fn filter_is(&self, subquery: Sql) -> Sql {
        self.exists(subquery)
    }

    fn filter_is_not(&self, subquery: Sql) -> Sql {
        self.not_exists(subquery)
    }

    // ==================== subqueries ====================

    /// A scalar subquery: `(SELECT ...)`.
    fn scalar_subquery(&self, query: Sql) -> Sql {
        query.parens()
    }

    /// A derived table: `(SELECT ...) AS "alias"`.
    fn correlate(&self, query: Sql, alias: &str) -> Sql {
        query
            .parens()
            .push(" AS ")
            .append(Sql::ident(alias.to_string()))
    }

    /// `EXISTS (SELECT 1 FROM from WHERE where)`.
    fn exists_check(&self, from: Sql, condition: Sql) -> Sql {
        self.exists(
            Sql::raw("SELECT 1")
                .append(self.from_clause(from))
                .append(self.where_clause(condition)),
        )
    }

    // ==================== assembly ====================

    /// Assembles a complete SELECT from named parts.
    ///
    /// The default covers `Distinct::None` / `Distinct::All` and simulates
    /// `Distinct::On` by wrapping the statement in a `ROW_NUMBER() OVER
    /// (PARTITION BY ...)` derived table. PostgreSQL overrides with native
    /// `DISTINCT ON`.
    fn assemble_select(&self, mut parts: SelectParts) -> Sql {
        let distinct = std::mem::replace(&mut parts.distinct, Distinct::None);
        match distinct {
            Distinct::On {
                exprs,
                output_aliases,
            } => {
                let columns = std::mem::take(&mut parts.columns);
                self.assemble_distinct_on_simulated(columns, exprs, output_aliases, parts)
            }
            other => {
                parts.distinct = other;
                self.assemble_plain_select(parts)
            }
        }
    }

    /// Shared plain-SELECT assembly (no DISTINCT ON).
    fn assemble_plain_select(&self, parts: SelectParts) -> Sql {
        let mut sql = match parts.distinct {
            Distinct::All => self.select_distinct_clause(parts.columns),
            _ => self.select_clause(parts.columns),
        };
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

    /// `DISTINCT ON` simulation: the inner query ranks rows per partition,
    /// the outer keeps rank 1 and re-applies ordering and paging.
    fn assemble_distinct_on_simulated(
        &self,
        columns: Vec<Sql>,
        partition: Vec<Sql>,
        output_aliases: Vec<String>,
        parts: SelectParts,
    ) -> Sql {
        let mut window = Sql::raw("ROW_NUMBER() OVER (PARTITION BY ")
            .append(Sql::join(partition, ", "));
        if !parts.order_by.is_empty() {
            window = window
                .push(" ORDER BY ")
                .append(Sql::join(parts.order_by.clone(), ", "));
        }
        window = window.push(")");

        let mut inner_columns = columns;
        inner_columns.push(self.aliased(window, "__rn"));

        let inner = self.assemble_plain_select(SelectParts {
            distinct: Distinct::None,
            columns: inner_columns,
            from: parts.from,
            joins: parts.joins,
            where_clause: parts.where_clause,
            group_by: parts.group_by,
            having: parts.having,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        });

        let outer_columns: Vec<Sql> = output_aliases
            .iter()
            .map(|alias| self.column("__dist", alias))
            .collect();
        let rn_filter = self.eq(self.column("__dist", "__rn"), Sql::raw("1"));

        self.assemble_plain_select(SelectParts {
            distinct: Distinct::None,
            columns: outer_columns,
            from: self.correlate(inner, "__dist"),
            joins: Vec::new(),
            where_clause: Some(rn_filter),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: parts.limit,
            offset: parts.offset,
        })
    }

    // ==================== ctes ====================

    /// `WITH a AS (...), b AS (...) body`.
    fn with(&self, defs: Vec<(String, Sql)>, body: Sql) -> Sql {
        let defs = Sql::join(
            defs.into_iter().map(|(name, query)| {
                Sql::ident(name).push(" AS ").append(query.parens())
            }),
            ", ",
        );
        Sql::raw("WITH ").append(defs).push(" ").append(body)
    }

    /// `WITH RECURSIVE name AS (anchor UNION [ALL] recursive) body`.
    fn with_recursive(
        &self,
        name: &str,
        anchor: Sql,
        recursive: Sql,
        union_all: bool,
        body: Sql,
    ) -> Sql {
        Sql::raw("WITH RECURSIVE ")
            .append(Sql::ident(name.to_string()))
            .push(" AS ")
            .append(
                anchor
                    .push(if union_all { " UNION ALL " } else { " UNION " })
                    .append(recursive)
                    .parens(),
            )
            .push(" ")
            .append(body)
    }

    // ==================== mutations ====================

    /// `INSERT INTO table (columns) VALUES (...), (...)`. Empty columns emit
    /// the dialect's all-defaults row.
    fn insert(
        &self,
        table: Sql,
        columns: Vec<Sql>,
        rows: Vec<Vec<Sql>>,
        skip_duplicates: bool,
    ) -> Sql {
        let skip = if skip_duplicates {
            Some(self.skip_duplicates())
        } else {
            None
        };
        let mut sql = Sql::raw("INSERT");
        if let Some(skip) = &skip {
            sql = sql.append(skip.prefix.clone());
        }
        sql = sql.push(" INTO ").append(table);
        if columns.is_empty() {
            sql = sql.append(self.default_values_clause());
        } else {
            sql = sql
                .push(" ")
                .append(Sql::join(columns, ", ").parens())
                .push(" VALUES ")
                .append(Sql::join(
                    rows.into_iter().map(|row| Sql::join(row, ", ").parens()),
                    ", ",
                ));
        }
        if let Some(skip) = skip {
            sql = sql.append(skip.suffix);
        }
        sql
    }

    /// The all-defaults VALUES clause (`DEFAULT VALUES`; MySQL spells it
    /// `() VALUES ()`).
    fn default_values_clause(&self) -> Sql {
        Sql::raw(" DEFAULT VALUES")
    }

    /// The per-cell "use the column default" expression in a multi-row
    /// INSERT. SQLite has no DEFAULT keyword there and falls back to NULL.
    fn default_keyword(&self) -> Sql {
        Sql::raw("DEFAULT")
    }

    fn update(&self, table: Sql, sets: Vec<Sql>, where_clause: Option<Sql>) -> Sql {
        let mut sql = Sql::raw("UPDATE ")
            .append(table)
            .push(" SET ")
            .append(Sql::join(sets, ", "));
        if let Some(condition) = where_clause {
            sql = sql.append(self.where_clause(condition));
        }
        sql
    }

    fn delete(&self, table: Sql, where_clause: Option<Sql>) -> Sql {
        let mut sql = Sql::raw("DELETE FROM ").append(table);
        if let Some(condition) = where_clause {
            sql = sql.append(self.where_clause(condition));
        }
        sql
    }

    /// ` RETURNING cols`; empty on MySQL.
    fn returning(&self, columns: Vec<Sql>) -> Sql {
        Sql::raw(" RETURNING ").append(Sql::join(columns, ", "))
    }

    /// Upsert conflict clause: `ON CONFLICT (target) DO UPDATE SET ...` /
    /// `ON DUPLICATE KEY UPDATE ...`.
    fn on_conflict_update(&self, target: Vec<Sql>, assignments: Vec<Sql>) -> Sql {
        Sql::raw(" ON CONFLICT ")
            .append(Sql::join(target, ", ").parens())
            .push(" DO UPDATE SET ")
            .append(Sql::join(assignments, ", "))
    }

    /// The duplicate-tolerant INSERT spelling for this dialect.
    fn skip_duplicates(&self) -> SkipDuplicates {
        SkipDuplicates {
            prefix: Sql::empty(),
            suffix: Sql::raw(" ON CONFLICT DO NOTHING"),
        }
    }

    // ==================== joins ====================

    fn join_inner(&self, table: Sql, on: Sql) -> Sql {
        Sql::raw(" INNER JOIN ").append(table).push(" ON ").append(on)
    }

    fn join_left(&self, table: Sql, on: Sql) -> Sql {
        Sql::raw(" LEFT JOIN ").append(table).push(" ON ").append(on)
    }

    fn join_right(&self, table: Sql, on: Sql) -> Sql {
        Sql::raw(" RIGHT JOIN ").append(table).push(" ON ").append(on)
    }

    fn join_full(&self, table: Sql, on: Sql) -> Result<Sql> {
        if !self.capabilities().supports_full_outer_join {
            return Err(Error::FeatureNotSupported {
                feature: "full_outer_join",
                dialect: self.dialect().name(),
            });
        }
        Ok(Sql::raw(" FULL OUTER JOIN ")
            .append(table)
            .push(" ON ")
            .append(on))
    }

    fn join_cross(&self, table: Sql) -> Sql {
        Sql::raw(" CROSS JOIN ").append(table)
    }

    /// `JOIN LATERAL (...) AS alias ON TRUE`. Only valid when
    /// `capabilities().supports_lateral_joins`.
    fn join_lateral(&self, subquery: Sql, alias: &str) -> Result<Sql> {
        if !self.capabilities().supports_lateral_joins {
            return Err(Error::FeatureNotSupported {
                feature: "lateral_join",
                dialect: self.dialect().name(),
            });
        }
        Ok(Sql::raw(" JOIN LATERAL ")
            .append(self.correlate(subquery, alias))
            .push(" ON TRUE"))
    }

    /// `LEFT JOIN LATERAL (...) AS alias ON TRUE`.
    fn join_lateral_left(&self, subquery: Sql, alias: &str) -> Result<Sql> {
        if !self.capabilities().supports_lateral_joins {
            return Err(Error::FeatureNotSupported {
                feature: "lateral_join",
                dialect: self.dialect().name(),
            });
        }
        Ok(Sql::raw(" LEFT JOIN LATERAL ")
            .append(self.correlate(subquery, alias))
            .push(" ON TRUE"))
    }

    // ==================== set operations ====================

    fn union(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" UNION ").append(rhs)
    }

    fn union_all(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" UNION ALL ").append(rhs)
    }

    fn intersect(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" INTERSECT ").append(rhs)
    }

    fn except(&self, lhs: Sql, rhs: Sql) -> Sql {
        lhs.push(" EXCEPT ").append(rhs)
    }

    // ==================== session ====================

    /// The session-local last-inserted-id expression, used to chain nested
    /// inserts when the dialect lacks RETURNING.
    fn last_insert_id(&self) -> Sql;

    // ==================== migration hooks ====================

    /// Queries the migration tool runs to introspect an existing database,
    /// keyed by what each one lists.
    fn introspection_queries(&self) -> Vec<(&'static str, Sql)>;

    /// Emits DDL for a schema operation. The schema is passed for
    /// cross-model lookups (foreign-key targets).
    fn generate_ddl(&self, schema: &crate::schema::Schema, op: DdlOp<'_>) -> Result<Sql>;

    /// The column type for a field.
    fn map_field_type(&self, field: &FieldState) -> String;

    /// The DDL DEFAULT expression for a field, where the default is
    /// database-side (engine-generated defaults return None).
    fn default_expression(&self, field: &FieldState) -> Option<Sql>;

    fn supports_native_enums(&self) -> bool {
        false
    }

    /// The column type used for an enum field.
    fn enum_column_type(&self, name: &str, values: &[String]) -> String {
        let _ = (name, values);
        "TEXT".to_string()
    }

    // ==================== optional feature groups ====================

    fn vector(&self) -> FeatureSupport<'_, dyn VectorOps> {
        FeatureSupport::Unsupported
    }

    fn geospatial(&self) -> FeatureSupport<'_, dyn GeoOps> {
        FeatureSupport::Unsupported
    }

    // ==================== result middleware ====================

    /// Coarsest hook: whole-result normalization (count column names, driver
    /// quirks). The default applies the built-in normalization.
    fn parse_result(&self, rows: Vec<Row>, operation: Operation) -> Result<Vec<Row>> {
        crate::parse::builtin_result(rows, operation)
    }

    /// Per-relation hook: invoked with the raw relation cell before its tree
    /// is walked. MySQL/SQLite deliver JSON aggregates as strings and decode
    /// here.
    fn parse_relation(&self, value: Value, kind: RelationKind) -> Result<Value> {
        crate::parse::builtin_relation(value, kind)
    }

    /// Per-scalar hook: restores driver-flattened values (0/1 booleans, TEXT
    /// BigInt, base64 bytes) to their field kind.
    fn parse_field(&self, value: Value, field: &FieldState) -> Result<Value> {
        crate::parse::builtin_field(value, field)
    }
}
