//! WHERE-tree compilation.
//!
//! Scalar leaves become operator fragments on the aliased column; relation
//! filters become correlated EXISTS / NOT EXISTS subqueries, with the
//! junction membership predicate folded in for many-to-many.

use super::context::AliasGen;
use super::QueryBuilder;
use crate::error::{Error, Result};
use crate::query::{Filter, QueryMode, RelationFilter, ScalarFilter};
use crate::schema::{FieldState, ModelId, ModelState, RelationState};
use crate::sql::Sql;
use crate::value::Value;

impl QueryBuilder<'_> {
    /// Compiles a filter tree against `alias`. Empty AND degrades to TRUE,
    /// empty OR to FALSE.
    pub(crate) fn compile_filter(
        &self,
        model: ModelId,
        alias: &str,
        filter: &Filter,
        aliases: &mut AliasGen,
    ) -> Result<Sql> {
        let state = self.schema.model(model);
        match filter {
            Filter::And(filters) => {
                let parts = filters
                    .iter()
                    .map(|inner| self.compile_filter(model, alias, inner, aliases))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.adapter.and(parts))
            }
            Filter::Or(filters) => {
                let parts = filters
                    .iter()
                    .map(|inner| self.compile_filter(model, alias, inner, aliases))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.adapter.or(parts))
            }
            Filter::Not(inner) => {
                let condition = self.compile_filter(model, alias, inner, aliases)?;
                Ok(self.adapter.not(condition))
            }
            Filter::Scalar { field, condition } => {
                let field_state = state.field(field)?;
                let column = self
                    .adapter
                    .column(alias, field_state.column_name());
                self.compile_scalar_condition(column, field_state, condition)
            }
            Filter::Relation {
                relation,
                condition,
            } => {
                let relation_state = state.relation(relation)?;
                self.compile_relation_condition(state, alias, relation_state, condition, aliases)
            }
        }
    }

    /// A scalar condition applied to an arbitrary expression (a column, or an
    /// aggregate in HAVING).
    pub(crate) fn compile_scalar_condition(
        &self,
        expr: Sql,
        field: &FieldState,
        condition: &ScalarFilter,
    ) -> Result<Sql> {
        let adapter = self.adapter;
        Ok(match condition {
            ScalarFilter::Equals(Value::Null) => adapter.is_null(expr),
            ScalarFilter::Equals(value) => {
                let rhs = self.encode_scalar_value(field, value.clone())?;
                adapter.eq(expr, rhs)
            }
            ScalarFilter::NotEquals(Value::Null) => adapter.is_not_null(expr),
            ScalarFilter::NotEquals(value) => {
                let rhs = self.encode_scalar_value(field, value.clone())?;
                adapter.ne(expr, rhs)
            }
            ScalarFilter::In(values) => adapter.in_list(expr, values.clone()),
            ScalarFilter::NotIn(values) => adapter.not_in_list(expr, values.clone()),
            ScalarFilter::Lt(value) => {
                let rhs = self.encode_scalar_value(field, value.clone())?;
                adapter.lt(expr, rhs)
            }
            ScalarFilter::Lte(value) => {
                let rhs = self.encode_scalar_value(field, value.clone())?;
                adapter.lte(expr, rhs)
            }
            ScalarFilter::Gt(value) => {
                let rhs = self.encode_scalar_value(field, value.clone())?;
                adapter.gt(expr, rhs)
            }
            ScalarFilter::Gte(value) => {
                let rhs = self.encode_scalar_value(field, value.clone())?;
                adapter.gte(expr, rhs)
            }
            ScalarFilter::Between(low, high) => {
                let low = self.encode_scalar_value(field, low.clone())?;
                let high = self.encode_scalar_value(field, high.clone())?;
                adapter.between(expr, low, high)
            }
            ScalarFilter::Contains { value, mode } => {
                self.like_condition(expr, &format!("%{}%", escape_like(value)), *mode)
            }
            ScalarFilter::StartsWith { value, mode } => {
                self.like_condition(expr, &format!("{}%", escape_like(value)), *mode)
            }
            ScalarFilter::EndsWith { value, mode } => {
                self.like_condition(expr, &format!("%{}", escape_like(value)), *mode)
            }
            ScalarFilter::IsNull(true) => adapter.is_null(expr),
            ScalarFilter::IsNull(false) => adapter.is_not_null(expr),
            ScalarFilter::Has(value) => adapter.array_has(expr, value.clone()),
            ScalarFilter::HasEvery(values) => adapter.array_has_every(expr, values.clone()),
            ScalarFilter::HasSome(values) => adapter.array_has_some(expr, values.clone()),
            ScalarFilter::IsEmpty(empty) => adapter.array_is_empty(expr, *empty),
            ScalarFilter::JsonPath { path, condition } => {
                self.compile_json_path_condition(expr, field, path, condition)?
            }
            ScalarFilter::Geo(op, value) => {
                let geo = adapter
                    .geospatial()
                    .require("geospatial", adapter.dialect().name())?;
                let rhs = geo.geometry(value.clone());
                geo.predicate(*op, expr, rhs)
            }
        })
    }

    fn like_condition(&self, expr: Sql, pattern: &str, mode: QueryMode) -> Sql {
        let rhs = Sql::param(Value::Text(pattern.to_string()));
        match mode {
            QueryMode::Default => self.adapter.like(expr, rhs),
            QueryMode::Insensitive => self.adapter.ilike(expr, rhs),
        }
    }

    /// Conditions at a JSON path: equality compares extracted text; ordered
    /// comparisons cast the extracted text to the dialect's numeric type;
    /// string matches run on the extracted text.
    fn compile_json_path_condition(
        &self,
        column: Sql,
        field: &FieldState,
        path: &[String],
        condition: &ScalarFilter,
    ) -> Result<Sql> {
        let adapter = self.adapter;
        match condition {
            ScalarFilter::Equals(Value::Null) => {
                Ok(adapter.is_null(adapter.json_extract(column, path)))
            }
            ScalarFilter::Equals(value) | ScalarFilter::NotEquals(value) => {
                let extracted = adapter.json_extract_text(column, path);
                let rhs = Sql::param(json_comparable_text(value));
                Ok(match condition {
                    ScalarFilter::Equals(_) => adapter.eq(extracted, rhs),
                    _ => adapter.ne(extracted, rhs),
                })
            }
            ScalarFilter::Lt(value)
            | ScalarFilter::Lte(value)
            | ScalarFilter::Gt(value)
            | ScalarFilter::Gte(value) => {
                let extracted = adapter.cast(
                    adapter.json_extract_text(column, path),
                    adapter.numeric_cast_type(),
                );
                let rhs = Sql::param(value.clone());
                Ok(match condition {
                    ScalarFilter::Lt(_) => adapter.lt(extracted, rhs),
                    ScalarFilter::Lte(_) => adapter.lte(extracted, rhs),
                    ScalarFilter::Gt(_) => adapter.gt(extracted, rhs),
                    _ => adapter.gte(extracted, rhs),
                })
            }
            ScalarFilter::Contains { value, mode }
            | ScalarFilter::StartsWith { value, mode }
            | ScalarFilter::EndsWith { value, mode } => {
                let extracted = adapter.json_extract_text(column, path);
                let pattern = match condition {
                    ScalarFilter::Contains { .. } => format!("%{}%", escape_like(value)),
                    ScalarFilter::StartsWith { .. } => format!("{}%", escape_like(value)),
                    _ => format!("%{}", escape_like(value)),
                };
                Ok(self.like_condition(extracted, &pattern, *mode))
            }
            other => Err(Error::Validation {
                model: field.name.clone(),
                operation: "where",
                message: format!("unsupported json path condition: {other:?}"),
            }),
        }
    }

    /// The join predicate correlating a relation's target rows back to the
    /// parent alias. Many-to-many adds the junction membership subquery.
    pub(crate) fn link_condition(
        &self,
        parent_state: &ModelState,
        parent_alias: &str,
        relation: &RelationState,
        child_alias: &str,
        aliases: &mut AliasGen,
    ) -> Result<Sql> {
        let adapter = self.adapter;
        let target_state = self.schema.model(relation.target);

        if let Some(junction) = &relation.junction {
            let junction_alias = aliases.next_alias();
            let parent_field = parent_state.field(&relation.on_fields[0])?;
            let target_field = target_state.field(&relation.ref_fields[0])?;
            let on_parent = adapter.eq(
                adapter.column(&junction_alias, &junction.a_column),
                adapter.column(parent_alias, parent_field.column_name()),
            );
            let on_target = adapter.eq(
                adapter.column(&junction_alias, &junction.b_column),
                adapter.column(child_alias, target_field.column_name()),
            );
            let membership = Sql::raw("SELECT 1")
                .append(adapter.from_clause(adapter.table(&junction.table, &junction_alias)))
                .append(adapter.where_clause(adapter.and(vec![on_parent, on_target])));
            return Ok(adapter.exists(membership));
        }

        let mut pairs = Vec::with_capacity(relation.on_fields.len());
        for (on, reference) in relation.on_fields.iter().zip(&relation.ref_fields) {
            let parent_field = parent_state.field(on)?;
            let target_field = target_state.field(reference)?;
            pairs.push(adapter.eq(
                adapter.column(child_alias, target_field.column_name()),
                adapter.column(parent_alias, parent_field.column_name()),
            ));
        }
        Ok(self.adapter.and(pairs))
    }

    fn compile_relation_condition(
        &self,
        parent_state: &ModelState,
        parent_alias: &str,
        relation: &RelationState,
        condition: &RelationFilter,
        aliases: &mut AliasGen,
    ) -> Result<Sql> {
        let adapter = self.adapter;
        let child_alias = aliases.next_alias();
        let target_state = self.schema.model(relation.target);
        let link =
            self.link_condition(parent_state, parent_alias, relation, &child_alias, aliases)?;
        let from = adapter.table(target_state.table_name(), &child_alias);

        let subquery = |condition: Sql| {
            Sql::raw("SELECT 1")
                .append(adapter.from_clause(from.clone()))
                .append(adapter.where_clause(condition))
        };

        Ok(match condition {
            RelationFilter::Some(inner) => {
                let inner = self.compile_filter(relation.target, &child_alias, inner, aliases)?;
                adapter.filter_some(subquery(adapter.and(vec![link, inner])))
            }
            RelationFilter::None(inner) => {
                let inner = self.compile_filter(relation.target, &child_alias, inner, aliases)?;
                adapter.filter_none(subquery(adapter.and(vec![link, inner])))
            }
            // `every` asks for the absence of a counter-example; with no
            // children it is vacuously true.
            RelationFilter::Every(inner) => {
                let inner = self.compile_filter(relation.target, &child_alias, inner, aliases)?;
                let non_matching = adapter.and(vec![link, adapter.not(inner)]);
                adapter.filter_every(subquery(non_matching))
            }
            RelationFilter::Is(Some(inner)) => {
                let inner = self.compile_filter(relation.target, &child_alias, inner, aliases)?;
                adapter.filter_is(subquery(adapter.and(vec![link, inner])))
            }
            RelationFilter::Is(None) => adapter.filter_is_not(subquery(link)),
            RelationFilter::IsNot(Some(inner)) => {
                let inner = self.compile_filter(relation.target, &child_alias, inner, aliases)?;
                adapter.filter_is_not(subquery(adapter.and(vec![link, inner])))
            }
            RelationFilter::IsNot(None) => adapter.filter_is(subquery(link)),
        })
    }
}

/// Escapes LIKE metacharacters in a user value so it matches literally.
pub(crate) fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// The text form a JSON-extracted value is compared against.
fn json_comparable_text(value: &Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_json().to_string().trim_matches('"').to_string()),
    }
}
