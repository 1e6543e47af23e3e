//! Relation loading.
//!
//! Each selected relation materializes as one JSON-valued column on the
//! parent row: a JSON array of objects for to-many (never NULL — empty
//! aggregates to `[]`), a JSON object or NULL for to-one. Keys inside the
//! JSON are field names, not column names, and wide numerics are cast to
//! text inside the aggregation so precision survives the JSON trip.
//!
//! Two strategies, chosen per dialect: LATERAL joins when the adapter
//! supports them, correlated scalar subqueries otherwise.

use super::context::AliasGen;
use super::QueryBuilder;
use crate::adapter::{Distinct, SelectParts};
use crate::error::Result;
use crate::query::{RelationArgs, Selection};
use crate::schema::{FieldKind, FieldState, ModelId, ModelState, RelationState};
use crate::sql::Sql;

/// The alias relation subqueries expose their JSON payload under in lateral
/// mode.
const DATA_COLUMN: &str = "__data";

impl QueryBuilder<'_> {
    /// Builds the projection columns and (in lateral mode) join fragments for
    /// every relation in `selection`.
    pub(crate) fn relation_columns(
        &self,
        model: ModelId,
        alias: &str,
        selection: &Selection,
        aliases: &mut AliasGen,
    ) -> Result<(Vec<Sql>, Vec<Sql>)> {
        let state = self.schema.model(model);
        let mut columns = Vec::new();
        let mut joins = Vec::new();
        for (name, args) in &selection.relations {
            let relation = state.relation(name)?;
            if self.adapter.capabilities().supports_lateral_joins {
                let data_alias = aliases.next_alias();
                let subquery =
                    self.relation_json_query(state, alias, relation, args, aliases, true)?;
                joins.push(self.adapter.join_lateral_left(subquery, &data_alias)?);
                columns.push(
                    self.adapter
                        .aliased(self.adapter.column(&data_alias, DATA_COLUMN), name),
                );
            } else {
                let subquery =
                    self.relation_json_query(state, alias, relation, args, aliases, false)?;
                columns.push(
                    self.adapter
                        .aliased(self.adapter.scalar_subquery(subquery), name),
                );
            }
        }
        Ok((columns, joins))
    }

    /// The JSON subquery for one relation:
    /// `SELECT <json-aggregate> FROM child WHERE link AND user_where ...`,
    /// with an inner derived table when ordering or paging must apply before
    /// aggregation.
    fn relation_json_query(
        &self,
        parent_state: &ModelState,
        parent_alias: &str,
        relation: &RelationState,
        args: &RelationArgs,
        aliases: &mut AliasGen,
        with_data_alias: bool,
    ) -> Result<Sql> {
        let adapter = self.adapter;
        let target_state = self.schema.model(relation.target);
        let child_alias = aliases.next_alias();
        let to_many = relation.kind.is_to_many();

        let link = self.link_condition(
            parent_state,
            parent_alias,
            relation,
            &child_alias,
            aliases,
        )?;
        let mut conditions = vec![link];
        if let Some(filter) = &args.filter {
            conditions.push(self.compile_filter(relation.target, &child_alias, filter, aliases)?);
        }
        let where_all = adapter.and(conditions);

        // Negative take reads from the end: reverse the ordering, clamp the
        // limit.
        let mut order_by = args.order_by.clone();
        let mut take = args.take;
        if let Some(n) = take {
            if n < 0 {
                order_by = order_by.into_iter().map(|term| term.reversed()).collect();
                take = Some(-n);
            }
        }
        let order_terms =
            self.order_terms(relation.target, &child_alias, &order_by, aliases)?;

        let order_in_agg = to_many
            && !order_terms.is_empty()
            && adapter.json_agg_supports_order()
            && take.is_none()
            && args.skip.is_none();
        let needs_inner = to_many
            && (take.is_some() || args.skip.is_some() || (!order_terms.is_empty() && !order_in_agg));

        // JSON payload: declared scalars plus nested relation subqueries.
        let mut pairs = Vec::new();
        let field_states: Vec<&FieldState> = match &args.selection.fields {
            Some(names) => names
                .iter()
                .map(|name| target_state.field(name))
                .collect::<Result<_>>()?,
            None => target_state.scalar_fields().collect(),
        };
        for field in &field_states {
            let column = adapter.column(&child_alias, field.column_name());
            let expr = if matches!(field.kind, FieldKind::BigInt | FieldKind::Decimal) {
                adapter.cast(column, adapter.text_cast_type())
            } else {
                column
            };
            pairs.push((field.name.clone(), expr));
        }

        let mut nested_joins = Vec::new();
        for (nested_name, nested_args) in &args.selection.relations {
            let nested_relation = target_state.relation(nested_name)?;
            if adapter.capabilities().supports_lateral_joins {
                let nested_alias = aliases.next_alias();
                let nested_query = self.relation_json_query(
                    target_state,
                    &child_alias,
                    nested_relation,
                    nested_args,
                    aliases,
                    true,
                )?;
                nested_joins.push(adapter.join_lateral_left(nested_query, &nested_alias)?);
                pairs.push((
                    nested_name.clone(),
                    adapter.column(&nested_alias, DATA_COLUMN),
                ));
            } else {
                let nested_query = self.relation_json_query(
                    target_state,
                    &child_alias,
                    nested_relation,
                    nested_args,
                    aliases,
                    false,
                )?;
                pairs.push((nested_name.clone(), adapter.scalar_subquery(nested_query)));
            }
        }

        let object = adapter.json_object(pairs);
        let payload = if to_many {
            let agg_order = if order_in_agg {
                Some(Sql::join(order_terms.clone(), ", "))
            } else {
                None
            };
            adapter.json_agg(object, agg_order)
        } else {
            object
        };
        let payload = if with_data_alias {
            adapter.aliased(payload, DATA_COLUMN)
        } else {
            payload
        };

        let source = adapter.table(target_state.table_name(), &child_alias);

        if needs_inner {
            // Rank, order, and page the child rows first; aggregate the
            // derived table. The inner query re-exposes every scalar column
            // under the same alias so the JSON payload and nested links read
            // unchanged.
            let inner_columns: Vec<Sql> = target_state
                .scalar_fields()
                .map(|field| adapter.column(&child_alias, field.column_name()))
                .collect();
            let inner = adapter.assemble_select(SelectParts {
                distinct: Distinct::None,
                columns: inner_columns,
                from: source,
                joins: Vec::new(),
                where_clause: Some(where_all),
                group_by: Vec::new(),
                having: None,
                order_by: order_terms,
                limit: take,
                offset: args.skip,
            });
            let mut parts =
                SelectParts::new(vec![payload], adapter.correlate(inner, &child_alias));
            parts.joins = nested_joins;
            return Ok(adapter.assemble_select(parts));
        }

        let mut parts = SelectParts::new(vec![payload], source);
        parts.joins = nested_joins;
        parts.where_clause = Some(where_all);
        if !to_many {
            if !order_terms.is_empty() {
                parts.order_by = order_terms;
            }
            parts.limit = Some(1);
        }
        Ok(adapter.assemble_select(parts))
    }
}
