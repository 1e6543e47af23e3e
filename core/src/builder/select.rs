//! SELECT-path planning for the find family.

use super::context::AliasGen;
use super::QueryBuilder;
use crate::adapter::{Distinct, SelectParts};
use crate::error::Result;
use crate::query::{FindArgs, NullsOrder, Operation, OrderBy, OrderByTarget, Selection};
use crate::schema::{FieldState, ModelId};
use crate::sql::Sql;

/// A planned read: the statement plus post-processing hints.
#[derive(Debug, Clone)]
pub struct FindPlan {
    pub sql: Sql,
    /// Rows come back in reversed order (negative `take`); the executor
    /// restores user order by reversing them again.
    pub reversed: bool,
}

impl QueryBuilder<'_> {
    /// Plans `find_unique` / `find_first` / `find_many` and their throwing
    /// variants against a validated projection.
    pub fn build_find(
        &self,
        model: ModelId,
        operation: Operation,
        args: &FindArgs,
        selection: &Selection,
    ) -> Result<FindPlan> {
        let mut aliases = AliasGen::new();
        let alias = aliases.next_alias();
        let state = self.schema.model(model);

        let mut columns = self.scalar_columns(model, &alias, selection)?;
        let (relation_columns, joins) =
            self.relation_columns(model, &alias, selection, &mut aliases)?;
        columns.extend(relation_columns);

        let where_clause = args
            .filter
            .as_ref()
            .map(|filter| self.compile_filter(model, &alias, filter, &mut aliases))
            .transpose()?;

        // Negative take reads from the end of the ordered set.
        let mut order_by = args.order_by.clone();
        let mut take = args.take;
        let mut reversed = false;
        if let Some(n) = take {
            if n < 0 {
                order_by = order_by.into_iter().map(OrderBy::reversed).collect();
                take = Some(-n);
                reversed = true;
            }
        }

        let single_row = matches!(
            operation,
            Operation::FindUnique
                | Operation::FindUniqueOrThrow
                | Operation::FindFirst
                | Operation::FindFirstOrThrow
        );
        let limit = if single_row { Some(1) } else { take };

        let distinct = if args.distinct.is_empty() {
            Distinct::None
        } else {
            let exprs = args
                .distinct
                .iter()
                .map(|name| {
                    state
                        .field(name)
                        .map(|field| self.adapter.column(&alias, field.column_name()))
                })
                .collect::<Result<Vec<_>>>()?;
            let mut output_aliases: Vec<String> = match &selection.fields {
                Some(names) => names.clone(),
                None => state.scalar_fields().map(|f| f.name.clone()).collect(),
            };
            output_aliases.extend(selection.relations.keys().cloned());
            Distinct::On {
                exprs,
                output_aliases,
            }
        };

        let mut order_terms = self.order_terms(model, &alias, &order_by, &mut aliases)?;
        // DISTINCT ON requires the partition expressions to lead the
        // ordering; keep the simulated path consistent with the native one.
        if let Distinct::On { exprs, .. } = &distinct {
            let mut leading: Vec<Sql> = exprs
                .iter()
                .map(|expr| self.adapter.order_term(expr.clone(), false, None))
                .collect();
            leading.append(&mut order_terms);
            order_terms = leading;
        }

        let sql = self.adapter.assemble_select(SelectParts {
            distinct,
            columns,
            from: self.adapter.table(state.table_name(), &alias),
            joins,
            where_clause,
            group_by: Vec::new(),
            having: None,
            order_by: order_terms,
            limit,
            offset: args.skip,
        });

        Ok(FindPlan { sql, reversed })
    }

    /// Projection columns for the declared scalars, each aliased to its
    /// field name so the parser works on field names alone.
    pub(crate) fn scalar_columns(
        &self,
        model: ModelId,
        alias: &str,
        selection: &Selection,
    ) -> Result<Vec<Sql>> {
        let state = self.schema.model(model);
        let fields: Vec<&FieldState> = match &selection.fields {
            Some(names) => names
                .iter()
                .map(|name| state.field(name))
                .collect::<Result<_>>()?,
            None => state.scalar_fields().collect(),
        };
        Ok(fields
            .into_iter()
            .map(|field| {
                self.adapter
                    .aliased(self.adapter.column(alias, field.column_name()), &field.name)
            })
            .collect())
    }

    /// Compiles ORDER BY terms. Relation targets become correlated scalar
    /// subqueries used as sort keys.
    pub(crate) fn order_terms(
        &self,
        model: ModelId,
        alias: &str,
        order_by: &[OrderBy],
        aliases: &mut AliasGen,
    ) -> Result<Vec<Sql>> {
        let state = self.schema.model(model);
        let adapter = self.adapter;
        let mut terms = Vec::with_capacity(order_by.len());
        for term in order_by {
            let descending = matches!(term.direction, crate::query::SortOrder::Desc);
            let nulls_first = term.nulls.map(|n| matches!(n, NullsOrder::First));
            let expr = match &term.target {
                OrderByTarget::Field(name) => {
                    let field = state.field(name)?;
                    adapter.column(alias, field.column_name())
                }
                OrderByTarget::RelationField { relation, field } => {
                    let relation_state = state.relation(relation)?;
                    let target_state = self.schema.model(relation_state.target);
                    let target_field = target_state.field(field)?;
                    let child_alias = aliases.next_alias();
                    let link = self.link_condition(
                        state,
                        alias,
                        relation_state,
                        &child_alias,
                        aliases,
                    )?;
                    let subquery = adapter
                        .select_clause(vec![
                            adapter.column(&child_alias, target_field.column_name())
                        ])
                        .append(
                            adapter.from_clause(
                                adapter.table(target_state.table_name(), &child_alias),
                            ),
                        )
                        .append(adapter.where_clause(link))
                        .append(adapter.limit_clause(1));
                    adapter.scalar_subquery(subquery)
                }
                OrderByTarget::RelationCount { relation } => {
                    let relation_state = state.relation(relation)?;
                    let target_state = self.schema.model(relation_state.target);
                    let child_alias = aliases.next_alias();
                    let link = self.link_condition(
                        state,
                        alias,
                        relation_state,
                        &child_alias,
                        aliases,
                    )?;
                    let subquery = adapter
                        .select_clause(vec![adapter.count_star()])
                        .append(
                            adapter.from_clause(
                                adapter.table(target_state.table_name(), &child_alias),
                            ),
                        )
                        .append(adapter.where_clause(link));
                    adapter.scalar_subquery(subquery)
                }
            };
            terms.push(adapter.order_term(expr, descending, nulls_first));
        }
        Ok(terms)
    }
}
