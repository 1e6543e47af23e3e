//! count / aggregate / group_by / exist planning.

use super::context::AliasGen;
use super::QueryBuilder;
use crate::adapter::{Distinct, SelectParts};
use crate::error::Result;
use crate::parse::RESULT_KEY;
use crate::query::{
    AggregateArgs, AggregateFn, AggregateSelection, CountArgs, GroupByArgs, Having,
};
use crate::schema::ModelId;
use crate::sql::Sql;

impl QueryBuilder<'_> {
    /// `count` → `SELECT COUNT(*) AS "_result" FROM ...`; with paging the
    /// count runs over a paged derived table so `take`/`skip` bound it.
    pub fn build_count(&self, model: ModelId, args: &CountArgs) -> Result<Sql> {
        let mut aliases = AliasGen::new();
        let alias = aliases.next_alias();
        let state = self.schema.model(model);
        let adapter = self.adapter;

        let where_clause = args
            .filter
            .as_ref()
            .map(|filter| self.compile_filter(model, &alias, filter, &mut aliases))
            .transpose()?;

        let count_column = adapter.aliased(adapter.count_star(), RESULT_KEY);

        if args.take.is_some() || args.skip.is_some() {
            let inner = adapter.assemble_select(SelectParts {
                distinct: Distinct::None,
                columns: vec![Sql::raw("1")],
                from: adapter.table(state.table_name(), &alias),
                joins: Vec::new(),
                where_clause,
                group_by: Vec::new(),
                having: None,
                order_by: Vec::new(),
                limit: args.take.map(i64::abs),
                offset: args.skip,
            });
            let outer_alias = aliases.next_alias();
            return Ok(adapter.assemble_select(SelectParts::new(
                vec![count_column],
                adapter.correlate(inner, &outer_alias),
            )));
        }

        let mut parts = SelectParts::new(
            vec![count_column],
            adapter.table(state.table_name(), &alias),
        );
        parts.where_clause = where_clause;
        Ok(adapter.assemble_select(parts))
    }

    /// `exist` → `SELECT EXISTS(SELECT 1 FROM ... WHERE ...) AS "_result"`.
    pub fn build_exist(&self, model: ModelId, args: &CountArgs) -> Result<Sql> {
        let mut aliases = AliasGen::new();
        let alias = aliases.next_alias();
        let state = self.schema.model(model);
        let adapter = self.adapter;

        let condition = match &args.filter {
            Some(filter) => self.compile_filter(model, &alias, filter, &mut aliases)?,
            None => adapter.true_literal(),
        };
        let check = adapter.exists_check(adapter.table(state.table_name(), &alias), condition);
        Ok(adapter.select_clause(vec![adapter.aliased(check, RESULT_KEY)]))
    }

    /// `aggregate` → one row of `_count.* / _sum.* / _avg.* / _min.* /
    /// _max.*` columns; the parser rewraps them into buckets.
    pub fn build_aggregate(&self, model: ModelId, args: &AggregateArgs) -> Result<Sql> {
        let mut aliases = AliasGen::new();
        let alias = aliases.next_alias();
        let state = self.schema.model(model);
        let adapter = self.adapter;

        let columns = self.aggregate_columns(model, &alias, &args.selection)?;

        let where_clause = args
            .filter
            .as_ref()
            .map(|filter| self.compile_filter(model, &alias, filter, &mut aliases))
            .transpose()?;

        if args.take.is_some() || args.skip.is_some() {
            // Aggregate over the paged slice, not the whole table.
            let inner_columns: Vec<Sql> = state
                .scalar_fields()
                .map(|field| adapter.column(&alias, field.column_name()))
                .collect();
            let inner = adapter.assemble_select(SelectParts {
                distinct: Distinct::None,
                columns: inner_columns,
                from: adapter.table(state.table_name(), &alias),
                joins: Vec::new(),
                where_clause,
                group_by: Vec::new(),
                having: None,
                order_by: Vec::new(),
                limit: args.take.map(i64::abs),
                offset: args.skip,
            });
            return Ok(adapter.assemble_select(SelectParts::new(
                columns,
                adapter.correlate(inner, &alias),
            )));
        }

        let mut parts = SelectParts::new(columns, adapter.table(state.table_name(), &alias));
        parts.where_clause = where_clause;
        Ok(adapter.assemble_select(parts))
    }

    /// `group_by` → group keys as plain columns plus aggregate buckets, with
    /// HAVING over aggregate expressions.
    pub fn build_group_by(&self, model: ModelId, args: &GroupByArgs) -> Result<Sql> {
        let mut aliases = AliasGen::new();
        let alias = aliases.next_alias();
        let state = self.schema.model(model);
        let adapter = self.adapter;

        let mut columns = Vec::new();
        let mut group_exprs = Vec::new();
        for name in &args.by {
            let field = state.field(name)?;
            let column = adapter.column(&alias, field.column_name());
            group_exprs.push(column.clone());
            columns.push(adapter.aliased(column, &field.name));
        }
        columns.extend(self.aggregate_columns(model, &alias, &args.selection)?);

        let where_clause = args
            .filter
            .as_ref()
            .map(|filter| self.compile_filter(model, &alias, filter, &mut aliases))
            .transpose()?;

        let having = if args.having.is_empty() {
            None
        } else {
            let terms = args
                .having
                .iter()
                .map(|term| self.having_condition(model, &alias, term))
                .collect::<Result<Vec<_>>>()?;
            Some(adapter.and(terms))
        };

        let order_terms = self.order_terms(model, &alias, &args.order_by, &mut aliases)?;

        Ok(adapter.assemble_select(SelectParts {
            distinct: Distinct::None,
            columns,
            from: adapter.table(state.table_name(), &alias),
            joins: Vec::new(),
            where_clause,
            group_by: group_exprs,
            having,
            order_by: order_terms,
            limit: args.take.map(i64::abs),
            offset: args.skip,
        }))
    }

    /// Aggregate projection columns, aliased `_<fn>.<field>` (`_count._all`
    /// for `COUNT(*)`).
    fn aggregate_columns(
        &self,
        model: ModelId,
        alias: &str,
        selection: &AggregateSelection,
    ) -> Result<Vec<Sql>> {
        let state = self.schema.model(model);
        let adapter = self.adapter;
        let mut columns = Vec::new();

        if selection.count_all {
            columns.push(adapter.aliased(adapter.count_star(), "_count._all"));
        }
        for (bucket, fields, aggregate) in [
            ("_count", &selection.count, AggregateFn::Count),
            ("_sum", &selection.sum, AggregateFn::Sum),
            ("_avg", &selection.avg, AggregateFn::Avg),
            ("_min", &selection.min, AggregateFn::Min),
            ("_max", &selection.max, AggregateFn::Max),
        ] {
            for name in fields {
                let field = state.field(name)?;
                let column = adapter.column(alias, field.column_name());
                let expr = self.aggregate_expr(aggregate, column);
                columns.push(adapter.aliased(expr, &format!("{bucket}.{}", field.name)));
            }
        }
        Ok(columns)
    }

    fn aggregate_expr(&self, aggregate: AggregateFn, expr: Sql) -> Sql {
        match aggregate {
            AggregateFn::Count => self.adapter.count(expr),
            AggregateFn::Sum => self.adapter.sum(expr),
            AggregateFn::Avg => self.adapter.avg(expr),
            AggregateFn::Min => self.adapter.min(expr),
            AggregateFn::Max => self.adapter.max(expr),
        }
    }

    fn having_condition(&self, model: ModelId, alias: &str, term: &Having) -> Result<Sql> {
        let state = self.schema.model(model);
        let expr = match &term.field {
            None => self.adapter.count_star(),
            Some(name) => {
                let field = state.field(name)?;
                self.aggregate_expr(term.aggregate, self.adapter.column(alias, field.column_name()))
            }
        };
        // Aggregates compare as plain numerics; reuse the scalar operator
        // set on a synthetic numeric field.
        let synthetic = crate::schema::FieldState::new("_having", crate::schema::FieldKind::Float);
        self.compile_scalar_condition(expr, &synthetic, &term.condition)
    }
}
