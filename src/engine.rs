//! The operation executor: validate → build → execute → parse.
//!
//! Read operations run against any executor (plain driver or transaction).
//! Mutations always run inside a [`Transaction`] scope: a plan that expands
//! to several statements executes them strictly sequentially on the same
//! connection, feeding runtime key values (RETURNING rows, or the follow-up
//! SELECT keyed by `last_insert_id`) into later statements.

use crate::cache::BoxFuture;
use crate::driver::{Driver, ExecuteResult};
use crate::telemetry::{SpanAttrs, Telemetry};
use crate::transaction::Transaction;
use std::time::Instant;
use viborm_core::adapter::SqlAdapter;
use viborm_core::builder::QueryBuilder;
use viborm_core::error::{Error, Result};
use viborm_core::mutate::{self, MutationBuilder};
use viborm_core::parse::{Record, ResultParser, ResultValue};
use viborm_core::query::{
    AggregateArgs, CountArgs, CreateArgs, CreateData, CreateManyArgs, DeleteArgs, DeleteManyArgs,
    Filter, FindArgs, GroupByArgs, NestedUpdate, Operation, ScalarWrites, Selection, UpdateArgs,
    UpdateData, UpdateManyArgs, UpsertArgs,
};
use viborm_core::schema::{ModelId, ModelState, RelationState, Schema};
use viborm_core::sql::Sql;
use viborm_core::validate::PayloadValidator;
use viborm_core::value::Value;
use viborm_core::viborm_trace_query;

/// Shared references the executor needs for one operation.
#[derive(Clone, Copy)]
pub(crate) struct EngineCtx<'a> {
    pub schema: &'a Schema,
    pub adapter: &'a dyn SqlAdapter,
    pub telemetry: &'a Telemetry,
}

impl<'a> EngineCtx<'a> {
    fn builder(&self) -> QueryBuilder<'a> {
        QueryBuilder::new(self.schema, self.adapter)
    }

    fn mutations(&self) -> MutationBuilder<'a> {
        MutationBuilder::new(self.schema, self.adapter)
    }

    fn parser(&self) -> ResultParser<'a> {
        ResultParser::new(self.schema, self.adapter)
    }

    fn validator(&self) -> PayloadValidator<'a> {
        PayloadValidator::new(self.schema)
    }
}

/// Where a statement runs: the bare driver, or a transaction scope.
pub(crate) enum Executor<'e, D: Driver> {
    Driver(&'e D),
    Tx(&'e Transaction<'e, D>),
}

impl<D: Driver> Clone for Executor<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Driver> Copy for Executor<'_, D> {}

impl<D: Driver> Executor<'_, D> {
    async fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        match self {
            Executor::Driver(driver) => driver.execute(sql, params).await,
            Executor::Tx(tx) => tx.execute(sql, params).await,
        }
    }
}

/// Renders and executes one statement, wrapped in the `execute` span, with
/// query logging.
async fn run_sql<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    sql: &Sql,
) -> Result<ExecuteResult> {
    let rendered = sql.render(ctx.adapter.dialect());
    viborm_trace_query!(&rendered.sql, rendered.params.len());

    let attrs = SpanAttrs {
        system: Some(ctx.adapter.dialect().name()),
        query_text: Some(rendered.sql.clone()),
        ..SpanAttrs::default()
    };
    let started = Instant::now();
    let result = ctx
        .telemetry
        .tracer
        .in_span("execute", attrs, exec.exec(&rendered.sql, &rendered.params))
        .await;
    ctx.telemetry
        .logger
        .query(&rendered.sql, rendered.params.len(), started.elapsed());
    if let Ok(result) = &result {
        ctx.telemetry.tracer.record_rows(result.rows.len());
    }
    result
}

// =============================================================================
// Reads
// =============================================================================

pub(crate) async fn find_many<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    args: &FindArgs,
) -> Result<Vec<Record>> {
    find_records(ctx, exec, model, Operation::FindMany, args).await
}

pub(crate) async fn find_one<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    operation: Operation,
    args: &FindArgs,
) -> Result<Option<Record>> {
    let records = find_records(ctx, exec, model, operation, args).await?;
    let record = records.into_iter().next();
    if record.is_none() && operation.throws_on_missing() {
        return Err(Error::RecordNotFound {
            model: ctx.schema.model(model).name.clone(),
            operation: operation.name(),
        });
    }
    Ok(record)
}

async fn find_records<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    operation: Operation,
    args: &FindArgs,
) -> Result<Vec<Record>> {
    let tracer = &ctx.telemetry.tracer;
    let selection = tracer
        .in_span("validate", SpanAttrs::default(), async {
            ctx.validator().validate_find(model, args)
        })
        .await?;
    if matches!(operation, Operation::FindUnique | Operation::FindUniqueOrThrow) {
        if let Some(filter) = &args.filter {
            ctx.validator().validate_unique_filter(model, filter)?;
        }
    }
    let plan = tracer
        .in_span("build", SpanAttrs::default(), async {
            ctx.builder().build_find(model, operation, args, &selection)
        })
        .await?;
    let result = run_sql(ctx, exec, &plan.sql).await?;
    let mut records = tracer
        .in_span("parse", SpanAttrs::default(), async {
            ctx.parser()
                .parse_records(model, &selection, result.rows, operation)
        })
        .await?;
    if plan.reversed {
        records.reverse();
    }
    Ok(records)
}

pub(crate) async fn count<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    args: &CountArgs,
) -> Result<i64> {
    if let Some(filter) = &args.filter {
        ctx.validator().validate_filter(model, filter)?;
    }
    let sql = ctx.builder().build_count(model, args)?;
    let result = run_sql(ctx, exec, &sql).await?;
    ctx.parser().parse_count(result.rows)
}

pub(crate) async fn exist<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    args: &CountArgs,
) -> Result<bool> {
    if let Some(filter) = &args.filter {
        ctx.validator().validate_filter(model, filter)?;
    }
    let sql = ctx.builder().build_exist(model, args)?;
    let result = run_sql(ctx, exec, &sql).await?;
    ctx.parser().parse_exist(result.rows)
}

pub(crate) async fn aggregate<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    args: &AggregateArgs,
) -> Result<Record> {
    if let Some(filter) = &args.filter {
        ctx.validator().validate_filter(model, filter)?;
    }
    let sql = ctx.builder().build_aggregate(model, args)?;
    let result = run_sql(ctx, exec, &sql).await?;
    ctx.parser().parse_aggregate(model, result.rows)
}

pub(crate) async fn group_by<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    model: ModelId,
    args: &GroupByArgs,
) -> Result<Vec<Record>> {
    if let Some(filter) = &args.filter {
        ctx.validator().validate_filter(model, filter)?;
    }
    let sql = ctx.builder().build_group_by(model, args)?;
    let result = run_sql(ctx, exec, &sql).await?;
    ctx.parser().parse_group_by(model, &args.by, result.rows)
}

/// Caller-supplied SQL; rows pass through the coarse result middleware only.
pub(crate) async fn query_raw<D: Driver>(
    ctx: EngineCtx<'_>,
    exec: Executor<'_, D>,
    sql: &str,
    params: &[Value],
) -> Result<Vec<viborm_core::parse::Row>> {
    let result = exec.exec(sql, params).await?;
    ctx.adapter.parse_result(result.rows, Operation::QueryRaw)
}

// =============================================================================
// Mutations
// =============================================================================

pub(crate) async fn create<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &CreateArgs,
) -> Result<Record> {
    ctx.validator().validate_create(model, &args.data)?;
    let selection =
        ctx.validator()
            .effective_selection(model, args.select.as_ref(), &args.include)?;
    let mut path = Vec::new();
    ctx.validator()
        .validate_selection(model, &selection, &mut path)?;

    let base = create_record(ctx, tx, model, &args.data).await?;
    refetch(ctx, tx, model, &base, &selection).await
}

pub(crate) async fn create_many<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &CreateManyArgs,
) -> Result<u64> {
    let mut rows = Vec::with_capacity(args.data.len());
    for row in &args.data {
        let mut scalars = row.clone();
        mutate::fill_create_defaults(ctx.schema, model, &mut scalars);
        ctx.validator().validate_create(
            model,
            &CreateData {
                scalars: scalars.clone(),
                nested: Default::default(),
            },
        )?;
        rows.push(scalars);
    }
    if rows.is_empty() {
        return Ok(0);
    }
    let sql = ctx
        .mutations()
        .build_insert_many(model, &rows, args.skip_duplicates)?;
    let result = run_sql(ctx, Executor::Tx(tx), &sql).await?;
    Ok(result.affected)
}

pub(crate) async fn update<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &UpdateArgs,
) -> Result<Record> {
    ctx.validator().validate_unique_filter(model, &args.filter)?;
    ctx.validator().validate_update(model, &args.data)?;
    let selection =
        ctx.validator()
            .effective_selection(model, args.select.as_ref(), &args.include)?;
    let mut path = Vec::new();
    ctx.validator()
        .validate_selection(model, &selection, &mut path)?;

    apply_update(ctx, tx, model, Some(&args.filter), &args.data).await?;
    find_one(
        ctx,
        Executor::Tx(tx),
        model,
        Operation::FindFirst,
        &FindArgs {
            filter: Some(args.filter.clone()),
            select: Some(selection),
            ..FindArgs::default()
        },
    )
    .await?
    .ok_or_else(|| Error::RecordNotFound {
        model: ctx.schema.model(model).name.clone(),
        operation: Operation::Update.name(),
    })
}

pub(crate) async fn update_many<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &UpdateManyArgs,
) -> Result<u64> {
    ctx.validator().validate_update(model, &args.data)?;
    if let Some(filter) = &args.filter {
        ctx.validator().validate_filter(model, filter)?;
    }
    let mut sets = args.data.sets.clone();
    mutate::touch_updated_at(ctx.schema, model, &mut sets);
    let sql = ctx
        .mutations()
        .build_update(model, args.filter.as_ref(), &sets, false)?;
    let result = run_sql(ctx, Executor::Tx(tx), &sql).await?;
    Ok(result.affected)
}

pub(crate) async fn upsert<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &UpsertArgs,
) -> Result<Record> {
    ctx.validator().validate_unique_filter(model, &args.filter)?;
    ctx.validator().validate_create(model, &args.create)?;
    ctx.validator().validate_update(model, &args.update)?;
    let selection =
        ctx.validator()
            .effective_selection(model, args.select.as_ref(), &args.include)?;

    let nested_free = args.create.nested.is_empty() && args.update.nested.is_empty();
    if nested_free {
        let mut scalars = args.create.scalars.clone();
        mutate::fill_create_defaults(ctx.schema, model, &mut scalars);
        let mut sets = args.update.sets.clone();
        if !sets.is_empty() {
            mutate::touch_updated_at(ctx.schema, model, &mut sets);
        }
        let sql = ctx
            .mutations()
            .build_upsert(model, &args.filter, &scalars, &sets, false)?;
        run_sql(ctx, Executor::Tx(tx), &sql).await?;
    } else if find_one(
        ctx,
        Executor::Tx(tx),
        model,
        Operation::FindFirst,
        &FindArgs::filtered(args.filter.clone()),
    )
    .await?
    .is_some()
    {
        apply_update(ctx, tx, model, Some(&args.filter), &args.update).await?;
    } else {
        create_record(ctx, tx, model, &args.create).await?;
    }

    find_one(
        ctx,
        Executor::Tx(tx),
        model,
        Operation::FindFirst,
        &FindArgs {
            filter: Some(args.filter.clone()),
            select: Some(selection),
            ..FindArgs::default()
        },
    )
    .await?
    .ok_or_else(|| Error::RecordNotFound {
        model: ctx.schema.model(model).name.clone(),
        operation: Operation::Upsert.name(),
    })
}

pub(crate) async fn delete<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &DeleteArgs,
) -> Result<Record> {
    ctx.validator().validate_unique_filter(model, &args.filter)?;
    let selection =
        ctx.validator()
            .effective_selection(model, args.select.as_ref(), &args.include)?;

    let record = find_one(
        ctx,
        Executor::Tx(tx),
        model,
        Operation::FindFirst,
        &FindArgs {
            filter: Some(args.filter.clone()),
            select: Some(selection),
            ..FindArgs::default()
        },
    )
    .await?
    .ok_or_else(|| Error::RecordNotFound {
        model: ctx.schema.model(model).name.clone(),
        operation: Operation::Delete.name(),
    })?;

    let sql = ctx
        .mutations()
        .build_delete(model, Some(&args.filter), false)?;
    run_sql(ctx, Executor::Tx(tx), &sql).await?;
    Ok(record)
}

pub(crate) async fn delete_many<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    args: &DeleteManyArgs,
) -> Result<u64> {
    if let Some(filter) = &args.filter {
        ctx.validator().validate_filter(model, filter)?;
    }
    let sql = ctx
        .mutations()
        .build_delete(model, args.filter.as_ref(), false)?;
    let result = run_sql(ctx, Executor::Tx(tx), &sql).await?;
    Ok(result.affected)
}

// =============================================================================
// Nested-write execution
// =============================================================================

/// Creates one row plus all nested writes, returning the base record.
///
/// Ordering: relations whose FK lives on this row (many-to-one, the FK side
/// of one-to-one) resolve their child first so the key is known at INSERT
/// time; every other relation attaches after the row exists.
fn create_record<'a, D: Driver>(
    ctx: EngineCtx<'a>,
    tx: &'a Transaction<'a, D>,
    model: ModelId,
    data: &'a CreateData,
) -> BoxFuture<'a, Result<Record>> {
    Box::pin(async move {
        let state = ctx.schema.model(model);
        let mut scalars = data.scalars.clone();
        mutate::fill_create_defaults(ctx.schema, model, &mut scalars);

        // Children this row's FK depends on.
        for (name, nested) in &data.nested {
            let relation = state.relation(name)?;
            let target_state = ctx.schema.model(relation.target);
            if !mutate::holds_foreign_key(relation, target_state) {
                continue;
            }
            let child = if let Some(child_data) = nested.create.first() {
                create_record(ctx, tx, relation.target, child_data).await?
            } else if let Some(filter) = nested.connect.first() {
                require_record(ctx, tx, relation.target, filter).await?
            } else if let Some(coc) = nested.connect_or_create.first() {
                match optional_record(ctx, tx, relation.target, &coc.filter).await? {
                    Some(existing) => existing,
                    None => create_record(ctx, tx, relation.target, &coc.create).await?,
                }
            } else {
                continue;
            };
            for (on, reference) in relation.on_fields.iter().zip(&relation.ref_fields) {
                scalars.insert(on.clone(), record_scalar(&child, reference)?);
            }
        }

        let base = insert_base_row(ctx, tx, model, &scalars).await?;

        // Children that hang off this row.
        for (name, nested) in &data.nested {
            let relation = state.relation(name)?;
            let target_state = ctx.schema.model(relation.target);
            if mutate::holds_foreign_key(relation, target_state) {
                continue;
            }
            attach_children(
                ctx,
                tx,
                relation,
                &base,
                &nested.create,
                nested.create_many.as_ref(),
                &nested.connect,
                &nested.connect_or_create,
            )
            .await?;
        }

        Ok(base)
    })
}

/// Runs the INSERT and surfaces the created row: RETURNING where available,
/// otherwise a follow-up SELECT keyed by the known unique values or the
/// session-local last insert id.
async fn insert_base_row<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    scalars: &ScalarWrites,
) -> Result<Record> {
    let state = ctx.schema.model(model);
    let returning = ctx.adapter.capabilities().supports_returning;
    let sql = ctx.mutations().build_insert(model, scalars, returning)?;
    let result = run_sql(ctx, Executor::Tx(tx), &sql).await?;

    if returning {
        let records = ctx.parser().parse_records(
            model,
            &Selection::all_scalars(),
            result.rows,
            Operation::Create,
        )?;
        return records.into_iter().next().ok_or_else(|| Error::Unexpected {
            context: format!("INSERT .. RETURNING produced no row for {}", state.name),
        });
    }

    // No RETURNING: prefer the unique key we already know, fall back to
    // last_insert_id chaining.
    let id_fields = state.id_fields();
    let known_key: Option<Vec<(String, Value)>> = id_fields
        .iter()
        .map(|field| {
            scalars
                .get(&field.name)
                .map(|value| (field.name.clone(), value.clone()))
        })
        .collect();
    let rows = match known_key {
        Some(pairs) if !pairs.is_empty() => {
            let filter = Filter::and(
                pairs
                    .into_iter()
                    .map(|(field, value)| Filter::equals(field, value)),
            );
            let plan = ctx.builder().build_find(
                model,
                Operation::FindFirst,
                &FindArgs::filtered(filter),
                &Selection::all_scalars(),
            )?;
            run_sql(ctx, Executor::Tx(tx), &plan.sql).await?.rows
        }
        _ => {
            let sql = ctx.mutations().build_select_by_last_insert_id(model)?;
            run_sql(ctx, Executor::Tx(tx), &sql).await?.rows
        }
    };
    let records =
        ctx.parser()
            .parse_records(model, &Selection::all_scalars(), rows, Operation::Create)?;
    records.into_iter().next().ok_or_else(|| Error::Unexpected {
        context: format!("created row not found after INSERT into {}", state.name),
    })
}

/// Attaches create / create_many / connect / connect_or_create children to
/// an existing parent row.
#[allow(clippy::too_many_arguments)]
fn attach_children<'a, D: Driver>(
    ctx: EngineCtx<'a>,
    tx: &'a Transaction<'a, D>,
    relation: &'a RelationState,
    parent: &'a Record,
    creates: &'a [CreateData],
    create_many: Option<&'a (Vec<ScalarWrites>, bool)>,
    connects: &'a [Filter],
    connect_or_creates: &'a [viborm_core::query::ConnectOrCreate],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if relation.junction.is_some() {
            let junction = relation.junction.as_ref().expect("checked");
            let a_value = record_scalar(parent, &relation.on_fields[0])?;

            let link = |child: Record| {
                let a_value = a_value.clone();
                async move {
                    let b_value = record_scalar(&child, &relation.ref_fields[0])?;
                    let sql = ctx
                        .mutations()
                        .build_junction_insert(junction, a_value, b_value);
                    run_sql(ctx, Executor::Tx(tx), &sql).await.map(|_| ())
                }
            };

            for child_data in creates {
                let child = create_record(ctx, tx, relation.target, child_data).await?;
                link(child).await?;
            }
            if let Some((rows, _)) = create_many {
                for row in rows {
                    let child_data = CreateData {
                        scalars: row.clone(),
                        nested: Default::default(),
                    };
                    let child = create_record(ctx, tx, relation.target, &child_data).await?;
                    link(child).await?;
                }
            }
            for filter in connects {
                let child = require_record(ctx, tx, relation.target, filter).await?;
                link(child).await?;
            }
            for coc in connect_or_creates {
                let child = match optional_record(ctx, tx, relation.target, &coc.filter).await? {
                    Some(existing) => existing,
                    None => create_record(ctx, tx, relation.target, &coc.create).await?,
                };
                link(child).await?;
            }
            return Ok(());
        }

        // FK lives on the child: inject it.
        let fk_values: Vec<(String, Value)> = relation
            .ref_fields
            .iter()
            .zip(&relation.on_fields)
            .map(|(reference, on)| Ok((reference.clone(), record_scalar(parent, on)?)))
            .collect::<Result<_>>()?;

        for child_data in creates {
            let mut child = child_data.clone();
            for (field, value) in &fk_values {
                child.scalars.insert(field.clone(), value.clone());
            }
            create_record(ctx, tx, relation.target, &child).await?;
        }
        if let Some((rows, skip_duplicates)) = create_many {
            let mut injected = Vec::with_capacity(rows.len());
            for row in rows {
                let mut scalars = row.clone();
                for (field, value) in &fk_values {
                    scalars.insert(field.clone(), value.clone());
                }
                mutate::fill_create_defaults(ctx.schema, relation.target, &mut scalars);
                injected.push(scalars);
            }
            if !injected.is_empty() {
                let sql = ctx.mutations().build_insert_many(
                    relation.target,
                    &injected,
                    *skip_duplicates,
                )?;
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
            }
        }
        for filter in connects {
            let mut sets = indexmap::IndexMap::new();
            for (field, value) in &fk_values {
                sets.insert(
                    field.clone(),
                    viborm_core::query::SetOp::Set(value.clone()),
                );
            }
            let sql = ctx
                .mutations()
                .build_update(relation.target, Some(filter), &sets, false)?;
            run_sql(ctx, Executor::Tx(tx), &sql).await?;
        }
        for coc in connect_or_creates {
            if optional_record(ctx, tx, relation.target, &coc.filter)
                .await?
                .is_some()
            {
                let mut sets = indexmap::IndexMap::new();
                for (field, value) in &fk_values {
                    sets.insert(
                        field.clone(),
                        viborm_core::query::SetOp::Set(value.clone()),
                    );
                }
                let sql = ctx.mutations().build_update(
                    relation.target,
                    Some(&coc.filter),
                    &sets,
                    false,
                )?;
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
            } else {
                let mut child = coc.create.clone();
                for (field, value) in &fk_values {
                    child.scalars.insert(field.clone(), value.clone());
                }
                create_record(ctx, tx, relation.target, &child).await?;
            }
        }
        Ok(())
    })
}

/// Applies scalar sets plus nested relation writes for `update`-family
/// operations.
fn apply_update<'a, D: Driver>(
    ctx: EngineCtx<'a>,
    tx: &'a Transaction<'a, D>,
    model: ModelId,
    filter: Option<&'a Filter>,
    data: &'a UpdateData,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let state = ctx.schema.model(model);

        let mut sets = data.sets.clone();
        mutate::touch_updated_at(ctx.schema, model, &mut sets);
        if !sets.is_empty() {
            let sql = ctx.mutations().build_update(model, filter, &sets, false)?;
            run_sql(ctx, Executor::Tx(tx), &sql).await?;
        }

        if data.nested.is_empty() {
            return Ok(());
        }

        let parent = match filter {
            Some(filter) => require_record(ctx, tx, model, filter).await?,
            None => {
                return Err(Error::Validation {
                    model: state.name.clone(),
                    operation: "update",
                    message: "nested writes need a unique parent filter".into(),
                })
            }
        };

        for (name, nested) in &data.nested {
            let relation = state.relation(name)?;
            apply_nested_update(ctx, tx, state, relation, &parent, nested).await?;
        }
        Ok(())
    })
}

fn apply_nested_update<'a, D: Driver>(
    ctx: EngineCtx<'a>,
    tx: &'a Transaction<'a, D>,
    parent_state: &'a ModelState,
    relation: &'a RelationState,
    parent: &'a Record,
    nested: &'a NestedUpdate,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let target = relation.target;
        let target_state = ctx.schema.model(target);
        let is_junction = relation.junction.is_some();

        attach_children(
            ctx,
            tx,
            relation,
            parent,
            &nested.create,
            nested.create_many.as_ref(),
            &nested.connect,
            &nested.connect_or_create,
        )
        .await?;

        // A filter scoping child rows to this parent's membership.
        let scope = child_scope(ctx.schema, parent_state, relation, parent)?;

        if is_junction {
            let junction = relation.junction.as_ref().expect("checked");
            let a_value = record_scalar(parent, &relation.on_fields[0])?;

            if let Some(set) = &nested.set {
                let sql = ctx
                    .mutations()
                    .build_junction_delete(junction, a_value.clone(), None);
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
                for filter in set {
                    let child = require_record(ctx, tx, target, filter).await?;
                    let b_value = record_scalar(&child, &relation.ref_fields[0])?;
                    let sql = ctx.mutations().build_junction_insert(
                        junction,
                        a_value.clone(),
                        b_value,
                    );
                    run_sql(ctx, Executor::Tx(tx), &sql).await?;
                }
            }
            for filter in &nested.disconnect {
                let scoped = Filter::and([scope.clone(), filter.clone()]);
                if let Some(child) = optional_record(ctx, tx, target, &scoped).await? {
                    let b_value = record_scalar(&child, &relation.ref_fields[0])?;
                    let sql = ctx.mutations().build_junction_delete(
                        junction,
                        a_value.clone(),
                        Some(vec![b_value]),
                    );
                    run_sql(ctx, Executor::Tx(tx), &sql).await?;
                }
            }
            for filter in nested.delete.iter().chain(&nested.delete_many) {
                let scoped = Filter::and([scope.clone(), filter.clone()]);
                let children =
                    find_many(ctx, Executor::Tx(tx), target, &FindArgs::filtered(scoped)).await?;
                for child in children {
                    let b_value = record_scalar(&child, &relation.ref_fields[0])?;
                    let sql = ctx.mutations().build_junction_delete(
                        junction,
                        a_value.clone(),
                        Some(vec![b_value.clone()]),
                    );
                    run_sql(ctx, Executor::Tx(tx), &sql).await?;
                    let key = target_key_filter(target_state, &child)?;
                    let sql = ctx.mutations().build_delete(target, Some(&key), false)?;
                    run_sql(ctx, Executor::Tx(tx), &sql).await?;
                }
            }
        } else {
            // FK-side bookkeeping: disconnect/set null out the child FK.
            let null_sets = || {
                let mut sets = indexmap::IndexMap::new();
                for reference in &relation.ref_fields {
                    sets.insert(reference.clone(), viborm_core::query::SetOp::Set(Value::Null));
                }
                sets
            };

            if let Some(set) = &nested.set {
                let sql =
                    ctx.mutations()
                        .build_update(target, Some(&scope), &null_sets(), false)?;
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
                for filter in set {
                    let mut sets = indexmap::IndexMap::new();
                    for (reference, on) in relation.ref_fields.iter().zip(&relation.on_fields) {
                        sets.insert(
                            reference.clone(),
                            viborm_core::query::SetOp::Set(record_scalar(parent, on)?),
                        );
                    }
                    let sql = ctx
                        .mutations()
                        .build_update(target, Some(filter), &sets, false)?;
                    run_sql(ctx, Executor::Tx(tx), &sql).await?;
                }
            }
            for filter in &nested.disconnect {
                let scoped = Filter::and([scope.clone(), filter.clone()]);
                let sql =
                    ctx.mutations()
                        .build_update(target, Some(&scoped), &null_sets(), false)?;
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
            }
            for filter in nested.delete.iter().chain(&nested.delete_many) {
                let scoped = Filter::and([scope.clone(), filter.clone()]);
                let sql = ctx.mutations().build_delete(target, Some(&scoped), false)?;
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
            }
        }

        for item in nested.update.iter().chain(&nested.update_many) {
            let mut parts = vec![scope.clone()];
            if let Some(filter) = &item.filter {
                parts.push(filter.clone());
            }
            let scoped = Filter::and(parts);
            apply_update(ctx, tx, target, Some(&scoped), &item.data).await?;
        }

        for item in &nested.upsert {
            let scoped = Filter::and([scope.clone(), item.filter.clone()]);
            if optional_record(ctx, tx, target, &scoped).await?.is_some() {
                apply_update(ctx, tx, target, Some(&scoped), &item.update).await?;
            } else if is_junction {
                let junction = relation.junction.as_ref().expect("checked");
                let a_value = record_scalar(parent, &relation.on_fields[0])?;
                let child = create_record(ctx, tx, target, &item.create).await?;
                let b_value = record_scalar(&child, &relation.ref_fields[0])?;
                let sql = ctx
                    .mutations()
                    .build_junction_insert(junction, a_value, b_value);
                run_sql(ctx, Executor::Tx(tx), &sql).await?;
            } else {
                let mut child = item.create.clone();
                for (reference, on) in relation.ref_fields.iter().zip(&relation.on_fields) {
                    child
                        .scalars
                        .insert(reference.clone(), record_scalar(parent, on)?);
                }
                create_record(ctx, tx, target, &child).await?;
            }
        }

        Ok(())
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// A filter (on the target model) selecting the children linked to `parent`.
fn child_scope(
    schema: &Schema,
    parent_state: &ModelState,
    relation: &RelationState,
    parent: &Record,
) -> Result<Filter> {
    if relation.junction.is_some() {
        // Junction membership goes through the mirror relation so the
        // planner emits the EXISTS-on-junction predicate.
        let parent_id = schema.model_id(&parent_state.name)?;
        let target_state = schema.model(relation.target);
        let mirror = target_state
            .relations
            .values()
            .find(|candidate| {
                candidate.target == parent_id && candidate.kind == relation.kind.mirror()
            })
            .ok_or_else(|| Error::Unexpected {
                context: format!("relation `{}` has no mirror", relation.name),
            })?;
        let key = target_key_filter(parent_state, parent)?;
        return Ok(Filter::relation(
            mirror.name.clone(),
            viborm_core::query::RelationFilter::Some(Box::new(key)),
        ));
    }
    let mut parts = Vec::with_capacity(relation.ref_fields.len());
    for (reference, on) in relation.ref_fields.iter().zip(&relation.on_fields) {
        parts.push(Filter::equals(
            reference.clone(),
            record_scalar(parent, on)?,
        ));
    }
    Ok(Filter::and(parts))
}

/// Equality filter over a model's id fields from a record.
fn target_key_filter(state: &ModelState, record: &Record) -> Result<Filter> {
    let ids = state.id_fields();
    if ids.is_empty() {
        return Err(Error::Unexpected {
            context: format!("model `{}` has no id fields", state.name),
        });
    }
    let mut parts = Vec::with_capacity(ids.len());
    for field in ids {
        parts.push(Filter::equals(
            field.name.clone(),
            record_scalar(record, &field.name)?,
        ));
    }
    Ok(Filter::and(parts))
}

fn record_scalar(record: &Record, field: &str) -> Result<Value> {
    match record.get(field) {
        Some(ResultValue::Scalar(value)) => Ok(value.clone()),
        Some(ResultValue::Null) | None => Err(Error::Unexpected {
            context: format!("missing link value for field `{field}`"),
        }),
        Some(_) => Err(Error::Unexpected {
            context: format!("field `{field}` is not a scalar"),
        }),
    }
}

async fn optional_record<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    filter: &Filter,
) -> Result<Option<Record>> {
    find_one(
        ctx,
        Executor::Tx(tx),
        model,
        Operation::FindFirst,
        &FindArgs::filtered(filter.clone()),
    )
    .await
}

async fn require_record<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    filter: &Filter,
) -> Result<Record> {
    optional_record(ctx, tx, model, filter)
        .await?
        .ok_or_else(|| Error::RecordNotFound {
            model: ctx.schema.model(model).name.clone(),
            operation: "connect",
        })
}

/// Re-reads a freshly written row under the requested projection.
async fn refetch<D: Driver>(
    ctx: EngineCtx<'_>,
    tx: &Transaction<'_, D>,
    model: ModelId,
    base: &Record,
    selection: &Selection,
) -> Result<Record> {
    let state = ctx.schema.model(model);
    if selection.is_default() || state.id_fields().is_empty() {
        return Ok(base.clone());
    }
    let filter = target_key_filter(state, base)?;
    find_one(
        ctx,
        Executor::Tx(tx),
        model,
        Operation::FindFirst,
        &FindArgs {
            filter: Some(filter),
            select: Some(selection.clone()),
            ..FindArgs::default()
        },
    )
    .await?
    .ok_or_else(|| Error::Unexpected {
        context: format!("created `{}` row disappeared before refetch", state.name),
    })
}
