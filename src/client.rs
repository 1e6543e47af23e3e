//! The client surface.
//!
//! A [`Client`] owns a driver, a schema, and a dialect adapter, and hands out
//! per-model handles from a name-keyed dispatch: `client.model("user")?`
//! returns a [`ModelHandle`] whose methods run the engine with the model
//! pre-bound. `transaction` yields a [`TransactionClient`] with the same
//! surface bound to the transaction scope; nested calls become savepoints.

use crate::cache::{
    cache_key, key as cache_encoding, CacheDriver, CacheLayer, CacheLookup, CacheOptions,
    CachedResult,
};
use crate::driver::Driver;
use crate::engine::{self, EngineCtx, Executor};
use crate::telemetry::{SpanAttrs, Telemetry, TelemetryConfig};
use crate::transaction::{run_root, Transaction};
use std::sync::Arc;
use viborm_core::adapter::SqlAdapter;
use viborm_core::error::{Error, Result};
use viborm_core::parse::{Record, Row};
use viborm_core::query::{
    AggregateArgs, CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, DeleteManyArgs, FindArgs,
    GroupByArgs, Operation, UpdateArgs, UpdateManyArgs, UpsertArgs,
};
use viborm_core::schema::{ModelId, Schema};
use viborm_core::value::Value;

struct ClientInner<D: Driver> {
    driver: D,
    schema: Schema,
    adapter: Arc<dyn SqlAdapter>,
    telemetry: Telemetry,
    cache: Option<CacheLayer>,
}

impl<D: Driver> ClientInner<D> {
    fn ctx(&self) -> EngineCtx<'_> {
        EngineCtx {
            schema: &self.schema,
            adapter: self.adapter.as_ref(),
            telemetry: &self.telemetry,
        }
    }
}

/// Configures and assembles a [`Client`].
pub struct ClientBuilder<D: Driver> {
    driver: D,
    schema: Schema,
    adapter: Arc<dyn SqlAdapter>,
    telemetry: TelemetryConfig,
    cache_driver: Option<Arc<dyn CacheDriver>>,
    cache_version: Option<u32>,
}

impl<D: Driver> ClientBuilder<D> {
    pub fn telemetry(mut self, config: TelemetryConfig) -> Self {
        self.telemetry = config;
        self
    }

    pub fn cache(mut self, driver: Arc<dyn CacheDriver>) -> Self {
        self.cache_driver = Some(driver);
        self
    }

    /// Bumps every derived cache key (`viborm:v<n>:...`), shedding entries
    /// written by older deployments.
    pub fn cache_version(mut self, version: u32) -> Self {
        self.cache_version = Some(version);
        self
    }

    pub fn build(self) -> Client<D> {
        Client {
            inner: Arc::new(ClientInner {
                driver: self.driver,
                schema: self.schema,
                adapter: self.adapter,
                telemetry: Telemetry::new(&self.telemetry),
                cache: self.cache_driver.map(|driver| CacheLayer {
                    driver,
                    version: self.cache_version,
                }),
            }),
            cache_options: None,
        }
    }
}

/// The engine client. Cheap to clone; `with_cache` returns a copy whose
/// reads go through the cache layer.
pub struct Client<D: Driver> {
    inner: Arc<ClientInner<D>>,
    cache_options: Option<CacheOptions>,
}

impl<D: Driver> Clone for Client<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cache_options: self.cache_options.clone(),
        }
    }
}

impl<D: Driver + 'static> Client<D> {
    pub fn builder(driver: D, schema: Schema, adapter: Arc<dyn SqlAdapter>) -> ClientBuilder<D> {
        ClientBuilder {
            driver,
            schema,
            adapter,
            telemetry: TelemetryConfig::default(),
            cache_driver: None,
            cache_version: None,
        }
    }

    pub fn new(driver: D, schema: Schema, adapter: Arc<dyn SqlAdapter>) -> Self {
        Self::builder(driver, schema, adapter).build()
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub async fn connect(&self) -> Result<()> {
        let ctx = self.inner.ctx();
        ctx.telemetry
            .tracer
            .in_span("connect", SpanAttrs::default(), self.inner.driver.connect())
            .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        let ctx = self.inner.ctx();
        ctx.telemetry
            .tracer
            .in_span(
                "disconnect",
                SpanAttrs::default(),
                self.inner.driver.disconnect(),
            )
            .await
    }

    /// A handle for one model, by name.
    pub fn model(&self, name: &str) -> Result<ModelHandle<'_, D>> {
        let model = self.inner.schema.model_id(name)?;
        Ok(ModelHandle {
            client: self,
            model,
        })
    }

    /// A copy of this client whose reads consult the cache with `options`
    /// and whose mutations honor its invalidation list.
    pub fn with_cache(&self, options: CacheOptions) -> Client<D> {
        Client {
            inner: Arc::clone(&self.inner),
            cache_options: Some(options),
        }
    }

    /// Runs `f` inside a transaction. Errors roll the whole scope back.
    /// Calls on the provided client map to the transaction connection;
    /// nested `transaction` calls become savepoints.
    pub async fn transaction<R, F>(&self, f: F) -> Result<R>
    where
        F: for<'t> AsyncFnOnce(&'t TransactionClient<'t, D>) -> Result<R>,
    {
        let inner = &self.inner;
        run_root(&inner.driver, async |tx: &Transaction<'_, D>| {
            let client = TransactionClient { inner, tx };
            f(&client).await
        })
        .await
    }

    /// Caller-supplied SELECT; rows flow through the coarse result
    /// middleware.
    pub async fn query_raw(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>> {
        engine::query_raw(
            self.inner.ctx(),
            Executor::Driver(&self.inner.driver),
            sql,
            &params,
        )
        .await
    }

    /// Caller-supplied statement; returns the affected-row count.
    pub async fn execute_raw(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let result = self.inner.driver.execute_raw(sql, &params).await?;
        Ok(result.affected)
    }
}

// =============================================================================
// Cached read dispatch
// =============================================================================

/// One read operation, self-contained so SWR revalidation can re-run it in
/// the background.
#[derive(Clone)]
enum ReadRequest {
    Find {
        operation: Operation,
        args: FindArgs,
    },
    Count(CountArgs),
    Aggregate(AggregateArgs),
    GroupBy(GroupByArgs),
    Exist(CountArgs),
}

impl ReadRequest {
    fn operation(&self) -> Operation {
        match self {
            ReadRequest::Find { operation, .. } => *operation,
            ReadRequest::Count(_) => Operation::Count,
            ReadRequest::Aggregate(_) => Operation::Aggregate,
            ReadRequest::GroupBy(_) => Operation::GroupBy,
            ReadRequest::Exist(_) => Operation::Exist,
        }
    }

    fn canonical(&self) -> String {
        match self {
            ReadRequest::Find { args, .. } => cache_encoding::canonical_find_args(args),
            ReadRequest::Count(args) | ReadRequest::Exist(args) => {
                cache_encoding::canonical_count_args(args.filter.as_ref(), args.take, args.skip)
            }
            ReadRequest::Aggregate(args) => {
                cache_encoding::canonical_aggregate_args(args.filter.as_ref(), &args.selection)
            }
            ReadRequest::GroupBy(args) => cache_encoding::canonical_group_by_args(args),
        }
    }
}

async fn execute_read<D: Driver>(
    inner: &ClientInner<D>,
    model: ModelId,
    request: &ReadRequest,
) -> Result<CachedResult> {
    let ctx = inner.ctx();
    let exec = Executor::Driver(&inner.driver);
    match request {
        ReadRequest::Find { operation, args } => match operation {
            Operation::FindMany => engine::find_many(ctx, exec, model, args)
                .await
                .map(CachedResult::Records),
            operation => engine::find_one(ctx, exec, model, *operation, args)
                .await
                .map(CachedResult::MaybeRecord),
        },
        ReadRequest::Count(args) => engine::count(ctx, exec, model, args)
            .await
            .map(CachedResult::Count),
        ReadRequest::Aggregate(args) => engine::aggregate(ctx, exec, model, args)
            .await
            .map(CachedResult::Record),
        ReadRequest::GroupBy(args) => engine::group_by(ctx, exec, model, args)
            .await
            .map(CachedResult::Records),
        ReadRequest::Exist(args) => engine::exist(ctx, exec, model, args)
            .await
            .map(CachedResult::Flag),
    }
}

fn spawn_revalidation<D: Driver + 'static>(
    inner: Arc<ClientInner<D>>,
    layer: CacheLayer,
    key: String,
    model: ModelId,
    request: ReadRequest,
    ttl_ms: u64,
) {
    tokio::spawn(async move {
        match layer.try_claim_revalidation(&key).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(error) => {
                inner
                    .telemetry
                    .logger
                    .warning(format!("cache revalidation claim failed: {error}"));
                return;
            }
        }

        // Root-detached span: background work must not nest under the
        // long-finished request trace.
        let attrs = SpanAttrs {
            root: true,
            ..SpanAttrs::default()
        };
        let telemetry = inner.telemetry.clone();
        let result = telemetry
            .tracer
            .in_span("cache.set", attrs, async {
                let value = execute_read(&inner, model, &request).await?;
                layer.store(&key, value, ttl_ms).await
            })
            .await;
        if let Err(error) = result {
            inner
                .telemetry
                .logger
                .warning(format!("cache revalidation failed: {error}"));
        }
        let _ = layer.clear_revalidation(&key).await;
    });
}

// =============================================================================
// Model handles
// =============================================================================

/// Per-model operations on a [`Client`].
pub struct ModelHandle<'c, D: Driver> {
    client: &'c Client<D>,
    model: ModelId,
}

impl<'c, D: Driver + 'static> ModelHandle<'c, D> {
    fn inner(&self) -> &'c ClientInner<D> {
        &self.client.inner
    }

    fn model_name(&self) -> &str {
        &self.inner().schema.model(self.model).name
    }

    /// Runs a read through the cache when configured, otherwise directly.
    async fn read(&self, request: ReadRequest) -> Result<CachedResult> {
        let inner = self.inner();
        let operation = request.operation();
        let span = SpanAttrs::operation(
            inner.adapter.dialect().name(),
            self.model_name(),
            operation.name(),
        );
        let telemetry = inner.telemetry.clone();
        telemetry
            .tracer
            .in_span("operation", span, async {
                let cache = match (&inner.cache, &self.client.cache_options) {
                    (Some(layer), Some(options)) => Some((layer, options)),
                    _ => None,
                };
                let Some((layer, options)) = cache else {
                    return execute_read(inner, self.model, &request).await;
                };

                let ttl_ms = options.ttl.resolve()?;
                let key = match &options.key {
                    Some(key) => key.clone(),
                    None => cache_key(
                        layer.version,
                        self.model_name(),
                        operation,
                        &request.canonical(),
                    ),
                };

                if !options.bypass {
                    let probe = inner
                        .telemetry
                        .tracer
                        .in_span(
                            "cache.get",
                            SpanAttrs::default(),
                            layer.probe(&key, options.swr),
                        )
                        .await;
                    match probe {
                        Ok(CacheLookup::Fresh(value)) => return Ok(value),
                        Ok(CacheLookup::Stale(value)) => {
                            spawn_revalidation(
                                Arc::clone(&self.client.inner),
                                layer.clone(),
                                key,
                                self.model,
                                request.clone(),
                                ttl_ms,
                            );
                            return Ok(value);
                        }
                        Ok(CacheLookup::Miss) => {}
                        Err(error) => {
                            inner
                                .telemetry
                                .logger
                                .warning(format!("cache probe failed: {error}"));
                        }
                    }
                }

                let value = execute_read(inner, self.model, &request).await?;
                if let Err(error) = layer.store(&key, value.clone(), ttl_ms).await {
                    inner
                        .telemetry
                        .logger
                        .warning(format!("cache store failed: {error}"));
                }
                Ok(value)
            })
            .await
    }

    /// Runs a mutation inside a root transaction and applies cache
    /// invalidation afterwards. Cache failures never fail the operation.
    async fn mutate<R, F>(&self, operation: Operation, f: F) -> Result<R>
    where
        F: for<'t> AsyncFnOnce(EngineCtx<'t>, &'t Transaction<'t, D>) -> Result<R>,
    {
        let inner = self.inner();
        let span = SpanAttrs::operation(
            inner.adapter.dialect().name(),
            self.model_name(),
            operation.name(),
        );
        let telemetry = inner.telemetry.clone();
        let result = telemetry
            .tracer
            .in_span("operation", span, async {
                run_root(&inner.driver, async |tx: &Transaction<'_, D>| {
                    f(inner.ctx(), tx).await
                })
                .await
            })
            .await?;

        if let Some(layer) = &inner.cache {
            if let Err(error) = layer.invalidate_model(self.model_name()).await {
                inner
                    .telemetry
                    .logger
                    .warning(format!("cache invalidation failed: {error}"));
            }
            if let Some(options) = &self.client.cache_options {
                if let Err(error) = layer.invalidate_keys(&options.invalidate).await {
                    inner
                        .telemetry
                        .logger
                        .warning(format!("cache invalidation failed: {error}"));
                }
            }
        }
        Ok(result)
    }

    // -------------------- reads --------------------

    pub async fn find_many(&self, args: FindArgs) -> Result<Vec<Record>> {
        match self
            .read(ReadRequest::Find {
                operation: Operation::FindMany,
                args,
            })
            .await?
        {
            CachedResult::Records(records) => Ok(records),
            other => Err(unexpected_payload(other)),
        }
    }

    async fn find_one(&self, operation: Operation, args: FindArgs) -> Result<Option<Record>> {
        match self
            .read(ReadRequest::Find { operation, args })
            .await?
        {
            CachedResult::MaybeRecord(record) => Ok(record),
            other => Err(unexpected_payload(other)),
        }
    }

    pub async fn find_unique(&self, args: FindArgs) -> Result<Option<Record>> {
        self.find_one(Operation::FindUnique, args).await
    }

    pub async fn find_unique_or_throw(&self, args: FindArgs) -> Result<Record> {
        self.find_one(Operation::FindUniqueOrThrow, args)
            .await?
            .ok_or_else(|| Error::RecordNotFound {
                model: self.model_name().to_string(),
                operation: Operation::FindUniqueOrThrow.name(),
            })
    }

    pub async fn find_first(&self, args: FindArgs) -> Result<Option<Record>> {
        self.find_one(Operation::FindFirst, args).await
    }

    pub async fn find_first_or_throw(&self, args: FindArgs) -> Result<Record> {
        self.find_one(Operation::FindFirstOrThrow, args)
            .await?
            .ok_or_else(|| Error::RecordNotFound {
                model: self.model_name().to_string(),
                operation: Operation::FindFirstOrThrow.name(),
            })
    }

    pub async fn count(&self, args: CountArgs) -> Result<i64> {
        match self.read(ReadRequest::Count(args)).await? {
            CachedResult::Count(n) => Ok(n),
            other => Err(unexpected_payload(other)),
        }
    }

    pub async fn aggregate(&self, args: AggregateArgs) -> Result<Record> {
        match self.read(ReadRequest::Aggregate(args)).await? {
            CachedResult::Record(record) => Ok(record),
            other => Err(unexpected_payload(other)),
        }
    }

    pub async fn group_by(&self, args: GroupByArgs) -> Result<Vec<Record>> {
        match self.read(ReadRequest::GroupBy(args)).await? {
            CachedResult::Records(records) => Ok(records),
            other => Err(unexpected_payload(other)),
        }
    }

    pub async fn exist(&self, args: CountArgs) -> Result<bool> {
        match self.read(ReadRequest::Exist(args)).await? {
            CachedResult::Flag(flag) => Ok(flag),
            other => Err(unexpected_payload(other)),
        }
    }

    // -------------------- mutations --------------------

    pub async fn create(&self, args: CreateArgs) -> Result<Record> {
        let model = self.model;
        self.mutate(Operation::Create, async |ctx, tx| {
            engine::create(ctx, tx, model, &args).await
        })
        .await
    }

    pub async fn create_many(&self, args: CreateManyArgs) -> Result<u64> {
        let model = self.model;
        self.mutate(Operation::CreateMany, async |ctx, tx| {
            engine::create_many(ctx, tx, model, &args).await
        })
        .await
    }

    pub async fn update(&self, args: UpdateArgs) -> Result<Record> {
        let model = self.model;
        self.mutate(Operation::Update, async |ctx, tx| {
            engine::update(ctx, tx, model, &args).await
        })
        .await
    }

    pub async fn update_many(&self, args: UpdateManyArgs) -> Result<u64> {
        let model = self.model;
        self.mutate(Operation::UpdateMany, async |ctx, tx| {
            engine::update_many(ctx, tx, model, &args).await
        })
        .await
    }

    pub async fn upsert(&self, args: UpsertArgs) -> Result<Record> {
        let model = self.model;
        self.mutate(Operation::Upsert, async |ctx, tx| {
            engine::upsert(ctx, tx, model, &args).await
        })
        .await
    }

    pub async fn delete(&self, args: DeleteArgs) -> Result<Record> {
        let model = self.model;
        self.mutate(Operation::Delete, async |ctx, tx| {
            engine::delete(ctx, tx, model, &args).await
        })
        .await
    }

    pub async fn delete_many(&self, args: DeleteManyArgs) -> Result<u64> {
        let model = self.model;
        self.mutate(Operation::DeleteMany, async |ctx, tx| {
            engine::delete_many(ctx, tx, model, &args).await
        })
        .await
    }
}

fn unexpected_payload(value: CachedResult) -> Error {
    Error::Unexpected {
        context: format!("cached payload shape mismatch: {value:?}"),
    }
}

// =============================================================================
// Transaction-scoped surface
// =============================================================================

/// The client surface bound to an open transaction.
pub struct TransactionClient<'t, D: Driver> {
    inner: &'t ClientInner<D>,
    tx: &'t Transaction<'t, D>,
}

impl<'t, D: Driver> TransactionClient<'t, D> {
    pub fn model(&self, name: &str) -> Result<TxModelHandle<'_, 't, D>> {
        let model = self.inner.schema.model_id(name)?;
        Ok(TxModelHandle {
            client: self,
            model,
        })
    }

    /// A nested transaction: a savepoint scope within this one.
    pub async fn transaction<R, F>(&self, f: F) -> Result<R>
    where
        F: for<'n> AsyncFnOnce(&'n TransactionClient<'n, D>) -> Result<R>,
    {
        let inner = self.inner;
        self.tx
            .transaction(async |child: &Transaction<'_, D>| {
                let client = TransactionClient { inner, tx: child };
                f(&client).await
            })
            .await
    }

    pub async fn query_raw(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>> {
        engine::query_raw(self.inner.ctx(), Executor::Tx(self.tx), sql, &params).await
    }

    pub async fn execute_raw(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let result = self.tx.execute_raw(sql, &params).await?;
        Ok(result.affected)
    }
}

/// Per-model operations inside a transaction. Mutations run in a savepoint
/// scope so a failed nested write rolls back cleanly without tearing down
/// the caller's transaction.
pub struct TxModelHandle<'h, 't, D: Driver> {
    client: &'h TransactionClient<'t, D>,
    model: ModelId,
}

impl<'h, 't, D: Driver> TxModelHandle<'h, 't, D> {
    fn ctx(&self) -> EngineCtx<'h> {
        self.client.inner.ctx()
    }

    pub async fn find_many(&self, args: FindArgs) -> Result<Vec<Record>> {
        engine::find_many(self.ctx(), Executor::Tx(self.client.tx), self.model, &args).await
    }

    pub async fn find_unique(&self, args: FindArgs) -> Result<Option<Record>> {
        engine::find_one(
            self.ctx(),
            Executor::Tx(self.client.tx),
            self.model,
            Operation::FindUnique,
            &args,
        )
        .await
    }

    pub async fn find_unique_or_throw(&self, args: FindArgs) -> Result<Record> {
        engine::find_one(
            self.ctx(),
            Executor::Tx(self.client.tx),
            self.model,
            Operation::FindUniqueOrThrow,
            &args,
        )
        .await?
        .ok_or_else(|| Error::RecordNotFound {
            model: self.ctx().schema.model(self.model).name.clone(),
            operation: Operation::FindUniqueOrThrow.name(),
        })
    }

    pub async fn find_first(&self, args: FindArgs) -> Result<Option<Record>> {
        engine::find_one(
            self.ctx(),
            Executor::Tx(self.client.tx),
            self.model,
            Operation::FindFirst,
            &args,
        )
        .await
    }

    pub async fn count(&self, args: CountArgs) -> Result<i64> {
        engine::count(self.ctx(), Executor::Tx(self.client.tx), self.model, &args).await
    }

    pub async fn aggregate(&self, args: AggregateArgs) -> Result<Record> {
        engine::aggregate(self.ctx(), Executor::Tx(self.client.tx), self.model, &args).await
    }

    pub async fn group_by(&self, args: GroupByArgs) -> Result<Vec<Record>> {
        engine::group_by(self.ctx(), Executor::Tx(self.client.tx), self.model, &args).await
    }

    pub async fn exist(&self, args: CountArgs) -> Result<bool> {
        engine::exist(self.ctx(), Executor::Tx(self.client.tx), self.model, &args).await
    }

    pub async fn create(&self, args: CreateArgs) -> Result<Record> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| engine::create(ctx, tx, model, &args).await)
            .await
    }

    pub async fn create_many(&self, args: CreateManyArgs) -> Result<u64> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| {
                engine::create_many(ctx, tx, model, &args).await
            })
            .await
    }

    pub async fn update(&self, args: UpdateArgs) -> Result<Record> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| engine::update(ctx, tx, model, &args).await)
            .await
    }

    pub async fn update_many(&self, args: UpdateManyArgs) -> Result<u64> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| {
                engine::update_many(ctx, tx, model, &args).await
            })
            .await
    }

    pub async fn upsert(&self, args: UpsertArgs) -> Result<Record> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| engine::upsert(ctx, tx, model, &args).await)
            .await
    }

    pub async fn delete(&self, args: DeleteArgs) -> Result<Record> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| engine::delete(ctx, tx, model, &args).await)
            .await
    }

    pub async fn delete_many(&self, args: DeleteManyArgs) -> Result<u64> {
        let model = self.model;
        let ctx = self.ctx();
        self.client
            .tx
            .transaction(async |tx: &Transaction<'_, D>| {
                engine::delete_many(ctx, tx, model, &args).await
            })
            .await
    }
}
