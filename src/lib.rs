//! viborm — a multi-dialect relational query engine.
//!
//! Structured, schema-validated query descriptions compile to parameterized
//! SQL for PostgreSQL, MySQL, or SQLite, execute through a thin async driver
//! abstraction, and parse back into typed result trees with exact wide-numeric
//! preservation and nested relation shapes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use viborm::prelude::*;
//!
//! # #[cfg(feature = "rusqlite")]
//! # async fn demo() -> viborm::Result<()> {
//! let schema = Schema::builder()
//!     .model("user", |m| {
//!         m.field(FieldState::new("id", FieldKind::String).id())
//!             .field(FieldState::new("name", FieldKind::String))
//!             .relation(RelationDef::one_to_many("posts", "post", ["id"], ["author_id"]));
//!     })
//!     .model("post", |m| {
//!         m.field(FieldState::new("id", FieldKind::String).id())
//!             .field(FieldState::new("title", FieldKind::String))
//!             .field(FieldState::new("author_id", FieldKind::String))
//!             .relation(RelationDef::many_to_one("author", "user", ["author_id"], ["id"]));
//!     })
//!     .build()?;
//!
//! let client = Client::new(
//!     viborm::drivers::RusqliteDriver::in_memory(),
//!     schema,
//!     Arc::new(viborm_sqlite::SqliteAdapter::new()),
//! );
//!
//! let users = client
//!     .model("user")?
//!     .find_many(FindArgs::filtered(Filter::equals("name", "Ann")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod driver;
pub mod drivers;
mod engine;
pub mod telemetry;
pub mod transaction;

pub use client::{Client, ClientBuilder, ModelHandle, TransactionClient, TxModelHandle};
pub use driver::{Driver, ExecuteResult};
pub use transaction::Transaction;

// Core re-exports so downstream code needs one crate.
pub use viborm_core::error::{Category, Error, Result};
pub use viborm_core::parse::{Record, ResultValue, Row};
pub use viborm_core::query;
pub use viborm_core::schema;
pub use viborm_core::sql::{Rendered, Sql};
pub use viborm_core::value::Value;
pub use viborm_core::Dialect;

#[cfg(feature = "postgres")]
pub use viborm_postgres::PostgresAdapter;

#[cfg(feature = "mysql")]
pub use viborm_mysql::MySqlAdapter;

#[cfg(feature = "sqlite")]
pub use viborm_sqlite::SqliteAdapter;

/// The working set for application code.
pub mod prelude {
    pub use crate::cache::{CacheOptions, MemoryCache};
    pub use crate::client::Client;
    pub use crate::driver::Driver;
    pub use crate::{Error, Record, Result, ResultValue, Value};
    pub use viborm_core::query::{
        AggregateArgs, AggregateSelection, CountArgs, CreateArgs, CreateData, CreateManyArgs,
        DeleteArgs, DeleteManyArgs, Filter, FindArgs, GroupByArgs, NestedCreate, NestedUpdate,
        OrderBy, RelationArgs, RelationFilter, ScalarFilter, Selection, SetOp, SortOrder,
        UpdateArgs, UpdateData, UpdateManyArgs, UpsertArgs,
    };
    pub use viborm_core::schema::{
        DefaultValue, FieldKind, FieldState, JunctionTable, RelationDef, Schema,
    };

    #[cfg(feature = "postgres")]
    pub use viborm_postgres::PostgresAdapter;

    #[cfg(feature = "mysql")]
    pub use viborm_mysql::MySqlAdapter;

    #[cfg(feature = "sqlite")]
    pub use viborm_sqlite::SqliteAdapter;
}
