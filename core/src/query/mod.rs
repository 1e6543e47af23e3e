//! Operation payloads.
//!
//! These types are the validated, canonical form of a query description: the
//! planner consumes them without further normalization.

mod args;
mod filter;
mod order;
mod select;
mod write;

pub use args::{
    AggregateArgs, AggregateSelection, CountArgs, CreateArgs, CreateManyArgs, DeleteArgs,
    DeleteManyArgs, FindArgs, GroupByArgs, Having, UpdateArgs, UpdateManyArgs, UpsertArgs,
};
pub use filter::{Filter, GeoOp, QueryMode, RelationFilter, ScalarFilter};
pub use order::{NullsOrder, OrderBy, OrderByTarget, SortOrder};
pub use select::{RelationArgs, Selection};
pub use write::{
    ConnectOrCreate, CreateData, NestedCreate, NestedUpdate, NestedUpdateItem, NestedUpsert,
    ScalarWrites, SetOp, UpdateData,
};

/// Aggregate functions usable in `aggregate`, `group_by`, and `having`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub const fn name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

/// Every operation the engine executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FindUnique,
    FindUniqueOrThrow,
    FindFirst,
    FindFirstOrThrow,
    FindMany,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Count,
    Aggregate,
    GroupBy,
    Exist,
    QueryRaw,
    ExecuteRaw,
}

impl Operation {
    /// Stable name, used in cache keys and telemetry attributes.
    pub const fn name(&self) -> &'static str {
        match self {
            Operation::FindUnique => "find_unique",
            Operation::FindUniqueOrThrow => "find_unique_or_throw",
            Operation::FindFirst => "find_first",
            Operation::FindFirstOrThrow => "find_first_or_throw",
            Operation::FindMany => "find_many",
            Operation::Create => "create",
            Operation::CreateMany => "create_many",
            Operation::Update => "update",
            Operation::UpdateMany => "update_many",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::DeleteMany => "delete_many",
            Operation::Count => "count",
            Operation::Aggregate => "aggregate",
            Operation::GroupBy => "group_by",
            Operation::Exist => "exist",
            Operation::QueryRaw => "query_raw",
            Operation::ExecuteRaw => "execute_raw",
        }
    }

    /// Read operations never touch data and are the only cacheable ones.
    pub const fn is_read(&self) -> bool {
        matches!(
            self,
            Operation::FindUnique
                | Operation::FindUniqueOrThrow
                | Operation::FindFirst
                | Operation::FindFirstOrThrow
                | Operation::FindMany
                | Operation::Count
                | Operation::Aggregate
                | Operation::GroupBy
                | Operation::Exist
        )
    }

    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::CreateMany
                | Operation::Update
                | Operation::UpdateMany
                | Operation::Upsert
                | Operation::Delete
                | Operation::DeleteMany
                | Operation::ExecuteRaw
        )
    }

    /// `*_or_throw` variants error on an empty result instead of returning
    /// nothing.
    pub const fn throws_on_missing(&self) -> bool {
        matches!(
            self,
            Operation::FindUniqueOrThrow | Operation::FindFirstOrThrow
        )
    }
}
