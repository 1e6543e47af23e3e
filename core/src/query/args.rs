//! Top-level operation arguments.

use super::filter::{Filter, ScalarFilter};
use super::order::OrderBy;
use super::select::{RelationArgs, Selection};
use super::write::{CreateData, ScalarWrites, UpdateData};
use super::AggregateFn;
use indexmap::IndexMap;

/// Arguments shared by the whole `find*` family, plus `exist`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    /// Row limit; negative values take from the end of the ordered set
    /// (the planner reverses the ordering and re-reverses rows).
    pub take: Option<i64>,
    pub skip: Option<u64>,
    /// DISTINCT over these fields (DISTINCT ON on PostgreSQL; simulated via
    /// ROW_NUMBER elsewhere).
    pub distinct: Vec<String>,
    /// Explicit projection. Mutually exclusive with entries in `include`
    /// naming the same relation.
    pub select: Option<Selection>,
    /// Relations to load on top of the default scalar set.
    pub include: IndexMap<String, RelationArgs>,
}

impl FindArgs {
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateArgs {
    pub data: CreateData,
    pub select: Option<Selection>,
    pub include: IndexMap<String, RelationArgs>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateManyArgs {
    pub data: Vec<ScalarWrites>,
    pub skip_duplicates: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateArgs {
    /// Unique filter selecting exactly one row.
    pub filter: Filter,
    pub data: UpdateData,
    pub select: Option<Selection>,
    pub include: IndexMap<String, RelationArgs>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateManyArgs {
    pub filter: Option<Filter>,
    pub data: UpdateData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertArgs {
    /// Unique filter; its equality fields name the conflict target.
    pub filter: Filter,
    pub create: CreateData,
    pub update: UpdateData,
    pub select: Option<Selection>,
    pub include: IndexMap<String, RelationArgs>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteArgs {
    pub filter: Filter,
    pub select: Option<Selection>,
    pub include: IndexMap<String, RelationArgs>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteManyArgs {
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountArgs {
    pub filter: Option<Filter>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
}

/// Which aggregation buckets to compute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSelection {
    pub count_all: bool,
    pub count: Vec<String>,
    pub sum: Vec<String>,
    pub avg: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl AggregateSelection {
    pub fn is_empty(&self) -> bool {
        !self.count_all
            && self.count.is_empty()
            && self.sum.is_empty()
            && self.avg.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateArgs {
    pub filter: Option<Filter>,
    pub selection: AggregateSelection,
    pub take: Option<i64>,
    pub skip: Option<u64>,
}

/// One HAVING term: an aggregate compared against a condition. Terms are
/// conjoined.
#[derive(Debug, Clone, PartialEq)]
pub struct Having {
    pub aggregate: AggregateFn,
    /// The aggregated field; `None` means `COUNT(*)`.
    pub field: Option<String>,
    pub condition: ScalarFilter,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub selection: AggregateSelection,
    pub having: Vec<Having>,
    pub order_by: Vec<OrderBy>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
}
