//! Projection trees: what to return.

use super::filter::Filter;
use super::order::OrderBy;
use indexmap::IndexMap;

/// The projection of one model level: which scalars and which relations.
///
/// `fields: None` selects every scalar field; relations are only loaded when
/// listed. Produced by the validation layer from the user's `select` /
/// `include` trees — by the time a `Selection` reaches the planner, overlap
/// has been rejected and relation names resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub fields: Option<Vec<String>>,
    pub relations: IndexMap<String, RelationArgs>,
}

impl Selection {
    /// Every scalar, no relations.
    pub fn all_scalars() -> Self {
        Self::default()
    }

    pub fn fields(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: Some(names.into_iter().map(Into::into).collect()),
            relations: IndexMap::new(),
        }
    }

    pub fn with_relation(mut self, name: impl Into<String>, args: RelationArgs) -> Self {
        self.relations.insert(name.into(), args);
        self
    }

    /// True when nothing beyond the default scalar set is requested.
    pub fn is_default(&self) -> bool {
        self.fields.is_none() && self.relations.is_empty()
    }
}

/// Arguments scoping a materialized relation: filtering and paging apply to
/// the nested rows, never to the parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
    pub selection: Selection,
}

impl RelationArgs {
    /// Load everything on the relation, no scoping.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}
