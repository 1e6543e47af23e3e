//! Write payloads: create/update data and nested writes.

use super::filter::Filter;
use crate::value::Value;
use indexmap::IndexMap;

/// Scalar column assignments, in declaration order.
pub type ScalarWrites = IndexMap<String, Value>;

/// The data of a `create`, split into scalar assignments and nested writes
/// keyed by relation name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateData {
    pub scalars: ScalarWrites,
    pub nested: IndexMap<String, NestedCreate>,
}

impl CreateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scalars.insert(field.into(), value.into());
        self
    }

    pub fn nested(mut self, relation: impl Into<String>, writes: NestedCreate) -> Self {
        self.nested.insert(relation.into(), writes);
        self
    }
}

/// Nested writes allowed under a `create`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedCreate {
    pub create: Vec<CreateData>,
    pub create_many: Option<(Vec<ScalarWrites>, bool)>,
    /// Unique filters identifying existing rows to connect.
    pub connect: Vec<Filter>,
    pub connect_or_create: Vec<ConnectOrCreate>,
}

impl NestedCreate {
    pub fn create(data: impl IntoIterator<Item = CreateData>) -> Self {
        Self {
            create: data.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn create_many(rows: impl IntoIterator<Item = ScalarWrites>, skip_duplicates: bool) -> Self {
        Self {
            create_many: Some((rows.into_iter().collect(), skip_duplicates)),
            ..Self::default()
        }
    }

    pub fn connect(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            connect: filters.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn connect_or_create(items: impl IntoIterator<Item = ConnectOrCreate>) -> Self {
        Self {
            connect_or_create: items.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.create_many.is_none()
            && self.connect.is_empty()
            && self.connect_or_create.is_empty()
    }
}

/// Lookup-by-unique, then create-and-connect when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOrCreate {
    pub filter: Filter,
    pub create: CreateData,
}

/// One update assignment, dispatched through the adapter's set group.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOp {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
    /// Append to an array column.
    Push(Value),
    /// Prepend to an array column.
    Unshift(Value),
}

/// The data of an `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateData {
    pub sets: IndexMap<String, SetOp>,
    pub nested: IndexMap<String, NestedUpdate>,
}

impl UpdateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.insert(field.into(), SetOp::Set(value.into()));
        self
    }

    pub fn apply(mut self, field: impl Into<String>, op: SetOp) -> Self {
        self.sets.insert(field.into(), op);
        self
    }

    pub fn nested(mut self, relation: impl Into<String>, writes: NestedUpdate) -> Self {
        self.nested.insert(relation.into(), writes);
        self
    }
}

/// A nested `update`/`update_many` entry: which rows, what changes.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpdateItem {
    pub filter: Option<Filter>,
    pub data: UpdateData,
}

/// A nested `upsert` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpsert {
    pub filter: Filter,
    pub create: CreateData,
    pub update: UpdateData,
}

/// Nested writes allowed under an `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedUpdate {
    pub create: Vec<CreateData>,
    pub create_many: Option<(Vec<ScalarWrites>, bool)>,
    pub connect: Vec<Filter>,
    pub connect_or_create: Vec<ConnectOrCreate>,
    /// Detach children without deleting them (FK set to NULL, or junction
    /// rows removed for many-to-many).
    pub disconnect: Vec<Filter>,
    /// Replace the connected set wholesale.
    pub set: Option<Vec<Filter>>,
    pub update: Vec<NestedUpdateItem>,
    pub update_many: Vec<NestedUpdateItem>,
    pub upsert: Vec<NestedUpsert>,
    pub delete: Vec<Filter>,
    pub delete_many: Vec<Filter>,
}

impl NestedUpdate {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.create_many.is_none()
            && self.connect.is_empty()
            && self.connect_or_create.is_empty()
            && self.disconnect.is_empty()
            && self.set.is_none()
            && self.update.is_empty()
            && self.update_many.is_empty()
            && self.upsert.is_empty()
            && self.delete.is_empty()
            && self.delete_many.is_empty()
    }
}
