//! Filter trees.
//!
//! Shorthand forms (`field: value`) are canonicalized to `Equals` by the
//! validation layer; the planner only ever sees these shapes.

use crate::value::Value;

/// String-match case sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    Default,
    Insensitive,
}

/// Geospatial predicates reachable from the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoOp {
    Equals,
    Intersects,
    Contains,
    Within,
    Crosses,
    Overlaps,
    Touches,
    Covers,
    DWithin(f64),
}

/// A condition on a single scalar column.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarFilter {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Between(Value, Value),
    Contains { value: String, mode: QueryMode },
    StartsWith { value: String, mode: QueryMode },
    EndsWith { value: String, mode: QueryMode },
    IsNull(bool),
    /// List membership: the array column contains the value.
    Has(Value),
    /// The array column contains every listed value.
    HasEvery(Vec<Value>),
    /// The array column contains at least one listed value.
    HasSome(Vec<Value>),
    IsEmpty(bool),
    /// Condition applied at a JSON path inside the column.
    JsonPath {
        path: Vec<String>,
        condition: Box<ScalarFilter>,
    },
    Geo(GeoOp, Value),
}

/// A condition on a relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationFilter {
    /// At least one related row matches.
    Some(Box<Filter>),
    /// Every related row matches (vacuously true with no rows).
    Every(Box<Filter>),
    /// No related row matches.
    None(Box<Filter>),
    /// The to-one relation matches; `None` asserts the relation is absent.
    Is(Option<Box<Filter>>),
    /// The to-one relation does not match; `None` asserts presence.
    IsNot(Option<Box<Filter>>),
}

/// A boolean filter tree over one model's fields and relations.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Scalar {
        field: String,
        condition: ScalarFilter,
    },
    Relation {
        relation: String,
        condition: RelationFilter,
    },
}

impl Filter {
    /// The always-true filter.
    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn field(name: impl Into<String>, condition: ScalarFilter) -> Filter {
        Filter::Scalar {
            field: name.into(),
            condition,
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::field(name, ScalarFilter::Equals(value.into()))
    }

    pub fn relation(name: impl Into<String>, condition: RelationFilter) -> Filter {
        Filter::Relation {
            relation: name.into(),
            condition,
        }
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    /// Fields referenced at the top level with `Equals`, in order. Used to
    /// derive the unique target of an upsert from its `where`.
    pub fn equality_fields(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Filter::And(filters) => {
                for filter in filters {
                    filter.collect_equalities(out);
                }
            }
            Filter::Scalar {
                field,
                condition: ScalarFilter::Equals(value),
            } => out.push((field, value)),
            _ => {}
        }
    }
}
