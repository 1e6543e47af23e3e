//! Ordering clauses.

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub const fn reversed(&self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// NULL placement. A no-op on MySQL/SQLite; PostgreSQL emits the clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// What a single order term sorts by.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderByTarget {
    Field(String),
    /// A field of a to-one relation; compiled to a correlated scalar
    /// subquery as the sort key.
    RelationField { relation: String, field: String },
    /// The number of related rows.
    RelationCount { relation: String },
}

/// One term of an ORDER BY list. Insertion order of terms is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub target: OrderByTarget,
    pub direction: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn field(name: impl Into<String>, direction: SortOrder) -> Self {
        Self {
            target: OrderByTarget::Field(name.into()),
            direction,
            nulls: None,
        }
    }

    pub fn asc(name: impl Into<String>) -> Self {
        Self::field(name, SortOrder::Asc)
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self::field(name, SortOrder::Desc)
    }

    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    pub fn reversed(mut self) -> Self {
        self.direction = self.direction.reversed();
        self
    }
}
