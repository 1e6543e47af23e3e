//! Relation metadata.

use super::ModelId;

/// Relation cardinality between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    /// True when the relation materializes as a list on this side.
    pub const fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }

    /// The cardinality the mirror relation on the target model must declare.
    pub const fn mirror(&self) -> RelationKind {
        match self {
            RelationKind::OneToOne => RelationKind::OneToOne,
            RelationKind::OneToMany => RelationKind::ManyToOne,
            RelationKind::ManyToOne => RelationKind::OneToMany,
            RelationKind::ManyToMany => RelationKind::ManyToMany,
        }
    }
}

/// Junction table descriptor for many-to-many relations.
///
/// `a_column` holds the declaring model's key, `b_column` the target's. The
/// mirror relation declares the same table with the columns swapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionTable {
    pub table: String,
    pub a_column: String,
    pub b_column: String,
}

/// A relation as declared, before target-name resolution.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub target_model: String,
    pub on_fields: Vec<String>,
    pub ref_fields: Vec<String>,
    pub junction: Option<JunctionTable>,
}

impl RelationDef {
    fn new(
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        on_fields: impl IntoIterator<Item = impl Into<String>>,
        ref_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target_model: target.into(),
            on_fields: on_fields.into_iter().map(Into::into).collect(),
            ref_fields: ref_fields.into_iter().map(Into::into).collect(),
            junction: None,
        }
    }

    pub fn one_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        on_fields: impl IntoIterator<Item = impl Into<String>>,
        ref_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(name, RelationKind::OneToOne, target, on_fields, ref_fields)
    }

    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        on_fields: impl IntoIterator<Item = impl Into<String>>,
        ref_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(name, RelationKind::OneToMany, target, on_fields, ref_fields)
    }

    pub fn many_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        on_fields: impl IntoIterator<Item = impl Into<String>>,
        ref_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(name, RelationKind::ManyToOne, target, on_fields, ref_fields)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        on_fields: impl IntoIterator<Item = impl Into<String>>,
        ref_fields: impl IntoIterator<Item = impl Into<String>>,
        junction: JunctionTable,
    ) -> Self {
        let mut def = Self::new(name, RelationKind::ManyToMany, target, on_fields, ref_fields);
        def.junction = Some(junction);
        def
    }
}

/// A relation with its target resolved to a [`ModelId`].
#[derive(Debug, Clone)]
pub struct RelationState {
    pub name: String,
    pub kind: RelationKind,
    pub target: ModelId,
    /// Link fields on the declaring model.
    pub on_fields: Vec<String>,
    /// Link fields on the target model.
    pub ref_fields: Vec<String>,
    pub junction: Option<JunctionTable>,
}
