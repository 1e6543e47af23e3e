//! Runtime schema IR.
//!
//! Models live in an arena owned by [`Schema`]; relations reference their
//! target by [`ModelId`], so cyclic schemas need no indirection beyond the
//! index. Construction goes through [`SchemaBuilder`], which resolves relation
//! targets by name in a second pass and enforces the structural invariants.

mod field;
mod model;
mod relation;

pub use field::{DefaultValue, FieldKind, FieldState, Issue, Validator};
pub use model::{IndexDef, ModelState, UniqueConstraint};
pub use relation::{JunctionTable, RelationDef, RelationKind, RelationState};

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Arena index of a model within a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub(crate) usize);

/// A validated set of models.
#[derive(Debug, Clone)]
pub struct Schema {
    models: Vec<ModelState>,
    by_name: HashMap<String, ModelId>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn model(&self, id: ModelId) -> &ModelState {
        &self.models[id.0]
    }

    pub fn model_id(&self, name: &str) -> Result<ModelId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownModel {
                model: name.to_string(),
            })
    }

    pub fn model_by_name(&self, name: &str) -> Result<&ModelState> {
        self.model_id(name).map(|id| self.model(id))
    }

    pub fn models(&self) -> impl Iterator<Item = (ModelId, &ModelState)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i), m))
    }
}

/// One model under construction.
#[derive(Default)]
pub struct ModelBuilder {
    table: Option<String>,
    fields: Vec<FieldState>,
    relations: Vec<RelationDef>,
    primary_key: Option<Vec<String>>,
    uniques: Vec<UniqueConstraint>,
    indexes: Vec<IndexDef>,
}

impl ModelBuilder {
    pub fn field(&mut self, field: FieldState) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn relation(&mut self, relation: RelationDef) -> &mut Self {
        self.relations.push(relation);
        self
    }

    /// Overrides the table name.
    pub fn map(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(&mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.primary_key = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn unique(
        &mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.uniques.push(UniqueConstraint {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn index(
        &mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
        index_type: Option<&str>,
    ) -> &mut Self {
        self.indexes.push(IndexDef {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            index_type: index_type.map(str::to_string),
        });
        self
    }
}

#[derive(Default)]
pub struct SchemaBuilder {
    models: Vec<(String, ModelBuilder)>,
}

impl SchemaBuilder {
    pub fn model(mut self, name: impl Into<String>, build: impl FnOnce(&mut ModelBuilder)) -> Self {
        let mut builder = ModelBuilder::default();
        build(&mut builder);
        self.models.push((name.into(), builder));
        self
    }

    /// Validates the declarations and resolves relation targets.
    pub fn build(self) -> Result<Schema> {
        let mut by_name = HashMap::new();
        for (index, (name, _)) in self.models.iter().enumerate() {
            if by_name.insert(name.clone(), ModelId(index)).is_some() {
                return Err(Error::Validation {
                    model: name.clone(),
                    operation: "schema",
                    message: "duplicate model name".into(),
                });
            }
        }

        let mut models = Vec::with_capacity(self.models.len());
        for (name, builder) in &self.models {
            models.push(Self::assemble_model(name, builder, &by_name)?);
        }

        let schema = Schema { models, by_name };
        Self::check_relation_mirrors(&schema)?;
        Ok(schema)
    }

    fn assemble_model(
        name: &str,
        builder: &ModelBuilder,
        by_name: &HashMap<String, ModelId>,
    ) -> Result<ModelState> {
        let mut fields = IndexMap::new();
        for field in &builder.fields {
            if field.array && !field.kind.supports_array() {
                return Err(Error::Validation {
                    model: name.to_string(),
                    operation: "schema",
                    message: format!("field `{}` of kind {} cannot be an array", field.name, field.kind.name()),
                });
            }
            if field.is_id && field.array {
                return Err(Error::Validation {
                    model: name.to_string(),
                    operation: "schema",
                    message: format!("id field `{}` cannot be an array", field.name),
                });
            }
            if fields.insert(field.name.clone(), field.clone()).is_some() {
                return Err(Error::Validation {
                    model: name.to_string(),
                    operation: "schema",
                    message: format!("duplicate field `{}`", field.name),
                });
            }
        }

        let mut relations = IndexMap::new();
        for def in &builder.relations {
            let target = by_name
                .get(&def.target_model)
                .copied()
                .ok_or_else(|| Error::UnknownModel {
                    model: def.target_model.clone(),
                })?;
            if def.on_fields.len() != def.ref_fields.len() || def.on_fields.is_empty() {
                return Err(Error::Validation {
                    model: name.to_string(),
                    operation: "schema",
                    message: format!("relation `{}` must link equal numbers of fields", def.name),
                });
            }
            if def.kind == RelationKind::ManyToMany && def.junction.is_none() {
                return Err(Error::Validation {
                    model: name.to_string(),
                    operation: "schema",
                    message: format!("many-to-many relation `{}` needs a junction table", def.name),
                });
            }
            let state = RelationState {
                name: def.name.clone(),
                kind: def.kind,
                target,
                on_fields: def.on_fields.clone(),
                ref_fields: def.ref_fields.clone(),
                junction: def.junction.clone(),
            };
            if relations.insert(def.name.clone(), state).is_some() {
                return Err(Error::Validation {
                    model: name.to_string(),
                    operation: "schema",
                    message: format!("duplicate relation `{}`", def.name),
                });
            }
        }

        Ok(ModelState {
            name: name.to_string(),
            table: builder.table.clone(),
            fields,
            relations,
            primary_key: builder.primary_key.clone(),
            uniques: builder.uniques.clone(),
            indexes: builder.indexes.clone(),
        })
    }

    /// Every relation must have a mirror on the target model; one-to-one must
    /// agree on the field pair, many-to-many on a symmetric junction.
    fn check_relation_mirrors(schema: &Schema) -> Result<()> {
        for (id, model) in schema.models() {
            for relation in model.relations.values() {
                let target = schema.model(relation.target);
                let mirror = target.relations.values().find(|candidate| {
                    candidate.target == id && candidate.kind == relation.kind.mirror()
                });
                let Some(mirror) = mirror else {
                    return Err(Error::Validation {
                        model: model.name.clone(),
                        operation: "schema",
                        message: format!(
                            "relation `{}` has no {:?} mirror on `{}`",
                            relation.name,
                            relation.kind.mirror(),
                            target.name
                        ),
                    });
                };
                match relation.kind {
                    RelationKind::OneToOne => {
                        if mirror.on_fields != relation.ref_fields
                            || mirror.ref_fields != relation.on_fields
                        {
                            return Err(Error::Validation {
                                model: model.name.clone(),
                                operation: "schema",
                                message: format!(
                                    "one-to-one relation `{}` and its mirror disagree on the field pair",
                                    relation.name
                                ),
                            });
                        }
                    }
                    RelationKind::ManyToMany => {
                        let (Some(a), Some(b)) = (&relation.junction, &mirror.junction) else {
                            return Err(Error::Validation {
                                model: model.name.clone(),
                                operation: "schema",
                                message: format!(
                                    "many-to-many relation `{}` is missing a junction on one side",
                                    relation.name
                                ),
                            });
                        };
                        if a.table != b.table || a.a_column != b.b_column || a.b_column != b.a_column
                        {
                            return Err(Error::Validation {
                                model: model.name.clone(),
                                operation: "schema",
                                message: format!(
                                    "junction for `{}` is not symmetric across both sides",
                                    relation.name
                                ),
                            });
                        }
                    }
                    RelationKind::OneToMany | RelationKind::ManyToOne => {}
                }
                for field in &relation.on_fields {
                    model.field(field)?;
                }
                for field in &relation.ref_fields {
                    target.field(field)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_schema() -> Schema {
        Schema::builder()
            .model("user", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("email", FieldKind::String).unique())
                    .field(FieldState::new("name", FieldKind::String).nullable())
                    .relation(RelationDef::one_to_many("posts", "post", ["id"], ["author_id"]));
            })
            .model("post", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("title", FieldKind::String))
                    .field(FieldState::new("author_id", FieldKind::String))
                    .relation(RelationDef::many_to_one("author", "user", ["author_id"], ["id"]));
            })
            .build()
            .expect("valid schema")
    }

    #[test]
    fn resolves_relation_targets() {
        let schema = blog_schema();
        let user = schema.model_by_name("user").unwrap();
        let posts = user.relation("posts").unwrap();
        assert_eq!(schema.model(posts.target).name, "post");
        assert!(posts.kind.is_to_many());
    }

    #[test]
    fn missing_mirror_is_rejected() {
        let result = Schema::builder()
            .model("user", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .relation(RelationDef::one_to_many("posts", "post", ["id"], ["author_id"]));
            })
            .model("post", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("author_id", FieldKind::String));
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn json_arrays_are_rejected() {
        let result = Schema::builder()
            .model("doc", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("meta", FieldKind::Json).array());
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn compound_unique_keys_are_recognized() {
        let schema = Schema::builder()
            .model("member", |m| {
                m.field(FieldState::new("org", FieldKind::String))
                    .field(FieldState::new("user", FieldKind::String))
                    .primary_key(["org", "user"])
                    .unique("member_email", ["email"])
                    .field(FieldState::new("email", FieldKind::String));
            })
            .build()
            .unwrap();
        let member = schema.model_by_name("member").unwrap();
        assert!(member.is_unique_key(&["user", "org"]));
        assert!(member.is_unique_key(&["email"]));
        assert!(!member.is_unique_key(&["org"]));
    }
}
