//! Payload validation.
//!
//! Queries reach the planner only after passing through here: names resolved,
//! `select`/`include` merged with overlap rejected, filter shapes checked
//! against field kinds, user validators run against write data. The planner
//! can then assume canonical input.

use crate::error::{Error, Result};
use crate::query::{
    CreateData, Filter, FindArgs, OrderBy, OrderByTarget, RelationArgs, RelationFilter,
    ScalarFilter, Selection, SetOp, UpdateData,
};
use crate::schema::{FieldKind, FieldState, ModelId, ModelState, Schema};
use crate::value::Value;
use indexmap::IndexMap;

/// Self-include depth past which a plan is rejected as runaway.
pub const MAX_SELF_INCLUDE_DEPTH: usize = 10;

pub struct PayloadValidator<'a> {
    schema: &'a Schema,
}

impl<'a> PayloadValidator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    fn model(&self, id: ModelId) -> &'a ModelState {
        self.schema.model(id)
    }

    /// Validates a find-family payload and returns the effective projection.
    pub fn validate_find(&self, model: ModelId, args: &FindArgs) -> Result<Selection> {
        if let Some(filter) = &args.filter {
            self.validate_filter(model, filter)?;
        }
        self.validate_order(model, &args.order_by)?;
        let state = self.model(model);
        for field in &args.distinct {
            state.field(field)?;
        }
        let selection = self.effective_selection(model, args.select.as_ref(), &args.include)?;
        let mut path = Vec::new();
        self.validate_selection(model, &selection, &mut path)?;
        Ok(selection)
    }

    /// Merges `select` and `include`, rejecting overlap on relation names.
    pub fn effective_selection(
        &self,
        model: ModelId,
        select: Option<&Selection>,
        include: &IndexMap<String, RelationArgs>,
    ) -> Result<Selection> {
        let state = self.model(model);
        let mut selection = select.cloned().unwrap_or_default();
        for (name, args) in include {
            if selection.relations.contains_key(name) {
                return Err(Error::Validation {
                    model: state.name.clone(),
                    operation: "select",
                    message: format!("relation `{name}` appears in both select and include"),
                });
            }
            selection.relations.insert(name.clone(), args.clone());
        }
        Ok(selection)
    }

    /// Recursive projection check, with the self-include depth cap.
    pub fn validate_selection(
        &self,
        model: ModelId,
        selection: &Selection,
        path: &mut Vec<ModelId>,
    ) -> Result<()> {
        let state = self.model(model);
        if let Some(fields) = &selection.fields {
            for name in fields {
                state.field(name)?;
            }
        }
        path.push(model);
        let depth = path.iter().filter(|m| **m == model).count();
        if depth > MAX_SELF_INCLUDE_DEPTH {
            path.pop();
            return Err(Error::QueryComplexity {
                model: state.name.clone(),
                depth: MAX_SELF_INCLUDE_DEPTH,
            });
        }
        for (name, args) in &selection.relations {
            let relation = state.relation(name)?;
            if let Some(filter) = &args.filter {
                self.validate_filter(relation.target, filter)?;
            }
            self.validate_order(relation.target, &args.order_by)?;
            self.validate_selection(relation.target, &args.selection, path)?;
        }
        path.pop();
        Ok(())
    }

    pub fn validate_filter(&self, model: ModelId, filter: &Filter) -> Result<()> {
        let state = self.model(model);
        match filter {
            Filter::And(filters) | Filter::Or(filters) => {
                for inner in filters {
                    self.validate_filter(model, inner)?;
                }
            }
            Filter::Not(inner) => self.validate_filter(model, inner)?,
            Filter::Scalar { field, condition } => {
                let field_state = state.field(field)?;
                self.validate_scalar_condition(state, field_state, condition)?;
            }
            Filter::Relation {
                relation,
                condition,
            } => {
                let relation_state = state.relation(relation)?;
                let to_many = relation_state.kind.is_to_many();
                match condition {
                    RelationFilter::Some(inner)
                    | RelationFilter::Every(inner)
                    | RelationFilter::None(inner) => {
                        if !to_many {
                            return Err(Error::Validation {
                                model: state.name.clone(),
                                operation: "where",
                                message: format!(
                                    "some/every/none apply to list relations; `{relation}` is to-one"
                                ),
                            });
                        }
                        self.validate_filter(relation_state.target, inner)?;
                    }
                    RelationFilter::Is(inner) | RelationFilter::IsNot(inner) => {
                        if to_many {
                            return Err(Error::Validation {
                                model: state.name.clone(),
                                operation: "where",
                                message: format!(
                                    "is/isNot apply to to-one relations; `{relation}` is a list"
                                ),
                            });
                        }
                        if let Some(inner) = inner {
                            self.validate_filter(relation_state.target, inner)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_scalar_condition(
        &self,
        model: &ModelState,
        field: &FieldState,
        condition: &ScalarFilter,
    ) -> Result<()> {
        let array_only = matches!(
            condition,
            ScalarFilter::Has(_)
                | ScalarFilter::HasEvery(_)
                | ScalarFilter::HasSome(_)
                | ScalarFilter::IsEmpty(_)
        );
        if array_only && !field.array {
            return Err(Error::Validation {
                model: model.name.clone(),
                operation: "where",
                message: format!("array filter applied to non-array field `{}`", field.name),
            });
        }
        let string_only = matches!(
            condition,
            ScalarFilter::Contains { .. }
                | ScalarFilter::StartsWith { .. }
                | ScalarFilter::EndsWith { .. }
        );
        if string_only && !matches!(field.kind, FieldKind::String | FieldKind::Enum { .. }) {
            return Err(Error::Validation {
                model: model.name.clone(),
                operation: "where",
                message: format!(
                    "string filter applied to {} field `{}`",
                    field.kind.name(),
                    field.name
                ),
            });
        }
        if matches!(condition, ScalarFilter::JsonPath { .. })
            && !matches!(field.kind, FieldKind::Json)
        {
            return Err(Error::Validation {
                model: model.name.clone(),
                operation: "where",
                message: format!("json path filter applied to non-json field `{}`", field.name),
            });
        }
        if matches!(condition, ScalarFilter::Geo(..)) && !matches!(field.kind, FieldKind::Geometry)
        {
            return Err(Error::Validation {
                model: model.name.clone(),
                operation: "where",
                message: format!(
                    "geospatial filter applied to non-geometry field `{}`",
                    field.name
                ),
            });
        }
        Ok(())
    }

    pub fn validate_order(&self, model: ModelId, order_by: &[OrderBy]) -> Result<()> {
        let state = self.model(model);
        for term in order_by {
            match &term.target {
                OrderByTarget::Field(name) => {
                    state.field(name)?;
                }
                OrderByTarget::RelationField { relation, field } => {
                    let relation_state = state.relation(relation)?;
                    if relation_state.kind.is_to_many() {
                        return Err(Error::Validation {
                            model: state.name.clone(),
                            operation: "order_by",
                            message: format!(
                                "ordering by a field of list relation `{relation}` is ambiguous"
                            ),
                        });
                    }
                    self.model(relation_state.target).field(field)?;
                }
                OrderByTarget::RelationCount { relation } => {
                    let relation_state = state.relation(relation)?;
                    if !relation_state.kind.is_to_many() {
                        return Err(Error::Validation {
                            model: state.name.clone(),
                            operation: "order_by",
                            message: format!("relation count ordering needs a list relation, `{relation}` is to-one"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// A unique-scoped filter (`find_unique`, `update`, `delete`, `upsert`)
    /// must pin a unique key with equality conditions.
    pub fn validate_unique_filter(&self, model: ModelId, filter: &Filter) -> Result<()> {
        self.validate_filter(model, filter)?;
        let state = self.model(model);
        let fields: Vec<&str> = filter
            .equality_fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        if fields.is_empty() || !state.is_unique_key(&fields) {
            return Err(Error::Validation {
                model: state.name.clone(),
                operation: "where",
                message: "filter must pin a unique key with equality conditions".into(),
            });
        }
        Ok(())
    }

    /// Checks create data: known fields, validators, known relations, and
    /// write shapes legal for each relation's cardinality.
    pub fn validate_create(&self, model: ModelId, data: &CreateData) -> Result<()> {
        let state = self.model(model);
        for (name, value) in &data.scalars {
            let field = state.field(name)?;
            self.run_validator(state, field, value)?;
        }
        for (name, nested) in &data.nested {
            let relation = state.relation(name)?;
            if nested.create_many.is_some() && !relation.kind.is_to_many() {
                return Err(Error::Validation {
                    model: state.name.clone(),
                    operation: "create",
                    message: format!("create_many is not valid on to-one relation `{name}`"),
                });
            }
            for create in &nested.create {
                self.validate_create(relation.target, create)?;
            }
            for filter in &nested.connect {
                self.validate_unique_filter(relation.target, filter)?;
            }
            for item in &nested.connect_or_create {
                self.validate_unique_filter(relation.target, &item.filter)?;
                self.validate_create(relation.target, &item.create)?;
            }
        }
        Ok(())
    }

    pub fn validate_update(&self, model: ModelId, data: &UpdateData) -> Result<()> {
        let state = self.model(model);
        for (name, op) in &data.sets {
            let field = state.field(name)?;
            let numeric_only = matches!(
                op,
                SetOp::Increment(_) | SetOp::Decrement(_) | SetOp::Multiply(_) | SetOp::Divide(_)
            );
            if numeric_only
                && !matches!(
                    field.kind,
                    FieldKind::Int | FieldKind::Float | FieldKind::Decimal | FieldKind::BigInt
                )
            {
                return Err(Error::Validation {
                    model: state.name.clone(),
                    operation: "update",
                    message: format!(
                        "arithmetic update on non-numeric field `{}`",
                        field.name
                    ),
                });
            }
            if matches!(op, SetOp::Push(_) | SetOp::Unshift(_)) && !field.array {
                return Err(Error::Validation {
                    model: state.name.clone(),
                    operation: "update",
                    message: format!("push/unshift on non-array field `{}`", field.name),
                });
            }
            if let SetOp::Set(value) = op {
                self.run_validator(state, field, value)?;
            }
        }
        for (name, nested) in &data.nested {
            let relation = state.relation(name)?;
            let to_many = relation.kind.is_to_many();
            if (nested.create_many.is_some()
                || nested.set.is_some()
                || !nested.update_many.is_empty()
                || !nested.delete_many.is_empty())
                && !to_many
            {
                return Err(Error::Validation {
                    model: state.name.clone(),
                    operation: "update",
                    message: format!("list-relation write applied to to-one relation `{name}`"),
                });
            }
            for create in &nested.create {
                self.validate_create(relation.target, create)?;
            }
            for filter in &nested.connect {
                self.validate_unique_filter(relation.target, filter)?;
            }
            for item in &nested.connect_or_create {
                self.validate_unique_filter(relation.target, &item.filter)?;
                self.validate_create(relation.target, &item.create)?;
            }
            for filter in nested.disconnect.iter().chain(nested.set.iter().flatten()) {
                self.validate_filter(relation.target, filter)?;
            }
            for filter in nested.delete.iter().chain(&nested.delete_many) {
                self.validate_filter(relation.target, filter)?;
            }
            for item in nested.update.iter().chain(&nested.update_many) {
                if let Some(filter) = &item.filter {
                    self.validate_filter(relation.target, filter)?;
                }
                self.validate_update(relation.target, &item.data)?;
            }
            for item in &nested.upsert {
                self.validate_unique_filter(relation.target, &item.filter)?;
                self.validate_create(relation.target, &item.create)?;
                self.validate_update(relation.target, &item.update)?;
            }
        }
        Ok(())
    }

    fn run_validator(&self, model: &ModelState, field: &FieldState, value: &Value) -> Result<()> {
        let Some(validator) = &field.validator else {
            return Ok(());
        };
        if let Err(issues) = validator.validate(value) {
            let message = issues
                .iter()
                .map(|issue| format!("{}: {}", issue.path, issue.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Validation {
                model: model.name.clone(),
                operation: "data",
                message: format!("field `{}` failed validation: {message}", field.name),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RelationArgs;
    use crate::schema::{FieldState, RelationDef};

    fn schema() -> Schema {
        Schema::builder()
            .model("user", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("email", FieldKind::String).unique())
                    .field(FieldState::new("tags", FieldKind::String).array())
                    .relation(RelationDef::one_to_many("posts", "post", ["id"], ["author_id"]));
            })
            .model("post", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("author_id", FieldKind::String))
                    .relation(RelationDef::many_to_one("author", "user", ["author_id"], ["id"]));
            })
            .build()
            .unwrap()
    }

    #[test]
    fn select_include_overlap_is_rejected() {
        let schema = schema();
        let validator = PayloadValidator::new(&schema);
        let user = schema.model_id("user").unwrap();

        let mut args = FindArgs::default();
        args.select = Some(Selection::default().with_relation("posts", RelationArgs::all()));
        args.include.insert("posts".into(), RelationArgs::all());

        let err = validator.validate_find(user, &args).unwrap_err();
        assert_eq!(err.code(), "invalid_payload");
    }

    #[test]
    fn array_filter_on_scalar_field_is_rejected() {
        let schema = schema();
        let validator = PayloadValidator::new(&schema);
        let user = schema.model_id("user").unwrap();

        let filter = Filter::field("email", ScalarFilter::Has(Value::Text("x".into())));
        assert!(validator.validate_filter(user, &filter).is_err());

        let filter = Filter::field("tags", ScalarFilter::Has(Value::Text("x".into())));
        assert!(validator.validate_filter(user, &filter).is_ok());
    }

    #[test]
    fn some_on_to_one_is_rejected() {
        let schema = schema();
        let validator = PayloadValidator::new(&schema);
        let post = schema.model_id("post").unwrap();

        let filter = Filter::relation("author", RelationFilter::Some(Box::new(Filter::all())));
        assert!(validator.validate_filter(post, &filter).is_err());
        let filter = Filter::relation("author", RelationFilter::Is(Some(Box::new(Filter::all()))));
        assert!(validator.validate_filter(post, &filter).is_ok());
    }

    #[test]
    fn non_unique_where_is_rejected_for_unique_ops() {
        let schema = schema();
        let validator = PayloadValidator::new(&schema);
        let user = schema.model_id("user").unwrap();

        let by_tags = Filter::equals("tags", "x");
        assert!(validator.validate_unique_filter(user, &by_tags).is_err());
        let by_email = Filter::equals("email", "a@b.c");
        assert!(validator.validate_unique_filter(user, &by_email).is_ok());
    }

    #[test]
    fn runaway_self_include_is_rejected() {
        let schema = Schema::builder()
            .model("node", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("parent_id", FieldKind::String).nullable())
                    .relation(RelationDef::many_to_one("parent", "node", ["parent_id"], ["id"]))
                    .relation(RelationDef::one_to_many("children", "node", ["id"], ["parent_id"]));
            })
            .build()
            .unwrap();
        let validator = PayloadValidator::new(&schema);
        let node = schema.model_id("node").unwrap();

        let mut selection = Selection::default();
        for _ in 0..12 {
            selection = Selection::default()
                .with_relation("children", RelationArgs {
                    selection,
                    ..RelationArgs::default()
                });
        }
        let mut path = Vec::new();
        let err = validator
            .validate_selection(node, &selection, &mut path)
            .unwrap_err();
        assert_eq!(err.code(), "query_complexity");
    }
}
