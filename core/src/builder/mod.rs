//! The query planner.
//!
//! Consumes validated payloads plus the schema IR and a dialect adapter, and
//! emits [`Sql`] plans. Planning never touches the database: the same payload
//! always produces textually identical SQL.

mod aggregate;
mod context;
mod filters;
mod relations;
mod select;

pub use context::{AliasGen, BuilderContext, ParentLink};
pub use select::FindPlan;

use crate::adapter::SqlAdapter;
use crate::error::Result;
use crate::schema::{FieldKind, FieldState, Schema};
use crate::sql::Sql;
use crate::value::Value;

/// Builds read plans. Mutation plans live in [`crate::mutate`].
pub struct QueryBuilder<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) adapter: &'a dyn SqlAdapter,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a Schema, adapter: &'a dyn SqlAdapter) -> Self {
        Self { schema, adapter }
    }

    /// Encodes a payload value for binding against a field, routing JSON,
    /// array, and vector shapes through their dialect spellings.
    pub(crate) fn encode_scalar_value(&self, field: &FieldState, value: Value) -> Result<Sql> {
        if value.is_null() {
            return Ok(self.adapter.null_literal());
        }
        let value = if field.array {
            match value {
                Value::List(items) => return Ok(self.adapter.array_literal(items)),
                other => other,
            }
        } else {
            value
        };
        match &field.kind {
            FieldKind::Json => {
                let json = match value {
                    Value::Json(json) => json,
                    other => other.to_json(),
                };
                Ok(self.adapter.json_literal(&json))
            }
            FieldKind::Vector { .. } => {
                let floats = match &value {
                    Value::Vector(v) => v.clone(),
                    Value::List(items) => items
                        .iter()
                        .filter_map(|item| match item {
                            Value::Float(f) => Some(*f as f32),
                            Value::Int(n) => Some(*n as f32),
                            _ => None,
                        })
                        .collect(),
                    _ => return Ok(self.adapter.value(value)),
                };
                let vector = self
                    .adapter
                    .vector()
                    .require("vector", self.adapter.dialect().name())?;
                Ok(vector.literal(&floats))
            }
            _ => Ok(self.adapter.value(value)),
        }
    }
}
