//! Mutation planning.
//!
//! Single-statement builders for INSERT / UPDATE / DELETE / upsert, plus the
//! helpers nested-write execution needs: engine-side default filling,
//! `updated_at` touching, junction-row statements, and the parent/child
//! ordering rule. Plans that expand to several statements are driven by the
//! executor, which feeds runtime key values (RETURNING or `last_insert_id`)
//! back into the next statement inside one transaction.

use crate::adapter::SqlAdapter;
use crate::builder::QueryBuilder;
use crate::error::{Error, Result};
use crate::query::{Filter, ScalarWrites, SetOp};
use crate::schema::{
    DefaultValue, JunctionTable, ModelId, ModelState, RelationKind, RelationState, Schema,
};
use crate::sql::Sql;
use crate::value::Value;
use indexmap::IndexMap;

/// Builds mutation statements. Wraps the read planner for filter
/// compilation.
pub struct MutationBuilder<'a> {
    query: QueryBuilder<'a>,
    schema: &'a Schema,
    adapter: &'a dyn SqlAdapter,
}

impl<'a> MutationBuilder<'a> {
    pub fn new(schema: &'a Schema, adapter: &'a dyn SqlAdapter) -> Self {
        Self {
            query: QueryBuilder::new(schema, adapter),
            schema,
            adapter,
        }
    }

    /// Mutation filters correlate through the bare table name rather than a
    /// minted alias, so statements read `UPDATE "post" ... WHERE
    /// "post"."id" = $1`.
    fn compile_filter(&self, model: ModelId, filter: &Filter) -> Result<Sql> {
        let state = self.schema.model(model);
        let mut aliases = crate::builder::AliasGen::new();
        self.query
            .compile_filter(model, state.table_name(), filter, &mut aliases)
    }

    /// All scalar columns, aliased to field names, for RETURNING clauses.
    fn returning_columns(&self, state: &ModelState) -> Vec<Sql> {
        state
            .scalar_fields()
            .map(|field| {
                self.adapter
                    .aliased(self.adapter.escape(field.column_name()), &field.name)
            })
            .collect()
    }

    /// Single-row INSERT. With `use_returning` the statement yields the full
    /// created row (defaults materialized by the database).
    pub fn build_insert(
        &self,
        model: ModelId,
        scalars: &ScalarWrites,
        use_returning: bool,
    ) -> Result<Sql> {
        let state = self.schema.model(model);
        let mut columns = Vec::with_capacity(scalars.len());
        let mut values = Vec::with_capacity(scalars.len());
        for (name, value) in scalars {
            let field = state.field(name)?;
            columns.push(self.adapter.escape(field.column_name()));
            values.push(self.query.encode_scalar_value(field, value.clone())?);
        }
        let mut sql = self.adapter.insert(
            self.adapter.escape(state.table_name()),
            columns,
            vec![values],
            false,
        );
        if use_returning {
            sql = sql.append(self.adapter.returning(self.returning_columns(state)));
        }
        Ok(sql)
    }

    /// Batch INSERT. Column set is the union over all rows in first-seen
    /// order; absent cells fall back to the dialect's default expression.
    pub fn build_insert_many(
        &self,
        model: ModelId,
        rows: &[ScalarWrites],
        skip_duplicates: bool,
    ) -> Result<Sql> {
        let state = self.schema.model(model);
        let mut column_names: Vec<&str> = Vec::new();
        for row in rows {
            for name in row.keys() {
                if !column_names.iter().any(|existing| existing == name) {
                    column_names.push(name);
                }
            }
        }

        let mut columns = Vec::with_capacity(column_names.len());
        for name in &column_names {
            let field = state.field(name)?;
            columns.push(self.adapter.escape(field.column_name()));
        }

        let mut value_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(column_names.len());
            for name in &column_names {
                match row.get(*name) {
                    Some(value) => {
                        let field = state.field(name)?;
                        cells.push(self.query.encode_scalar_value(field, value.clone())?);
                    }
                    None => cells.push(self.adapter.default_keyword()),
                }
            }
            value_rows.push(cells);
        }

        Ok(self.adapter.insert(
            self.adapter.escape(state.table_name()),
            columns,
            value_rows,
            skip_duplicates,
        ))
    }

    /// UPDATE with set-operation dispatch. `filter: None` touches every row.
    pub fn build_update(
        &self,
        model: ModelId,
        filter: Option<&Filter>,
        sets: &IndexMap<String, SetOp>,
        use_returning: bool,
    ) -> Result<Sql> {
        let state = self.schema.model(model);
        let assignments = self.set_assignments(state, sets)?;
        if assignments.is_empty() {
            return Err(Error::Validation {
                model: state.name.clone(),
                operation: "update",
                message: "update data contains no assignments".into(),
            });
        }
        let where_clause = filter
            .map(|filter| self.compile_filter(model, filter))
            .transpose()?;
        let mut sql = self.adapter.update(
            self.adapter.escape(state.table_name()),
            assignments,
            where_clause,
        );
        if use_returning {
            sql = sql.append(self.adapter.returning(self.returning_columns(state)));
        }
        Ok(sql)
    }

    /// DELETE. `filter: None` clears the table.
    pub fn build_delete(
        &self,
        model: ModelId,
        filter: Option<&Filter>,
        use_returning: bool,
    ) -> Result<Sql> {
        let state = self.schema.model(model);
        let where_clause = filter
            .map(|filter| self.compile_filter(model, filter))
            .transpose()?;
        let mut sql = self
            .adapter
            .delete(self.adapter.escape(state.table_name()), where_clause);
        if use_returning {
            sql = sql.append(self.adapter.returning(self.returning_columns(state)));
        }
        Ok(sql)
    }

    /// Single-statement upsert: `INSERT ... ON CONFLICT (target) DO UPDATE`
    /// (`ON DUPLICATE KEY UPDATE` on MySQL). The conflict target is derived
    /// from the unique filter's equality fields.
    pub fn build_upsert(
        &self,
        model: ModelId,
        filter: &Filter,
        create: &ScalarWrites,
        update: &IndexMap<String, SetOp>,
        use_returning: bool,
    ) -> Result<Sql> {
        let state = self.schema.model(model);

        let mut columns = Vec::with_capacity(create.len());
        let mut values = Vec::with_capacity(create.len());
        for (name, value) in create {
            let field = state.field(name)?;
            columns.push(self.adapter.escape(field.column_name()));
            values.push(self.query.encode_scalar_value(field, value.clone())?);
        }

        let target = filter
            .equality_fields()
            .into_iter()
            .map(|(name, _)| {
                state
                    .field(name)
                    .map(|field| self.adapter.escape(field.column_name()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut assignments = self.set_assignments(state, update)?;
        if assignments.is_empty() {
            // The conflict clause needs at least one assignment; a key
            // self-assignment keeps the statement valid without changes.
            let keep = target.first().cloned().unwrap_or_else(|| {
                self.adapter.escape(
                    state
                        .id_fields()
                        .first()
                        .map(|field| field.column_name())
                        .unwrap_or("id"),
                )
            });
            assignments.push(self.adapter.assign(keep.clone(), keep));
        }

        let mut sql = self.adapter.insert(
            self.adapter.escape(state.table_name()),
            columns,
            vec![values],
            false,
        );
        sql = sql.append(self.adapter.on_conflict_update(target, assignments));
        if use_returning {
            sql = sql.append(self.adapter.returning(self.returning_columns(state)));
        }
        Ok(sql)
    }

    /// The follow-up SELECT that surfaces a freshly inserted row on dialects
    /// without RETURNING, keyed by the session-local last insert id.
    pub fn build_select_by_last_insert_id(&self, model: ModelId) -> Result<Sql> {
        let state = self.schema.model(model);
        let id_field = state
            .scalar_fields()
            .find(|field| field.auto_increment)
            .or_else(|| state.id_fields().into_iter().next())
            .ok_or_else(|| Error::Validation {
                model: state.name.clone(),
                operation: "create",
                message: "model has no id column to chain last_insert_id through".into(),
            })?;
        let columns = self.returning_columns(state);
        let condition = self.adapter.eq(
            self.adapter.escape(id_field.column_name()),
            self.adapter.last_insert_id(),
        );
        Ok(self
            .adapter
            .select_clause(columns)
            .append(
                self.adapter
                    .from_clause(self.adapter.escape(state.table_name())),
            )
            .append(self.adapter.where_clause(condition)))
    }

    /// Inserts a junction row for a many-to-many connect/create. Tolerates
    /// replays: duplicate memberships are skipped, not errors.
    pub fn build_junction_insert(
        &self,
        junction: &JunctionTable,
        a_value: Value,
        b_value: Value,
    ) -> Sql {
        self.adapter.insert(
            self.adapter.escape(&junction.table),
            vec![
                self.adapter.escape(&junction.a_column),
                self.adapter.escape(&junction.b_column),
            ],
            vec![vec![
                self.adapter.value(a_value),
                self.adapter.value(b_value),
            ]],
            true,
        )
    }

    /// Removes junction rows for a disconnect/set. `b_values: None` clears
    /// every membership of the parent.
    pub fn build_junction_delete(
        &self,
        junction: &JunctionTable,
        a_value: Value,
        b_values: Option<Vec<Value>>,
    ) -> Sql {
        let mut conditions = vec![self.adapter.eq(
            self.adapter.escape(&junction.a_column),
            self.adapter.value(a_value),
        )];
        if let Some(values) = b_values {
            conditions.push(
                self.adapter
                    .in_list(self.adapter.escape(&junction.b_column), values),
            );
        }
        self.adapter.delete(
            self.adapter.escape(&junction.table),
            Some(self.adapter.and(conditions)),
        )
    }

    fn set_assignments(
        &self,
        state: &ModelState,
        sets: &IndexMap<String, SetOp>,
    ) -> Result<Vec<Sql>> {
        let adapter = self.adapter;
        let mut assignments = Vec::with_capacity(sets.len());
        for (name, op) in sets {
            let field = state.field(name)?;
            let column = adapter.escape(field.column_name());
            let assignment = match op {
                SetOp::Set(value) => {
                    let rhs = self.query.encode_scalar_value(field, value.clone())?;
                    adapter.assign(column, rhs)
                }
                SetOp::Increment(value) => {
                    adapter.assign_increment(column, adapter.value(value.clone()))
                }
                SetOp::Decrement(value) => {
                    adapter.assign_decrement(column, adapter.value(value.clone()))
                }
                SetOp::Multiply(value) => {
                    adapter.assign_multiply(column, adapter.value(value.clone()))
                }
                SetOp::Divide(value) => {
                    adapter.assign_divide(column, adapter.value(value.clone()))
                }
                SetOp::Push(value) => adapter.assign_push(column, value.clone()),
                SetOp::Unshift(value) => adapter.assign_unshift(column, value.clone()),
            };
            assignments.push(assignment);
        }
        Ok(assignments)
    }
}

/// Fills engine-side generator defaults (uuid/ulid/cuid/nanoid/now) for
/// absent columns. Literal defaults stay database-side.
pub fn fill_create_defaults(schema: &Schema, model: ModelId, scalars: &mut ScalarWrites) {
    let state = schema.model(model);
    for field in state.scalar_fields() {
        if scalars.contains_key(&field.name) {
            continue;
        }
        match &field.default {
            Some(DefaultValue::Literal(_)) | None => {}
            Some(generator) => {
                scalars.insert(field.name.clone(), generator.generate());
            }
        }
    }
}

/// Touches `updated_at`-tagged fields on update unless explicitly set.
pub fn touch_updated_at(schema: &Schema, model: ModelId, sets: &mut IndexMap<String, SetOp>) {
    let state = schema.model(model);
    for field in state.scalar_fields() {
        if matches!(field.default, Some(DefaultValue::UpdatedAt)) && !sets.contains_key(&field.name)
        {
            sets.insert(
                field.name.clone(),
                SetOp::Set(DefaultValue::UpdatedAt.generate()),
            );
        }
    }
}

/// Whether the declaring side of `relation` carries the foreign key.
///
/// Decides nested-create ordering: when the parent row holds the FK
/// (many-to-one, or the FK side of a one-to-one), the child must exist first.
pub fn holds_foreign_key(relation: &RelationState, target: &ModelState) -> bool {
    match relation.kind {
        RelationKind::ManyToOne => true,
        RelationKind::OneToMany | RelationKind::ManyToMany => false,
        RelationKind::OneToOne => {
            // The side whose link fields reference the other side's primary
            // key is the FK holder.
            let target_ids: Vec<&str> = target
                .id_fields()
                .iter()
                .map(|field| field.name.as_str())
                .collect();
            let refs: Vec<&str> = relation.ref_fields.iter().map(String::as_str).collect();
            refs == target_ids
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldState, RelationDef, Schema};

    fn schema() -> Schema {
        Schema::builder()
            .model("user", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(
                        FieldState::new("created_at", FieldKind::DateTime { timezone: true })
                            .default_value(DefaultValue::Now),
                    )
                    .field(
                        FieldState::new("updated_at", FieldKind::DateTime { timezone: true })
                            .default_value(DefaultValue::UpdatedAt),
                    )
                    .relation(RelationDef::one_to_one("profile", "profile", ["id"], ["user_id"]));
            })
            .model("profile", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("user_id", FieldKind::String).unique())
                    .relation(RelationDef::one_to_one("user", "user", ["user_id"], ["id"]));
            })
            .build()
            .unwrap()
    }

    #[test]
    fn generator_defaults_fill_missing_columns() {
        let schema = schema();
        let user = schema.model_id("user").unwrap();

        let mut scalars = ScalarWrites::new();
        scalars.insert("id".into(), Value::Text("u1".into()));
        fill_create_defaults(&schema, user, &mut scalars);
        assert!(scalars.contains_key("created_at"));
        assert!(scalars.contains_key("updated_at"));

        let mut sets = IndexMap::new();
        touch_updated_at(&schema, user, &mut sets);
        assert!(sets.contains_key("updated_at"));
    }

    #[test]
    fn one_to_one_fk_side_is_the_referencing_side() {
        let schema = schema();
        let user = schema.model_by_name("user").unwrap();
        let profile = schema.model_by_name("profile").unwrap();

        let user_profile = user.relation("profile").unwrap();
        assert!(!holds_foreign_key(user_profile, profile));

        let profile_user = profile.relation("user").unwrap();
        assert!(holds_foreign_key(profile_user, user));
    }
}
