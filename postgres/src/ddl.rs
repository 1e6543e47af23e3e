//! PostgreSQL DDL generation and type mapping.
//!
//! Enum fields map to a named enum type `<field>_enum`, created separately
//! via [`DdlOp::CreateEnum`].

use crate::adapter::PostgresAdapter;
use viborm_core::adapter::{DdlOp, SqlAdapter};
use viborm_core::error::{Error, Result};
use viborm_core::mutate::holds_foreign_key;
use viborm_core::schema::{DefaultValue, FieldKind, FieldState, ModelState, Schema};
use viborm_core::sql::Sql;
use viborm_core::value::Value;

pub(crate) fn generate(
    adapter: &PostgresAdapter,
    schema: &Schema,
    op: DdlOp<'_>,
) -> Result<Sql> {
    match op {
        DdlOp::CreateTable(model) => create_table(adapter, schema, model),
        DdlOp::DropTable(table) => Ok(Sql::raw(format!(
            "DROP TABLE IF EXISTS {} CASCADE",
            quoted(table)
        ))),
        DdlOp::CreateIndex { model, index } => {
            let mut text = String::from("CREATE INDEX ");
            text.push_str(&quoted(&index.name));
            text.push_str(" ON ");
            text.push_str(&quoted(model.table_name()));
            if let Some(method) = &index.index_type {
                text.push_str(" USING ");
                text.push_str(method);
            }
            text.push_str(" (");
            push_column_list(model, &index.fields, &mut text)?;
            text.push(')');
            Ok(Sql::raw(text))
        }
        DdlOp::CreateEnum { name, values } => {
            let mut text = String::from("CREATE TYPE ");
            text.push_str(&quoted(name));
            text.push_str(" AS ENUM (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    text.push_str(", ");
                }
                text.push_str(&quoted_literal(value));
            }
            text.push(')');
            Ok(Sql::raw(text))
        }
    }
}

fn create_table(
    adapter: &PostgresAdapter,
    schema: &Schema,
    model: &ModelState,
) -> Result<Sql> {
    let mut lines = Vec::new();
    let single_id = model.primary_key.is_none()
        && model.fields.values().filter(|f| f.is_id).count() == 1;

    for field in model.scalar_fields() {
        let mut line = quoted(field.column_name());
        line.push(' ');
        line.push_str(&column_type_for_table(adapter, field));
        if !field.nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = default_expression(field) {
            line.push_str(" DEFAULT ");
            line.push_str(&default.render(viborm_core::Dialect::PostgreSQL).sql);
        }
        if field.is_id && single_id {
            line.push_str(" PRIMARY KEY");
        } else if field.is_unique && !field.is_id {
            line.push_str(" UNIQUE");
        }
        lines.push(line);
    }

    if let Some(pk) = &model.primary_key {
        let mut line = String::from("PRIMARY KEY (");
        push_column_list(model, pk, &mut line)?;
        line.push(')');
        lines.push(line);
    }

    for unique in &model.uniques {
        let mut line = format!("CONSTRAINT {} UNIQUE (", quoted(&unique.name));
        push_column_list(model, &unique.fields, &mut line)?;
        line.push(')');
        lines.push(line);
    }

    for relation in model.relations.values() {
        let target = schema.model(relation.target);
        if !holds_foreign_key(relation, target) {
            continue;
        }
        let mut line = String::from("FOREIGN KEY (");
        push_column_list(model, &relation.on_fields, &mut line)?;
        line.push_str(") REFERENCES ");
        line.push_str(&quoted(target.table_name()));
        line.push_str(" (");
        push_column_list(target, &relation.ref_fields, &mut line)?;
        line.push(')');
        lines.push(line);
    }

    Ok(Sql::raw(format!(
        "CREATE TABLE {} ({})",
        quoted(model.table_name()),
        lines.join(", ")
    )))
}

/// The column type, with autoincrement integers widened to serials.
fn column_type_for_table(adapter: &PostgresAdapter, field: &FieldState) -> String {
    if field.auto_increment {
        return match field.kind {
            FieldKind::BigInt => "BIGSERIAL".to_string(),
            _ => "SERIAL".to_string(),
        };
    }
    column_type(adapter, field)
}

pub(crate) fn column_type(adapter: &PostgresAdapter, field: &FieldState) -> String {
    let base = match &field.kind {
        FieldKind::String => "TEXT".to_string(),
        FieldKind::Int => "INTEGER".to_string(),
        FieldKind::Float => "DOUBLE PRECISION".to_string(),
        FieldKind::Decimal => "NUMERIC(65,30)".to_string(),
        FieldKind::BigInt => "BIGINT".to_string(),
        FieldKind::Boolean => "BOOLEAN".to_string(),
        FieldKind::DateTime { timezone: true } => "TIMESTAMPTZ".to_string(),
        FieldKind::DateTime { timezone: false } => "TIMESTAMP".to_string(),
        FieldKind::Date => "DATE".to_string(),
        FieldKind::Time => "TIME".to_string(),
        FieldKind::Json => "JSONB".to_string(),
        FieldKind::Blob => "BYTEA".to_string(),
        FieldKind::Enum { values } => {
            adapter.enum_column_type(&format!("{}_enum", field.name), values)
        }
        FieldKind::Vector { dimensions } => format!("vector({dimensions})"),
        FieldKind::Geometry => "geometry".to_string(),
    };
    if field.array {
        format!("{base}[]")
    } else {
        base
    }
}

/// Database-side defaults. Engine-generated defaults (ulid/cuid/nanoid,
/// updated_at) return None and are filled at write time.
pub(crate) fn default_expression(field: &FieldState) -> Option<Sql> {
    match field.default.as_ref()? {
        DefaultValue::Literal(value) => literal_sql(value),
        DefaultValue::Now => Some(Sql::raw("CURRENT_TIMESTAMP")),
        DefaultValue::Uuid => Some(Sql::raw("gen_random_uuid()")),
        DefaultValue::Ulid
        | DefaultValue::Cuid
        | DefaultValue::Nanoid
        | DefaultValue::UpdatedAt => None,
    }
}

/// DDL carries no bind parameters; literals render inline.
fn literal_sql(value: &Value) -> Option<Sql> {
    let text = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(n) => n.to_string(),
        Value::BigInt(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Text(s) | Value::Enum(s) => quoted_literal(s),
        Value::Json(json) => format!("{}::jsonb", quoted_literal(&json.to_string())),
        _ => return None,
    };
    Some(Sql::raw(text))
}

fn push_column_list(model: &ModelState, fields: &[String], out: &mut String) -> Result<()> {
    for (i, name) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let field = model.fields.get(name).ok_or_else(|| Error::UnknownField {
            model: model.name.clone(),
            field: name.clone(),
        })?;
        out.push_str(&quoted(field.column_name()));
    }
    Ok(())
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use viborm_core::schema::RelationDef;

    #[test]
    fn create_table_carries_pk_fk_and_defaults() {
        let schema = Schema::builder()
            .model("user", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .relation(RelationDef::one_to_many("posts", "post", ["id"], ["author_id"]));
            })
            .model("post", |m| {
                m.field(FieldState::new("id", FieldKind::String).id())
                    .field(FieldState::new("views", FieldKind::BigInt).default_value(
                        DefaultValue::Literal(Value::Int(0)),
                    ))
                    .field(FieldState::new("author_id", FieldKind::String))
                    .relation(RelationDef::many_to_one("author", "user", ["author_id"], ["id"]));
            })
            .build()
            .unwrap();
        let adapter = PostgresAdapter::new();
        let post = schema.model_by_name("post").unwrap();
        let ddl = generate(&adapter, &schema, DdlOp::CreateTable(post)).unwrap();
        let text = ddl.render(viborm_core::Dialect::PostgreSQL).sql;
        assert!(text.contains("\"views\" BIGINT NOT NULL DEFAULT 0"));
        assert!(text.contains("\"id\" TEXT NOT NULL PRIMARY KEY"));
        assert!(text.contains(
            "FOREIGN KEY (\"author_id\") REFERENCES \"user\" (\"id\")"
        ));
    }
}
