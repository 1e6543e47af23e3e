//! MySQL DDL generation and type mapping.

use crate::adapter::MySqlAdapter;
use viborm_core::adapter::{DdlOp, SqlAdapter};
use viborm_core::error::{Error, Result};
use viborm_core::mutate::holds_foreign_key;
use viborm_core::schema::{DefaultValue, FieldKind, FieldState, ModelState, Schema};
use viborm_core::sql::Sql;
use viborm_core::value::Value;

pub(crate) fn generate(adapter: &MySqlAdapter, schema: &Schema, op: DdlOp<'_>) -> Result<Sql> {
    match op {
        DdlOp::CreateTable(model) => create_table(adapter, schema, model),
        DdlOp::DropTable(table) => Ok(Sql::raw(format!("DROP TABLE IF EXISTS {}", quoted(table)))),
        DdlOp::CreateIndex { model, index } => {
            let mut text = String::from("CREATE INDEX ");
            text.push_str(&quoted(&index.name));
            text.push_str(" ON ");
            text.push_str(&quoted(model.table_name()));
            text.push_str(" (");
            push_column_list(model, &index.fields, &mut text)?;
            text.push(')');
            Ok(Sql::raw(text))
        }
        // Enums are inline column types on MySQL; there is no type object to
        // create.
        DdlOp::CreateEnum { .. } => Ok(Sql::empty()),
    }
}

fn create_table(adapter: &MySqlAdapter, schema: &Schema, model: &ModelState) -> Result<Sql> {
    let mut lines = Vec::new();
    let single_id =
        model.primary_key.is_none() && model.fields.values().filter(|f| f.is_id).count() == 1;

    for field in model.scalar_fields() {
        let mut line = quoted(field.column_name());
        line.push(' ');
        if let FieldKind::Enum { values } = &field.kind {
            line.push_str(&adapter.enum_column_type(&field.name, values));
        } else {
            line.push_str(&column_type(field));
        }
        if !field.nullable {
            line.push_str(" NOT NULL");
        }
        if field.auto_increment {
            line.push_str(" AUTO_INCREMENT");
        }
        if let Some(default) = default_expression(field) {
            line.push_str(" DEFAULT ");
            line.push_str(&default.render(viborm_core::Dialect::MySQL).sql);
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

pub(crate) fn column_type(field: &FieldState) -> String {
    if field.array {
        // Arrays are JSON-backed on MySQL.
        return "JSON".to_string();
    }
    match &field.kind {
        // Indexable string default; long content belongs in TEXT via `map`.
        FieldKind::String => "VARCHAR(191)".to_string(),
        FieldKind::Int => "INT".to_string(),
        FieldKind::Float => "DOUBLE".to_string(),
        FieldKind::Decimal => "DECIMAL(65,30)".to_string(),
        FieldKind::BigInt => "BIGINT".to_string(),
        FieldKind::Boolean => "TINYINT(1)".to_string(),
        FieldKind::DateTime { .. } => "DATETIME(3)".to_string(),
        FieldKind::Date => "DATE".to_string(),
        FieldKind::Time => "TIME".to_string(),
        FieldKind::Json => "JSON".to_string(),
        FieldKind::Blob => "LONGBLOB".to_string(),
        FieldKind::Enum { .. } => "VARCHAR(191)".to_string(),
        FieldKind::Vector { .. } => "JSON".to_string(),
        FieldKind::Geometry => "GEOMETRY".to_string(),
    }
}

pub(crate) fn default_expression(field: &FieldState) -> Option<Sql> {
    match field.default.as_ref()? {
        DefaultValue::Literal(value) => literal_sql(value),
        DefaultValue::Now => Some(Sql::raw("CURRENT_TIMESTAMP(3)")),
        DefaultValue::Uuid
        | DefaultValue::Ulid
        | DefaultValue::Cuid
        | DefaultValue::Nanoid
        | DefaultValue::UpdatedAt => None,
    }
}

fn literal_sql(value: &Value) -> Option<Sql> {
    let text = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Int(n) => n.to_string(),
        Value::BigInt(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Text(s) | Value::Enum(s) => format!("'{}'", s.replace('\'', "''")),
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
    format!("`{}`", name.replace('`', "``"))
}
