//! Result parsing: raw driver rows into typed result trees.
//!
//! The adapter owns three middleware hooks (`parse_result`, `parse_relation`,
//! `parse_field`); their built-in behaviors live here so dialect overrides can
//! pre-transform a value and fall through to the defaults. The default walk
//! coerces every declared scalar through `parse_field`, decodes every declared
//! relation through `parse_relation` and recurses; columns outside the
//! projection are dropped.

use crate::adapter::SqlAdapter;
use crate::error::{Error, Result};
use crate::query::{Operation, Selection};
use crate::schema::{FieldKind, FieldState, ModelId, RelationKind, Schema};
use crate::value::Value;
use base64::Engine as _;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// A raw driver row: column name to raw value, in column order.
pub type Row = IndexMap<String, Value>;

/// One parsed result node.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Null,
    Scalar(Value),
    Record(Record),
    List(Vec<ResultValue>),
}

impl ResultValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ResultValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ResultValue::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ResultValue]> {
        match self {
            ResultValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// A parsed record: field/relation name to result node, in projection order.
pub type Record = IndexMap<String, ResultValue>;

/// The canonical key count results normalize to.
pub const RESULT_KEY: &str = "_result";

// =============================================================================
// Built-in middleware behaviors
// =============================================================================

/// Whole-result normalization: canonicalizes count column names (`count`,
/// `COUNT(*)`, any case-insensitive `count(...)` form) to [`RESULT_KEY`] and
/// narrows BigInt counts to plain integers.
pub fn builtin_result(mut rows: Vec<Row>, operation: Operation) -> Result<Vec<Row>> {
    match operation {
        Operation::Count | Operation::Exist => {
            for row in &mut rows {
                let key = row.keys().find(|k| is_count_column(k)).cloned();
                if let Some(key) = key {
                    if key != RESULT_KEY {
                        if let Some(value) = row.shift_remove(&key) {
                            row.insert(RESULT_KEY.to_string(), value);
                        }
                    }
                }
                if let Some(value) = row.get_mut(RESULT_KEY) {
                    normalize_count_value(value);
                }
            }
            Ok(rows)
        }
        Operation::Aggregate | Operation::GroupBy => {
            for row in &mut rows {
                for (key, value) in row.iter_mut() {
                    if key.starts_with("_count") {
                        normalize_count_value(value);
                    }
                }
            }
            Ok(rows)
        }
        _ => Ok(rows),
    }
}

fn is_count_column(name: &str) -> bool {
    if name == RESULT_KEY {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    lower == "count" || (lower.starts_with("count(") && lower.ends_with(')'))
}

/// COUNT comes back as int8 on PostgreSQL; counts always fit a plain integer.
fn normalize_count_value(value: &mut Value) {
    if let Value::BigInt(n) = value {
        if let Ok(narrow) = i64::try_from(*n) {
            *value = Value::Int(narrow);
        }
    }
    if let Value::Text(text) = value {
        if let Ok(n) = text.parse::<i64>() {
            *value = Value::Int(n);
        }
    }
}

/// Default relation-cell handling: NULL to-many cells become the empty array;
/// everything else must already be JSON. Dialects whose drivers deliver JSON
/// as text decode before delegating here.
pub fn builtin_relation(value: Value, kind: RelationKind) -> Result<Value> {
    match value {
        Value::Null if kind.is_to_many() => Ok(Value::Json(JsonValue::Array(Vec::new()))),
        Value::Null => Ok(Value::Null),
        Value::Json(json) => Ok(Value::Json(json)),
        Value::Text(text) => {
            let json: JsonValue = serde_json::from_str(&text)?;
            Ok(Value::Json(json))
        }
        other => Err(Error::Decode {
            column: "<relation>".into(),
            message: format!("expected JSON relation payload, got {}", other.type_name()),
        }),
    }
}

/// Default scalar coercion: restores a raw driver value to its field kind.
pub fn builtin_field(value: Value, field: &FieldState) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if field.array {
        return match value {
            Value::List(items) => coerce_list(items, field),
            Value::Text(text) => {
                let json: JsonValue = serde_json::from_str(&text)?;
                let JsonValue::Array(items) = json else {
                    return Err(decode_error(field, "expected a JSON array"));
                };
                coerce_list(items.into_iter().map(json_leaf_to_value).collect(), field)
            }
            Value::Json(JsonValue::Array(items)) => {
                coerce_list(items.into_iter().map(json_leaf_to_value).collect(), field)
            }
            other => Err(decode_error(
                field,
                &format!("expected an array, got {}", other.type_name()),
            )),
        };
    }
    coerce_scalar(value, field)
}

fn coerce_list(items: Vec<Value>, field: &FieldState) -> Result<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(coerce_scalar(item, field)?);
    }
    Ok(Value::List(out))
}

fn coerce_scalar(value: Value, field: &FieldState) -> Result<Value> {
    match (&field.kind, value) {
        (FieldKind::Boolean, Value::Int(n)) => Ok(Value::Bool(n != 0)),
        (FieldKind::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (FieldKind::BigInt, Value::Int(n)) => Ok(Value::BigInt(i128::from(n))),
        (FieldKind::BigInt, Value::BigInt(n)) => Ok(Value::BigInt(n)),
        (FieldKind::BigInt, Value::Text(text)) => text
            .trim()
            .parse::<i128>()
            .map(Value::BigInt)
            .map_err(|e| decode_error(field, &e.to_string())),
        (FieldKind::Decimal, Value::Decimal(d)) => Ok(Value::Decimal(d)),
        (FieldKind::Decimal, Value::Text(text)) => Decimal::from_str(text.trim())
            .map(Value::Decimal)
            .map_err(|e| decode_error(field, &e.to_string())),
        (FieldKind::Decimal, Value::Int(n)) => Ok(Value::Decimal(Decimal::from(n))),
        (FieldKind::Decimal, Value::Float(f)) => Decimal::try_from(f)
            .map(Value::Decimal)
            .map_err(|e| decode_error(field, &e.to_string())),
        (FieldKind::Int, Value::Int(n)) => Ok(Value::Int(n)),
        (FieldKind::Int, Value::BigInt(n)) => i64::try_from(n)
            .map(Value::Int)
            .map_err(|e| decode_error(field, &e.to_string())),
        (FieldKind::Int, Value::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| decode_error(field, &e.to_string())),
        (FieldKind::Float, Value::Float(f)) => Ok(Value::Float(f)),
        (FieldKind::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
        (FieldKind::DateTime { .. }, Value::DateTime(dt)) => Ok(Value::DateTime(dt)),
        (FieldKind::DateTime { .. }, Value::Text(text)) => parse_datetime(&text)
            .map(Value::DateTime)
            .ok_or_else(|| decode_error(field, "unrecognized datetime format")),
        (FieldKind::Date, Value::Date(d)) => Ok(Value::Date(d)),
        (FieldKind::Date, Value::Text(text)) => {
            chrono::NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| decode_error(field, &e.to_string()))
        }
        (FieldKind::Time, Value::Time(t)) => Ok(Value::Time(t)),
        (FieldKind::Time, Value::Text(text)) => parse_time(text.trim())
            .map(Value::Time)
            .ok_or_else(|| decode_error(field, "unrecognized time format")),
        (FieldKind::Json, Value::Json(json)) => Ok(Value::Json(json)),
        (FieldKind::Json, Value::Text(text)) => {
            Ok(Value::Json(serde_json::from_str(&text)?))
        }
        (FieldKind::Blob, Value::Bytes(bytes)) => Ok(Value::Bytes(bytes)),
        (FieldKind::Blob, Value::Text(text)) => base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map(Value::Bytes)
            .map_err(|e| decode_error(field, &e.to_string())),
        (FieldKind::String, Value::Text(text)) => Ok(Value::Text(text)),
        (FieldKind::Enum { .. }, Value::Text(text)) => Ok(Value::Text(text)),
        (FieldKind::Enum { .. }, Value::Enum(text)) => Ok(Value::Text(text)),
        (FieldKind::Vector { .. }, Value::Vector(v)) => Ok(Value::Vector(v)),
        (FieldKind::Vector { .. }, Value::Text(text)) => parse_vector(&text)
            .ok_or_else(|| decode_error(field, "unrecognized vector literal")),
        (FieldKind::Geometry, value) => Ok(value),
        // Anything else passes through untouched rather than guessing.
        (_, value) => Ok(value),
    }
}

fn decode_error(field: &FieldState, message: &str) -> Error {
    Error::Decode {
        column: field.name.clone(),
        message: message.to_string(),
    }
}

fn parse_datetime(text: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    // Driver formats without zone information are taken as UTC.
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    None
}

fn parse_time(text: &str) -> Option<chrono::NaiveTime> {
    for format in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
        if let Ok(t) = chrono::NaiveTime::parse_from_str(text, format) {
            return Some(t);
        }
    }
    None
}

fn parse_vector(text: &str) -> Option<Value> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Value::Vector(Vec::new()));
    }
    let mut out = Vec::new();
    for part in inner.split(',') {
        out.push(part.trim().parse::<f32>().ok()?);
    }
    Some(Value::Vector(out))
}

/// JSON leaf to raw value; kind-driven coercion happens in `parse_field`.
pub fn json_leaf_to_value(json: JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::BigInt(i128::from(u))
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => Value::Text(s),
        JsonValue::Array(items) => {
            Value::List(items.into_iter().map(json_leaf_to_value).collect())
        }
        object @ JsonValue::Object(_) => Value::Json(object),
    }
}

// =============================================================================
// The default tree walk
// =============================================================================

/// Walks rows into result trees for a find-family operation.
pub struct ResultParser<'a> {
    schema: &'a Schema,
    adapter: &'a dyn SqlAdapter,
}

impl<'a> ResultParser<'a> {
    pub fn new(schema: &'a Schema, adapter: &'a dyn SqlAdapter) -> Self {
        Self { schema, adapter }
    }

    /// Parses find/mutation-returning rows against a projection.
    pub fn parse_records(
        &self,
        model: ModelId,
        selection: &Selection,
        rows: Vec<Row>,
        operation: Operation,
    ) -> Result<Vec<Record>> {
        let rows = self.adapter.parse_result(rows, operation)?;
        rows.into_iter()
            .map(|row| self.parse_row(model, selection, row))
            .collect()
    }

    fn parse_row(&self, model: ModelId, selection: &Selection, mut row: Row) -> Result<Record> {
        let state = self.schema.model(model);
        let mut record = Record::new();

        let field_names: Vec<&FieldState> = match &selection.fields {
            Some(names) => names
                .iter()
                .map(|name| state.field(name))
                .collect::<Result<_>>()?,
            None => state.scalar_fields().collect(),
        };

        for field in field_names {
            let raw = row.shift_remove(&field.name).unwrap_or(Value::Null);
            let parsed = self.adapter.parse_field(raw, field)?;
            record.insert(
                field.name.clone(),
                if parsed.is_null() {
                    ResultValue::Null
                } else {
                    ResultValue::Scalar(parsed)
                },
            );
        }

        for (name, args) in &selection.relations {
            let relation = state.relation(name)?;
            let raw = row.shift_remove(name).unwrap_or(Value::Null);
            let decoded = self.adapter.parse_relation(raw, relation.kind)?;
            let node = self.parse_relation_node(relation.target, &args.selection, relation.kind, decoded)?;
            record.insert(name.clone(), node);
        }

        // Remaining columns are outside the projection and dropped.
        Ok(record)
    }

    fn parse_relation_node(
        &self,
        target: ModelId,
        selection: &Selection,
        kind: RelationKind,
        value: Value,
    ) -> Result<ResultValue> {
        match value {
            Value::Null => Ok(if kind.is_to_many() {
                ResultValue::List(Vec::new())
            } else {
                ResultValue::Null
            }),
            Value::Json(JsonValue::Null) => Ok(if kind.is_to_many() {
                ResultValue::List(Vec::new())
            } else {
                ResultValue::Null
            }),
            Value::Json(JsonValue::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let JsonValue::Object(map) = item else {
                        return Err(Error::Decode {
                            column: "<relation>".into(),
                            message: "expected a JSON object per related row".into(),
                        });
                    };
                    out.push(ResultValue::Record(
                        self.parse_json_record(target, selection, map)?,
                    ));
                }
                Ok(ResultValue::List(out))
            }
            Value::Json(JsonValue::Object(map)) => Ok(ResultValue::Record(
                self.parse_json_record(target, selection, map)?,
            )),
            other => Err(Error::Decode {
                column: "<relation>".into(),
                message: format!("unexpected relation payload: {}", other.type_name()),
            }),
        }
    }

    /// A related row materialized inside a JSON aggregate. Keys are field
    /// names (the adapter emits them that way), values are JSON leaves that
    /// still need kind-driven coercion.
    fn parse_json_record(
        &self,
        model: ModelId,
        selection: &Selection,
        mut map: serde_json::Map<String, JsonValue>,
    ) -> Result<Record> {
        let state = self.schema.model(model);
        let mut record = Record::new();

        let field_names: Vec<&FieldState> = match &selection.fields {
            Some(names) => names
                .iter()
                .map(|name| state.field(name))
                .collect::<Result<_>>()?,
            None => state.scalar_fields().collect(),
        };

        for field in field_names {
            let json = map.remove(&field.name).unwrap_or(JsonValue::Null);
            let raw = if matches!(field.kind, FieldKind::Json) && !field.array {
                Value::Json(json)
            } else {
                json_leaf_to_value(json)
            };
            let parsed = self.adapter.parse_field(raw, field)?;
            record.insert(
                field.name.clone(),
                if parsed.is_null() {
                    ResultValue::Null
                } else {
                    ResultValue::Scalar(parsed)
                },
            );
        }

        for (name, args) in &selection.relations {
            let relation = state.relation(name)?;
            let json = map.remove(name).unwrap_or(JsonValue::Null);
            let decoded = self.adapter.parse_relation(Value::Json(json), relation.kind)?;
            let node =
                self.parse_relation_node(relation.target, &args.selection, relation.kind, decoded)?;
            record.insert(name.clone(), node);
        }

        Ok(record)
    }

    /// `count` → a plain integer.
    pub fn parse_count(&self, rows: Vec<Row>) -> Result<i64> {
        let rows = self.adapter.parse_result(rows, Operation::Count)?;
        let row = rows.into_iter().next().ok_or_else(|| Error::Unexpected {
            context: "count query returned no rows".into(),
        })?;
        match row.get(RESULT_KEY) {
            Some(Value::Int(n)) => Ok(*n),
            Some(Value::BigInt(n)) => i64::try_from(*n).map_err(|_| Error::Unexpected {
                context: "count exceeds i64".into(),
            }),
            other => Err(Error::Unexpected {
                context: format!("count column missing or non-numeric: {other:?}"),
            }),
        }
    }

    /// `exist` → a boolean.
    pub fn parse_exist(&self, rows: Vec<Row>) -> Result<bool> {
        let rows = self.adapter.parse_result(rows, Operation::Exist)?;
        let row = rows.into_iter().next().ok_or_else(|| Error::Unexpected {
            context: "exist query returned no rows".into(),
        })?;
        match row.get(RESULT_KEY) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Int(n)) => Ok(*n != 0),
            other => Err(Error::Unexpected {
                context: format!("exist column missing or non-boolean: {other:?}"),
            }),
        }
    }

    /// `aggregate` → one record with `_count` / `_sum` / `_avg` / `_min` /
    /// `_max` buckets per the submitted selection.
    pub fn parse_aggregate(&self, model: ModelId, rows: Vec<Row>) -> Result<Record> {
        let rows = self.adapter.parse_result(rows, Operation::Aggregate)?;
        let row = rows.into_iter().next().unwrap_or_default();
        self.rewrap_aggregate_row(model, row, &[])
    }

    /// `group_by` → one record per group, group keys flat, aggregates
    /// bucketed.
    pub fn parse_group_by(
        &self,
        model: ModelId,
        by: &[String],
        rows: Vec<Row>,
    ) -> Result<Vec<Record>> {
        let rows = self.adapter.parse_result(rows, Operation::GroupBy)?;
        rows.into_iter()
            .map(|row| self.rewrap_aggregate_row(model, row, by))
            .collect()
    }

    /// Splits `_<fn>.<field>` aliases into nested buckets; other columns are
    /// group keys coerced through the field middleware.
    fn rewrap_aggregate_row(&self, model: ModelId, row: Row, by: &[String]) -> Result<Record> {
        let state = self.schema.model(model);
        let mut record = Record::new();

        for (key, value) in row {
            if let Some((bucket, target)) = split_aggregate_alias(&key) {
                let entry = record
                    .entry(bucket.to_string())
                    .or_insert_with(|| ResultValue::Record(Record::new()));
                let ResultValue::Record(bucket_map) = entry else {
                    unreachable!("aggregate bucket is always a record");
                };
                let parsed = if target == "_all" {
                    value
                } else {
                    match state.fields.get(target) {
                        Some(field) if bucket == "_min" || bucket == "_max" || bucket == "_sum" => {
                            self.adapter.parse_field(value, field)?
                        }
                        _ => value,
                    }
                };
                bucket_map.insert(
                    target.to_string(),
                    if parsed.is_null() {
                        ResultValue::Null
                    } else {
                        ResultValue::Scalar(parsed)
                    },
                );
            } else if by.iter().any(|b| b == &key) {
                let field = state.field(&key)?;
                let parsed = self.adapter.parse_field(value, field)?;
                record.insert(
                    key,
                    if parsed.is_null() {
                        ResultValue::Null
                    } else {
                        ResultValue::Scalar(parsed)
                    },
                );
            }
            // Anything else is outside the projection and dropped.
        }

        Ok(record)
    }
}

/// Splits an aggregate column alias `_sum.views` into `("_sum", "views")`.
fn split_aggregate_alias(name: &str) -> Option<(&str, &str)> {
    for bucket in ["_count", "_sum", "_avg", "_min", "_max"] {
        if let Some(rest) = name.strip_prefix(bucket) {
            if let Some(target) = rest.strip_prefix('.') {
                return Some((bucket, target));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_column_names_normalize() {
        assert!(is_count_column("COUNT(*)"));
        assert!(is_count_column("count"));
        assert!(is_count_column("count(DISTINCT id)"));
        assert!(is_count_column("_result"));
        assert!(!is_count_column("total"));
    }

    #[test]
    fn bigint_count_narrows() {
        let mut row = Row::new();
        row.insert("COUNT(*)".into(), Value::BigInt(42));
        let rows = builtin_result(vec![row], Operation::Count).unwrap();
        assert_eq!(rows[0].get(RESULT_KEY), Some(&Value::Int(42)));
    }

    #[test]
    fn to_many_null_becomes_empty_array() {
        let parsed = builtin_relation(Value::Null, RelationKind::OneToMany).unwrap();
        assert_eq!(parsed, Value::Json(JsonValue::Array(Vec::new())));
        let parsed = builtin_relation(Value::Null, RelationKind::ManyToOne).unwrap();
        assert_eq!(parsed, Value::Null);
    }

    #[test]
    fn bigint_text_restores_exactly() {
        let field = FieldState::new("views", FieldKind::BigInt);
        let parsed = builtin_field(Value::Text("9007199254740993".into()), &field).unwrap();
        assert_eq!(parsed, Value::BigInt(9_007_199_254_740_993));
    }

    #[test]
    fn sqlite_boolean_ints_coerce() {
        let field = FieldState::new("active", FieldKind::Boolean);
        assert_eq!(
            builtin_field(Value::Int(1), &field).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            builtin_field(Value::Int(0), &field).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn aggregate_alias_splitting() {
        assert_eq!(split_aggregate_alias("_sum.views"), Some(("_sum", "views")));
        assert_eq!(split_aggregate_alias("_count._all"), Some(("_count", "_all")));
        assert_eq!(split_aggregate_alias("title"), None);
    }
}
