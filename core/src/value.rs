//! Runtime SQL values.
//!
//! Every parameter bound into a query and every raw cell coming back from a
//! driver is a [`Value`]. Wide numeric types keep their exact representation:
//! `BigInt` is backed by `i128`, `Decimal` by `rust_decimal::Decimal`, so no
//! precision is lost between the payload and the wire.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// A runtime SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    BigInt(i128),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(JsonValue),
    Uuid(Uuid),
    Enum(String),
    List(Vec<Value>),
    Vector(Vec<f32>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Stable name of the value's runtime type, for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::BigInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Converts to a `serde_json::Value` for JSON literal emission.
    ///
    /// `BigInt` and `Decimal` become strings: JSON numbers are doubles on the
    /// wire and would silently round anything past 2^53.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(n) => JsonValue::from(*n),
            Value::BigInt(n) => JsonValue::String(n.to_string()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Decimal(d) => JsonValue::String(d.to_string()),
            Value::Text(s) | Value::Enum(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => {
                use base64::Engine;
                JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::DateTime(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => JsonValue::String(t.format("%H:%M:%S%.3f").to_string()),
            Value::Json(j) => j.clone(),
            Value::Uuid(u) => JsonValue::String(u.to_string()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Vector(v) => JsonValue::Array(
                v.iter()
                    .map(|f| {
                        serde_json::Number::from_f64(f64::from(*f))
                            .map(JsonValue::Number)
                            .unwrap_or(JsonValue::Null)
                    })
                    .collect(),
            ),
        }
    }

    /// Appends the canonical cache-key encoding of this value.
    ///
    /// The encoding is total and deterministic: JSON object keys are sorted,
    /// timestamps are ISO-8601, BigInt carries an `n` suffix, bytes a
    /// `base64:` prefix. Two values encode identically iff they would hash
    /// identically.
    pub fn canonical_encode(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::BigInt(n) => {
                let _ = write!(out, "{n}n");
            }
            Value::Float(f) => {
                let _ = write!(out, "{f}");
            }
            Value::Decimal(d) => {
                let _ = write!(out, "{d}");
            }
            Value::Text(s) | Value::Enum(s) => encode_json_string(s, out),
            Value::Bytes(b) => {
                use base64::Engine;
                out.push_str("\"base64:");
                out.push_str(&base64::engine::general_purpose::STANDARD.encode(b));
                out.push('"');
            }
            Value::DateTime(dt) => {
                out.push('"');
                out.push_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true));
                out.push('"');
            }
            Value::Date(d) => {
                let _ = write!(out, "\"{}\"", d.format("%Y-%m-%d"));
            }
            Value::Time(t) => {
                let _ = write!(out, "\"{}\"", t.format("%H:%M:%S%.3f"));
            }
            Value::Json(j) => encode_json_canonical(j, out),
            Value::Uuid(u) => {
                let _ = write!(out, "\"{u}\"");
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.canonical_encode(out);
                }
                out.push(']');
            }
            Value::Vector(v) => {
                out.push('[');
                for (i, f) in v.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{f}");
                }
                out.push(']');
            }
        }
    }
}

/// Canonical JSON encoding with sorted object keys.
pub fn encode_json_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Number(n) => out.push_str(&n.to_string()),
        JsonValue::String(s) => encode_json_string(s, out),
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_json_canonical(item, out);
            }
            out.push(']');
        }
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_json_string(key, out);
                out.push(':');
                encode_json_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn encode_json_string(s: &str, out: &mut String) {
    // serde_json's escaping rules, so the canonical form is valid JSON.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) | Value::Enum(s) => write!(f, "'{s}'"),
            other => {
                let mut buf = String::new();
                other.canonical_encode(&mut buf);
                f.write_str(&buf)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::BigInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::BigInt(i128::from(v)),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<chrono::Utc>> for Value {
    fn from(v: DateTime<chrono::Utc>) -> Self {
        Value::DateTime(v.fixed_offset())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_keeps_precision_past_safe_integers() {
        let v = Value::BigInt(9_007_199_254_740_993);
        let mut out = String::new();
        v.canonical_encode(&mut out);
        assert_eq!(out, "9007199254740993n");
        assert_eq!(v.to_json(), JsonValue::String("9007199254740993".into()));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let json = serde_json::json!({"b": 1, "a": {"z": true, "c": null}});
        let mut out = String::new();
        encode_json_canonical(&json, &mut out);
        assert_eq!(out, r#"{"a":{"c":null,"z":true},"b":1}"#);
    }

    #[test]
    fn u64_overflow_promotes_to_bigint() {
        assert_eq!(Value::from(u64::MAX), Value::BigInt(i128::from(u64::MAX)));
        assert_eq!(Value::from(7u64), Value::Int(7));
    }
}
