//! Cache key derivation.
//!
//! Keys are `viborm[:v<version>]:<model>:<operation>:<hash16>`, where the
//! hash covers a canonical encoding of the operation arguments: stable field
//! order, sorted map keys, ISO-8601 timestamps, `<n>n` BigInt, `base64:`
//! bytes. Two argument trees produce the same key iff their canonical
//! encodings match.

use sha2::{Digest, Sha256};
use viborm_core::query::{
    AggregateSelection, Filter, FindArgs, OrderBy, OrderByTarget, Operation, RelationFilter,
    ScalarFilter, Selection,
};
use viborm_core::value::Value;

pub const KEY_PREFIX: &str = "viborm";

/// Suffix of the single-flight revalidation sentinel.
pub const REVALIDATING_SUFFIX: &str = ":reval";

pub fn cache_key(
    version: Option<u32>,
    model: &str,
    operation: Operation,
    canonical_args: &str,
) -> String {
    let mut key = String::from(KEY_PREFIX);
    if let Some(version) = version {
        key.push_str(&format!(":v{version}"));
    }
    key.push(':');
    key.push_str(model);
    key.push(':');
    key.push_str(operation.name());
    key.push(':');
    key.push_str(&hash16(canonical_args));
    key
}

/// The invalidation prefix covering every cached read of a model.
pub fn model_prefix(version: Option<u32>, model: &str) -> String {
    let mut prefix = String::from(KEY_PREFIX);
    if let Some(version) = version {
        prefix.push_str(&format!(":v{version}"));
    }
    prefix.push(':');
    prefix.push_str(model);
    prefix.push(':');
    prefix
}

/// First 16 hex characters of a SHA-256 digest.
fn hash16(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// =============================================================================
// Canonical argument encoding
// =============================================================================

pub fn canonical_find_args(args: &FindArgs) -> String {
    let mut out = String::from("{");
    out.push_str("\"distinct\":");
    encode_str_list(&args.distinct, &mut out);
    out.push_str(",\"order\":");
    encode_order(&args.order_by, &mut out);
    out.push_str(",\"select\":");
    match &args.select {
        Some(selection) => encode_selection(selection, &mut out),
        None => out.push_str("null"),
    }
    out.push_str(",\"include\":");
    encode_relation_map(&args.include, &mut out);
    out.push_str(",\"skip\":");
    encode_opt_num(args.skip.map(|n| n as i64), &mut out);
    out.push_str(",\"take\":");
    encode_opt_num(args.take, &mut out);
    out.push_str(",\"where\":");
    match &args.filter {
        Some(filter) => encode_filter(filter, &mut out),
        None => out.push_str("null"),
    }
    out.push('}');
    out
}

pub fn canonical_count_args(
    filter: Option<&Filter>,
    take: Option<i64>,
    skip: Option<u64>,
) -> String {
    let mut out = String::from("{");
    out.push_str("\"skip\":");
    encode_opt_num(skip.map(|n| n as i64), &mut out);
    out.push_str(",\"take\":");
    encode_opt_num(take, &mut out);
    out.push_str(",\"where\":");
    match filter {
        Some(filter) => encode_filter(filter, &mut out),
        None => out.push_str("null"),
    }
    out.push('}');
    out
}

pub fn canonical_aggregate_args(
    filter: Option<&Filter>,
    selection: &AggregateSelection,
) -> String {
    let mut out = String::from("{");
    out.push_str("\"avg\":");
    encode_str_list(&selection.avg, &mut out);
    out.push_str(",\"count\":");
    encode_str_list(&selection.count, &mut out);
    out.push_str(&format!(",\"count_all\":{}", selection.count_all));
    out.push_str(",\"max\":");
    encode_str_list(&selection.max, &mut out);
    out.push_str(",\"min\":");
    encode_str_list(&selection.min, &mut out);
    out.push_str(",\"sum\":");
    encode_str_list(&selection.sum, &mut out);
    out.push_str(",\"where\":");
    match filter {
        Some(filter) => encode_filter(filter, &mut out),
        None => out.push_str("null"),
    }
    out.push('}');
    out
}

pub fn canonical_group_by_args(args: &viborm_core::query::GroupByArgs) -> String {
    let mut out = String::from("{");
    out.push_str("\"by\":");
    encode_str_list(&args.by, &mut out);
    out.push_str(",\"having\":[");
    for (i, term) in args.having.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("{\"agg\":");
        encode_str(term.aggregate.name(), &mut out);
        out.push_str(",\"field\":");
        match &term.field {
            Some(field) => encode_str(field, &mut out),
            None => out.push_str("null"),
        }
        out.push('}');
    }
    out.push_str("],\"order\":");
    encode_order(&args.order_by, &mut out);
    out.push_str(",\"select\":");
    let selection = canonical_aggregate_args(args.filter.as_ref(), &args.selection);
    out.push_str(&selection);
    out.push_str(",\"skip\":");
    encode_opt_num(args.skip.map(|n| n as i64), &mut out);
    out.push_str(",\"take\":");
    encode_opt_num(args.take, &mut out);
    out.push('}');
    out
}

fn encode_opt_num(value: Option<i64>, out: &mut String) {
    match value {
        Some(n) => out.push_str(&n.to_string()),
        None => out.push_str("null"),
    }
}

fn encode_str(text: &str, out: &mut String) {
    match serde_json::to_string(text) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}

fn encode_str_list(items: &[String], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_str(item, out);
    }
    out.push(']');
}

fn encode_value(value: &Value, out: &mut String) {
    value.canonical_encode(out);
}

fn encode_value_list(items: &[Value], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_value(item, out);
    }
    out.push(']');
}

pub(crate) fn encode_filter(filter: &Filter, out: &mut String) {
    match filter {
        Filter::And(filters) => {
            out.push_str("{\"AND\":[");
            for (i, inner) in filters.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_filter(inner, out);
            }
            out.push_str("]}");
        }
        Filter::Or(filters) => {
            out.push_str("{\"OR\":[");
            for (i, inner) in filters.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_filter(inner, out);
            }
            out.push_str("]}");
        }
        Filter::Not(inner) => {
            out.push_str("{\"NOT\":");
            encode_filter(inner, out);
            out.push('}');
        }
        Filter::Scalar { field, condition } => {
            out.push('{');
            encode_str(field, out);
            out.push(':');
            encode_scalar_filter(condition, out);
            out.push('}');
        }
        Filter::Relation {
            relation,
            condition,
        } => {
            out.push('{');
            encode_str(relation, out);
            out.push(':');
            encode_relation_filter(condition, out);
            out.push('}');
        }
    }
}

fn encode_scalar_filter(condition: &ScalarFilter, out: &mut String) {
    let (tag, body): (&str, Box<dyn Fn(&mut String) + '_>) = match condition {
        ScalarFilter::Equals(v) => ("equals", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::NotEquals(v) => ("not", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::In(vs) => ("in", Box::new(move |o| encode_value_list(vs, o))),
        ScalarFilter::NotIn(vs) => ("notIn", Box::new(move |o| encode_value_list(vs, o))),
        ScalarFilter::Lt(v) => ("lt", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::Lte(v) => ("lte", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::Gt(v) => ("gt", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::Gte(v) => ("gte", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::Between(low, high) => (
            "between",
            Box::new(move |o| {
                o.push('[');
                encode_value(low, o);
                o.push(',');
                encode_value(high, o);
                o.push(']');
            }),
        ),
        ScalarFilter::Contains { value, mode } => {
            let value = value.clone();
            let insensitive = matches!(mode, viborm_core::query::QueryMode::Insensitive);
            (
                "contains",
                Box::new(move |o| {
                    encode_str(&value, o);
                    if insensitive {
                        o.push_str(",\"mode\":\"insensitive\"");
                    }
                }),
            )
        }
        ScalarFilter::StartsWith { value, .. } => {
            let value = value.clone();
            ("startsWith", Box::new(move |o| encode_str(&value, o)))
        }
        ScalarFilter::EndsWith { value, .. } => {
            let value = value.clone();
            ("endsWith", Box::new(move |o| encode_str(&value, o)))
        }
        ScalarFilter::IsNull(flag) => {
            let flag = *flag;
            ("isNull", Box::new(move |o| o.push_str(if flag { "true" } else { "false" })))
        }
        ScalarFilter::Has(v) => ("has", Box::new(move |o| encode_value(v, o))),
        ScalarFilter::HasEvery(vs) => ("hasEvery", Box::new(move |o| encode_value_list(vs, o))),
        ScalarFilter::HasSome(vs) => ("hasSome", Box::new(move |o| encode_value_list(vs, o))),
        ScalarFilter::IsEmpty(flag) => {
            let flag = *flag;
            ("isEmpty", Box::new(move |o| o.push_str(if flag { "true" } else { "false" })))
        }
        ScalarFilter::JsonPath { path, condition } => {
            let path = path.clone();
            let condition = condition.clone();
            (
                "path",
                Box::new(move |o| {
                    encode_str_list(&path, o);
                    o.push(',');
                    encode_scalar_filter(&condition, o);
                }),
            )
        }
        ScalarFilter::Geo(op, v) => {
            let op = format!("{op:?}");
            (
                "geo",
                Box::new(move |o| {
                    encode_str(&op, o);
                    o.push(',');
                    encode_value(v, o);
                }),
            )
        }
    };
    out.push_str("{\"");
    out.push_str(tag);
    out.push_str("\":");
    body(out);
    out.push('}');
}

fn encode_relation_filter(condition: &RelationFilter, out: &mut String) {
    let (tag, inner) = match condition {
        RelationFilter::Some(filter) => ("some", Some(filter)),
        RelationFilter::Every(filter) => ("every", Some(filter)),
        RelationFilter::None(filter) => ("none", Some(filter)),
        RelationFilter::Is(filter) => ("is", filter.as_ref()),
        RelationFilter::IsNot(filter) => ("isNot", filter.as_ref()),
    };
    out.push_str("{\"");
    out.push_str(tag);
    out.push_str("\":");
    match inner {
        Some(filter) => encode_filter(filter, out),
        None => out.push_str("null"),
    }
    out.push('}');
}

fn encode_order(order_by: &[OrderBy], out: &mut String) {
    out.push('[');
    for (i, term) in order_by.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('{');
        match &term.target {
            OrderByTarget::Field(name) => encode_str(name, out),
            OrderByTarget::RelationField { relation, field } => {
                encode_str(&format!("{relation}.{field}"), out)
            }
            OrderByTarget::RelationCount { relation } => {
                encode_str(&format!("{relation}._count"), out)
            }
        }
        out.push(':');
        out.push_str(match term.direction {
            viborm_core::query::SortOrder::Asc => "\"asc\"",
            viborm_core::query::SortOrder::Desc => "\"desc\"",
        });
        out.push('}');
    }
    out.push(']');
}

fn encode_selection(selection: &Selection, out: &mut String) {
    out.push('{');
    out.push_str("\"fields\":");
    match &selection.fields {
        Some(fields) => {
            let mut sorted = fields.clone();
            sorted.sort();
            encode_str_list(&sorted, out);
        }
        None => out.push_str("null"),
    }
    out.push_str(",\"relations\":");
    encode_relation_map(&selection.relations, out);
    out.push('}');
}

fn encode_relation_map(
    relations: &indexmap::IndexMap<String, viborm_core::query::RelationArgs>,
    out: &mut String,
) {
    let mut names: Vec<&String> = relations.keys().collect();
    names.sort();
    out.push('{');
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_str(name, out);
        out.push_str(":{\"order\":");
        let args = &relations[name.as_str()];
        encode_order(&args.order_by, out);
        out.push_str(",\"select\":");
        encode_selection(&args.selection, out);
        out.push_str(",\"skip\":");
        encode_opt_num(args.skip.map(|n| n as i64), out);
        out.push_str(",\"take\":");
        encode_opt_num(args.take, out);
        out.push_str(",\"where\":");
        match &args.filter {
            Some(filter) => encode_filter(filter, out),
            None => out.push_str("null"),
        }
        out.push('}');
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use viborm_core::query::Filter;

    #[test]
    fn identical_args_produce_identical_keys() {
        let a = FindArgs::filtered(Filter::equals("id", "u1"));
        let b = FindArgs::filtered(Filter::equals("id", "u1"));
        assert_eq!(
            cache_key(None, "user", Operation::FindMany, &canonical_find_args(&a)),
            cache_key(None, "user", Operation::FindMany, &canonical_find_args(&b)),
        );
    }

    #[test]
    fn different_args_produce_different_keys() {
        let a = FindArgs::filtered(Filter::equals("id", "u1"));
        let b = FindArgs::filtered(Filter::equals("id", "u2"));
        assert_ne!(
            cache_key(None, "user", Operation::FindMany, &canonical_find_args(&a)),
            cache_key(None, "user", Operation::FindMany, &canonical_find_args(&b)),
        );
    }

    #[test]
    fn key_shape_and_version() {
        let args = FindArgs::default();
        let key = cache_key(Some(2), "user", Operation::Count, &canonical_find_args(&args));
        assert!(key.starts_with("viborm:v2:user:count:"));
        assert_eq!(key.rsplit(':').next().unwrap().len(), 16);
    }

    #[test]
    fn bigint_args_encode_with_suffix() {
        let args = FindArgs::filtered(Filter::equals("views", Value::BigInt(9007199254740993)));
        let canonical = canonical_find_args(&args);
        assert!(canonical.contains("9007199254740993n"));
    }
}
