//! Result parsing: middleware coercions, deep relation trees, aggregate and
//! group-by rewrapping.

mod common;

use common::{blog_schema, row};
use viborm::query::{Operation, RelationArgs, Selection};
use viborm::{Record, ResultValue, Value};
use viborm_core::parse::ResultParser;
use viborm_mysql::MySqlAdapter;
use viborm_sqlite::SqliteAdapter;

fn scalar(value: impl Into<Value>) -> ResultValue {
    ResultValue::Scalar(value.into())
}

#[test]
fn sqlite_rows_coerce_field_kinds() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    // SQLite delivers BigInt columns as INTEGER (i64) and everything
    // structured as TEXT.
    let rows = vec![row([
        ("id", Value::Text("p1".into())),
        ("title", Value::Text("A".into())),
        ("views", Value::Int(42)),
        ("author_id", Value::Text("u1".into())),
    ])];
    let records = parser
        .parse_records(post, &Selection::all_scalars(), rows, Operation::FindMany)
        .unwrap();
    assert_eq!(
        records[0].get("views"),
        Some(&ResultValue::Scalar(Value::BigInt(42)))
    );
}

#[test]
fn relation_json_strings_decode_on_sqlite() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let user = schema.model_id("user").unwrap();

    let selection =
        Selection::all_scalars().with_relation("posts", RelationArgs::all());
    // The JSON aggregate arrives as a string column.
    let rows = vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("a@d.io".into())),
        ("name", Value::Null),
        (
            "posts",
            Value::Text(
                r#"[{"id":"p1","title":"A","views":"9007199254740993","author_id":"u1"}]"#.into(),
            ),
        ),
    ])];

    let records = parser
        .parse_records(user, &selection, rows, Operation::FindMany)
        .unwrap();
    let posts = records[0].get("posts").unwrap().as_list().unwrap();
    let first = posts[0].as_record().unwrap();
    assert_eq!(first.get("title"), Some(&scalar("A")));
    assert_eq!(
        first.get("views"),
        Some(&ResultValue::Scalar(Value::BigInt(9_007_199_254_740_993)))
    );
}

#[test]
fn deep_tree_with_mixed_cardinalities() {
    let schema = blog_schema();
    let adapter = MySqlAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let user = schema.model_id("user").unwrap();

    let mut post_args = RelationArgs::all();
    post_args.selection = Selection::all_scalars()
        .with_relation("comments", RelationArgs::all())
        .with_relation("tags", RelationArgs::all());
    let selection = Selection::all_scalars().with_relation("posts", post_args);

    let payload = serde_json::json!([
        {
            "id": "p1", "title": "A", "views": "1", "author_id": "u1",
            "comments": [
                {"id": "c1", "body": "hi", "post_id": "p1"},
                {"id": "c2", "body": "yo", "post_id": "p1"},
            ],
            "tags": [
                {"id": "t1", "label": "rust"},
                {"id": "t2", "label": "sql"},
            ],
        },
        {
            "id": "p2", "title": "B", "views": "2", "author_id": "u1",
            "comments": [],
            "tags": [],
        },
    ]);
    let rows = vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("a@d.io".into())),
        ("name", Value::Text("Ann".into())),
        ("posts", Value::Text(payload.to_string())),
    ])];

    let records = parser
        .parse_records(user, &selection, rows, Operation::FindMany)
        .unwrap();
    let posts = records[0].get("posts").unwrap().as_list().unwrap();
    assert_eq!(posts.len(), 2);

    let p1 = posts[0].as_record().unwrap();
    assert_eq!(p1.get("comments").unwrap().as_list().unwrap().len(), 2);
    assert_eq!(p1.get("tags").unwrap().as_list().unwrap().len(), 2);

    let p2 = posts[1].as_record().unwrap();
    assert_eq!(p2.get("comments"), Some(&ResultValue::List(Vec::new())));
    assert_eq!(p2.get("tags"), Some(&ResultValue::List(Vec::new())));
}

#[test]
fn to_one_relation_is_an_object_or_null() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let selection = Selection::all_scalars().with_relation("author", RelationArgs::all());
    let rows = vec![
        row([
            ("id", Value::Text("p1".into())),
            ("title", Value::Text("A".into())),
            ("views", Value::Int(1)),
            ("author_id", Value::Text("u1".into())),
            (
                "author",
                Value::Text(r#"{"id":"u1","email":"a@d.io","name":null}"#.into()),
            ),
        ]),
        row([
            ("id", Value::Text("p2".into())),
            ("title", Value::Text("B".into())),
            ("views", Value::Int(2)),
            ("author_id", Value::Text("u9".into())),
            ("author", Value::Null),
        ]),
    ];

    let records = parser
        .parse_records(post, &selection, rows, Operation::FindMany)
        .unwrap();
    assert!(records[0].get("author").unwrap().as_record().is_some());
    assert_eq!(records[1].get("author"), Some(&ResultValue::Null));
}

#[test]
fn unknown_columns_are_dropped() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let user = schema.model_id("user").unwrap();

    let rows = vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("a@d.io".into())),
        ("name", Value::Null),
        ("__rn", Value::Int(1)),
    ])];
    let records = parser
        .parse_records(user, &Selection::all_scalars(), rows, Operation::FindMany)
        .unwrap();
    assert!(records[0].get("__rn").is_none());
    assert_eq!(records[0].len(), 3);
}

#[test]
fn aggregate_rows_rewrap_into_buckets() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let rows = vec![row([
        ("_count._all", Value::Int(10)),
        ("_sum.views", Value::Int(1234)),
        ("_max.views", Value::Int(1000)),
    ])];
    let record = parser.parse_aggregate(post, rows).unwrap();

    let count = record.get("_count").unwrap().as_record().unwrap();
    assert_eq!(count.get("_all"), Some(&scalar(10)));
    let sum = record.get("_sum").unwrap().as_record().unwrap();
    assert_eq!(
        sum.get("views"),
        Some(&ResultValue::Scalar(Value::BigInt(1234)))
    );
}

#[test]
fn group_by_rows_keep_keys_flat_and_buckets_nested() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let rows = vec![
        row([
            ("author_id", Value::Text("u1".into())),
            ("_count._all", Value::Int(2)),
        ]),
        row([
            ("author_id", Value::Text("u2".into())),
            ("_count._all", Value::Int(1)),
        ]),
    ];
    let records = parser
        .parse_group_by(post, &["author_id".to_string()], rows)
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("author_id"), Some(&scalar("u1")));
    let count = records[0].get("_count").unwrap().as_record().unwrap();
    assert_eq!(count.get("_all"), Some(&scalar(2)));
}

#[test]
fn records_preserve_projection_order() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let user = schema.model_id("user").unwrap();

    let rows = vec![row([
        // Driver column order differs from the declared field order.
        ("name", Value::Text("Ann".into())),
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("a@d.io".into())),
    ])];
    let records = parser
        .parse_records(user, &Selection::all_scalars(), rows, Operation::FindMany)
        .unwrap();
    let keys: Vec<&str> = records[0].keys().map(String::as_str).collect();
    assert_eq!(keys, ["id", "email", "name"]);
}

#[test]
fn aggregate_empty_set_yields_an_empty_record() {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();
    let parser = ResultParser::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();
    let record: Record = parser.parse_aggregate(post, Vec::new()).unwrap();
    assert!(record.is_empty());
}
