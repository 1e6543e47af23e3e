//! End-to-end engine behavior over a scripted driver: statement sequencing,
//! FK chaining for nested writes, count normalization, result shaping.

mod common;

use common::{blog_schema, row, StubDriver, WireEvent};
use std::sync::Arc;
use viborm::prelude::*;
use viborm::{Dialect, ResultValue};

fn client(driver: StubDriver) -> Client<StubDriver> {
    Client::new(
        driver,
        blog_schema(),
        Arc::new(viborm_postgres::PostgresAdapter::new()),
    )
}

#[tokio::test]
async fn nested_create_many_injects_the_parent_fk() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    // INSERT .. RETURNING the created user.
    driver.respond_rows(vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("j@d.io".into())),
        ("name", Value::Text("John".into())),
    ])]);
    // Batch post INSERT.
    driver.respond_affected(2);

    let client = client(driver);
    let created = client
        .model("user")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new()
                .set("id", "u1")
                .set("email", "j@d.io")
                .set("name", "John")
                .nested(
                    "posts",
                    NestedCreate::create_many(
                        [
                            [
                                ("id".to_string(), Value::Text("p1".into())),
                                ("title".to_string(), Value::Text("A".into())),
                                ("views".to_string(), Value::BigInt(0)),
                            ]
                            .into_iter()
                            .collect(),
                            [
                                ("id".to_string(), Value::Text("p2".into())),
                                ("title".to_string(), Value::Text("B".into())),
                                ("views".to_string(), Value::BigInt(0)),
                            ]
                            .into_iter()
                            .collect(),
                        ],
                        false,
                    ),
                ),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    assert_eq!(
        created.get("id"),
        Some(&ResultValue::Scalar(Value::Text("u1".into())))
    );

    // Multi-statement plan ran inside one transaction, parent before child.
    let events = client_events(&client);
    assert!(matches!(events.first(), Some(WireEvent::Begin)));
    assert!(matches!(events.last(), Some(WireEvent::Commit)));

    let statements = client_statements(&client);
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("INSERT INTO \"user\""));
    assert!(statements[0].contains("RETURNING"));
    assert!(statements[1].starts_with("INSERT INTO \"post\""));

    // Both child rows carry the parent id.
    let params = client_params(&client, 1);
    let fk_count = params
        .iter()
        .filter(|value| **value == Value::Text("u1".into()))
        .count();
    assert_eq!(fk_count, 2);
}

#[tokio::test]
async fn many_to_one_create_resolves_the_child_first() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    // 1: INSERT user (the author) RETURNING.
    driver.respond_rows(vec![row([
        ("id", Value::Text("u9".into())),
        ("email", Value::Text("z@d.io".into())),
        ("name", Value::Null),
    ])]);
    // 2: INSERT post RETURNING.
    driver.respond_rows(vec![row([
        ("id", Value::Text("p9".into())),
        ("title", Value::Text("T".into())),
        ("views", Value::BigInt(0)),
        ("author_id", Value::Text("u9".into())),
    ])]);

    let client = client(driver);
    let created = client
        .model("post")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new()
                .set("id", "p9")
                .set("title", "T")
                .set("views", Value::BigInt(0))
                .nested(
                    "author",
                    NestedCreate::create([CreateData::new()
                        .set("id", "u9")
                        .set("email", "z@d.io")]),
                ),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    let statements = client_statements(&client);
    assert!(statements[0].starts_with("INSERT INTO \"user\""));
    assert!(statements[1].starts_with("INSERT INTO \"post\""));

    // The post INSERT carries the freshly created author id.
    let params = client_params(&client, 1);
    assert!(params.contains(&Value::Text("u9".into())));
    assert_eq!(
        created.get("author_id"),
        Some(&ResultValue::Scalar(Value::Text("u9".into())))
    );
}

#[tokio::test]
async fn include_parses_into_a_result_tree() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    driver.respond_rows(vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("j@d.io".into())),
        ("name", Value::Text("John".into())),
        (
            "posts",
            Value::Json(serde_json::json!([
                {"id": "p1", "title": "A", "views": "9007199254740993", "author_id": "u1"},
                {"id": "p2", "title": "B", "views": "7", "author_id": "u1"},
            ])),
        ),
    ])]);

    let client = client(driver);
    let mut args = FindArgs::filtered(Filter::equals("id", "u1"));
    args.include.insert("posts".into(), RelationArgs::all());

    let user = client
        .model("user")
        .unwrap()
        .find_unique(args)
        .await
        .unwrap()
        .expect("row scripted");

    let posts = user.get("posts").unwrap().as_list().expect("to-many is a list");
    assert_eq!(posts.len(), 2);
    let first = posts[0].as_record().unwrap();
    // BigInt restored exactly from its TEXT cast, past the safe-double range.
    assert_eq!(
        first.get("views"),
        Some(&ResultValue::Scalar(Value::BigInt(9_007_199_254_740_993)))
    );
}

#[tokio::test]
async fn to_many_null_materializes_as_empty_list() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    driver.respond_rows(vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("j@d.io".into())),
        ("name", Value::Null),
        ("posts", Value::Null),
    ])]);

    let client = client(driver);
    let mut args = FindArgs::filtered(Filter::equals("id", "u1"));
    args.include.insert("posts".into(), RelationArgs::all());

    let user = client
        .model("user")
        .unwrap()
        .find_unique(args)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.get("posts"), Some(&ResultValue::List(Vec::new())));
}

#[tokio::test]
async fn count_normalizes_any_count_column_name() {
    for column in ["COUNT(*)", "count", "count(DISTINCT \"id\")", "_result"] {
        let driver = StubDriver::new(Dialect::PostgreSQL);
        driver.respond_rows(vec![row([(
            // PostgreSQL counts come back as int8.
            column,
            Value::BigInt(3),
        )])]);
        let client = client(driver);
        let n = client
            .model("user")
            .unwrap()
            .count(CountArgs::default())
            .await
            .unwrap();
        assert_eq!(n, 3, "column name {column}");
    }
}

#[tokio::test]
async fn negative_take_restores_user_order() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    // The statement orders DESC, so the wire delivers B then A.
    driver.respond_rows(vec![
        row([
            ("id", Value::Text("u2".into())),
            ("email", Value::Text("b@d.io".into())),
            ("name", Value::Text("B".into())),
        ]),
        row([
            ("id", Value::Text("u1".into())),
            ("email", Value::Text("a@d.io".into())),
            ("name", Value::Text("A".into())),
        ]),
    ]);

    let client = client(driver);
    let users = client
        .model("user")
        .unwrap()
        .find_many(FindArgs {
            order_by: vec![OrderBy::asc("name")],
            take: Some(-2),
            ..FindArgs::default()
        })
        .await
        .unwrap();

    assert_eq!(
        users[0].get("name"),
        Some(&ResultValue::Scalar(Value::Text("A".into())))
    );
    assert_eq!(
        users[1].get("name"),
        Some(&ResultValue::Scalar(Value::Text("B".into())))
    );
}

#[tokio::test]
async fn or_throw_variants_error_on_missing_rows() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    driver.respond_rows(Vec::new());
    let client1 = client(driver);

    let found = client1
        .model("user")
        .unwrap()
        .find_unique(FindArgs::filtered(Filter::equals("id", "nope")))
        .await
        .unwrap();
    assert!(found.is_none());

    let driver = StubDriver::new(Dialect::PostgreSQL);
    driver.respond_rows(Vec::new());
    let client2 = client(driver);
    let error = client2
        .model("user")
        .unwrap()
        .find_unique_or_throw(FindArgs::filtered(Filter::equals("id", "nope")))
        .await
        .unwrap_err();
    assert!(error.is_not_found());
}

#[tokio::test]
async fn delete_returns_the_removed_record() {
    let driver = StubDriver::new(Dialect::PostgreSQL);
    // Pre-fetch, then DELETE.
    driver.respond_rows(vec![row([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("j@d.io".into())),
        ("name", Value::Null),
    ])]);
    driver.respond_affected(1);

    let client = client(driver);
    let removed = client
        .model("user")
        .unwrap()
        .delete(DeleteArgs {
            filter: Filter::equals("id", "u1"),
            select: None,
            include: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(
        removed.get("id"),
        Some(&ResultValue::Scalar(Value::Text("u1".into())))
    );

    let statements = client_statements(&client);
    assert!(statements[0].starts_with("SELECT"));
    assert!(statements[1].starts_with("DELETE FROM \"user\""));
}

// -----------------------------------------------------------------------------
// Introspection helpers: the driver sits inside the client; tests reach it
// through the raw query surface of the stub.
// -----------------------------------------------------------------------------

fn client_events(client: &Client<StubDriver>) -> Vec<WireEvent> {
    client_driver(client).events()
}

fn client_statements(client: &Client<StubDriver>) -> Vec<String> {
    client_driver(client).statements()
}

fn client_params(client: &Client<StubDriver>, index: usize) -> Vec<Value> {
    client_driver(client)
        .events()
        .into_iter()
        .filter_map(|event| match event {
            WireEvent::Statement { params, .. } => Some(params),
            _ => None,
        })
        .nth(index)
        .unwrap_or_default()
}

fn client_driver(client: &Client<StubDriver>) -> &StubDriver {
    client.driver()
}
