//! End-to-end against an in-memory SQLite database (rusqlite, bundled):
//! nested creates with implicit FKs, JSON relation loading, BigInt
//! round-trips past the safe-double range.

#![cfg(feature = "rusqlite")]

mod common;

use common::blog_schema;
use std::sync::Arc;
use viborm::drivers::RusqliteDriver;
use viborm::prelude::*;
use viborm::ResultValue;
use viborm_core::adapter::{DdlOp, SqlAdapter};

async fn setup() -> Client<RusqliteDriver> {
    let schema = blog_schema();
    let adapter = SqliteAdapter::new();

    let mut ddl = Vec::new();
    for (_, model) in schema.models() {
        let statement = adapter
            .generate_ddl(&schema, DdlOp::CreateTable(model))
            .unwrap();
        ddl.push(statement.render(viborm::Dialect::SQLite).sql);
    }
    // The many-to-many junction has no model of its own.
    ddl.push(
        "CREATE TABLE \"post_tags\" (\"post_id\" TEXT NOT NULL, \"tag_id\" TEXT NOT NULL, \
         PRIMARY KEY (\"post_id\", \"tag_id\"))"
            .to_string(),
    );

    let client = Client::new(RusqliteDriver::in_memory(), schema, Arc::new(adapter));
    for statement in ddl {
        client.execute_raw(&statement, vec![]).await.unwrap();
    }
    client
}

fn scalars(
    cells: impl IntoIterator<Item = (&'static str, Value)>,
) -> viborm::query::ScalarWrites {
    cells
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[tokio::test]
async fn nested_create_many_with_implicit_fk_roundtrips() {
    let client = setup().await;
    let users = client.model("user").unwrap();

    users
        .create(CreateArgs {
            data: CreateData::new()
                .set("id", "u1")
                .set("email", "john@d.io")
                .set("name", "John")
                .nested(
                    "posts",
                    NestedCreate::create_many(
                        [
                            scalars([
                                ("id", Value::Text("p1".into())),
                                ("title", Value::Text("A".into())),
                                ("views", Value::BigInt(1)),
                            ]),
                            scalars([
                                ("id", Value::Text("p2".into())),
                                ("title", Value::Text("B".into())),
                                ("views", Value::BigInt(2)),
                            ]),
                        ],
                        false,
                    ),
                ),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    let mut args = FindArgs::filtered(Filter::equals("id", "u1"));
    args.include.insert("posts".into(), RelationArgs::all());
    let user = users.find_unique(args).await.unwrap().expect("created");

    let posts = user.get("posts").unwrap().as_list().unwrap();
    assert_eq!(posts.len(), 2);
    for post in posts {
        let record = post.as_record().unwrap();
        assert_eq!(
            record.get("author_id"),
            Some(&ResultValue::Scalar(Value::Text("u1".into())))
        );
    }
}

#[tokio::test]
async fn bigint_precision_survives_json_aggregation() {
    let client = setup().await;
    let big = 9_007_199_254_740_993i128; // MAX_SAFE_INTEGER + 2

    client
        .model("post")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new()
                .set("id", "p1")
                .set("title", "big")
                .set("views", Value::BigInt(big))
                .nested(
                    "author",
                    NestedCreate::create([CreateData::new()
                        .set("id", "u1")
                        .set("email", "a@d.io")]),
                ),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    // Read the post back through its author so the value crosses the JSON
    // aggregation path.
    let mut args = FindArgs::filtered(Filter::equals("id", "u1"));
    args.include.insert("posts".into(), RelationArgs::all());
    let author = client
        .model("user")
        .unwrap()
        .find_unique(args)
        .await
        .unwrap()
        .unwrap();

    let posts = author.get("posts").unwrap().as_list().unwrap();
    let views = posts[0].as_record().unwrap().get("views").unwrap();
    assert_eq!(views, &ResultValue::Scalar(Value::BigInt(big)));
}

#[tokio::test]
async fn update_increment_and_count() {
    let client = setup().await;
    client
        .model("user")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new().set("id", "u1").set("email", "a@d.io"),
            ..CreateArgs::default()
        })
        .await
        .unwrap();
    client
        .model("post")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new()
                .set("id", "p1")
                .set("title", "A")
                .set("views", Value::BigInt(10))
                .set("author_id", "u1"),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    let updated = client
        .model("post")
        .unwrap()
        .update(UpdateArgs {
            filter: Filter::equals("id", "p1"),
            data: UpdateData::new().apply("views", SetOp::Increment(Value::Int(5))),
            select: None,
            include: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(
        updated.get("views"),
        Some(&ResultValue::Scalar(Value::BigInt(15)))
    );

    let n = client
        .model("post")
        .unwrap()
        .count(CountArgs::default())
        .await
        .unwrap();
    assert_eq!(n, 1);
}

#[tokio::test]
async fn many_to_many_connect_and_filter() {
    let client = setup().await;
    client
        .model("user")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new().set("id", "u1").set("email", "a@d.io"),
            ..CreateArgs::default()
        })
        .await
        .unwrap();
    client
        .model("tag")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new().set("id", "t1").set("label", "rust"),
            ..CreateArgs::default()
        })
        .await
        .unwrap();
    client
        .model("post")
        .unwrap()
        .create(CreateArgs {
            data: CreateData::new()
                .set("id", "p1")
                .set("title", "A")
                .set("views", Value::BigInt(0))
                .set("author_id", "u1")
                .nested(
                    "tags",
                    NestedCreate::connect([Filter::equals("label", "rust")]),
                ),
            ..CreateArgs::default()
        })
        .await
        .unwrap();

    // Junction membership is visible both through include and through the
    // relation filter.
    let mut args = FindArgs::filtered(Filter::equals("id", "p1"));
    args.include.insert("tags".into(), RelationArgs::all());
    let post = client
        .model("post")
        .unwrap()
        .find_unique(args)
        .await
        .unwrap()
        .unwrap();
    let tags = post.get("tags").unwrap().as_list().unwrap();
    assert_eq!(tags.len(), 1);

    let tagged = client
        .model("post")
        .unwrap()
        .find_many(FindArgs::filtered(Filter::relation(
            "tags",
            RelationFilter::Some(Box::new(Filter::equals("label", "rust"))),
        )))
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
}

#[tokio::test]
async fn transaction_rollback_discards_writes() {
    let client = setup().await;

    let result: viborm::Result<()> = client
        .transaction(async |tc| {
            tc.model("user")?
                .create(CreateArgs {
                    data: CreateData::new().set("id", "u1").set("email", "a@d.io"),
                    ..CreateArgs::default()
                })
                .await?;
            Err(viborm::Error::Unexpected {
                context: "abort".into(),
            })
        })
        .await;
    assert!(result.is_err());

    let n = client
        .model("user")
        .unwrap()
        .count(CountArgs::default())
        .await
        .unwrap();
    assert_eq!(n, 0);
}
