//! Mutation statement generation across dialects.

mod common;

use common::blog_schema;
use indexmap::IndexMap;
use viborm::query::{Filter, ScalarWrites, SetOp};
use viborm::{Dialect, Value};
use viborm_core::mutate::MutationBuilder;
use viborm_mysql::MySqlAdapter;
use viborm_postgres::PostgresAdapter;
use viborm_sqlite::SqliteAdapter;

fn writes(cells: impl IntoIterator<Item = (&'static str, Value)>) -> ScalarWrites {
    cells
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[test]
fn insert_with_returning_on_postgres_and_sqlite() {
    let schema = blog_schema();
    let user = schema.model_id("user").unwrap();
    let scalars = writes([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("a@b.c".into())),
    ]);

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_insert(user, &scalars, true)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert_eq!(
        sql.sql,
        "INSERT INTO \"user\" (\"id\", \"email\") VALUES ($1, $2) \
         RETURNING \"id\" AS \"id\", \"email\" AS \"email\", \"name\" AS \"name\""
    );

    let lite = SqliteAdapter::new();
    let sql = MutationBuilder::new(&schema, &lite)
        .build_insert(user, &scalars, true)
        .unwrap()
        .render(Dialect::SQLite);
    assert!(sql.sql.contains("RETURNING"));
    assert_eq!(sql.sql.matches('?').count(), 2);
}

#[test]
fn mysql_insert_has_no_returning() {
    let schema = blog_schema();
    let user = schema.model_id("user").unwrap();
    let scalars = writes([("id", Value::Text("u1".into()))]);

    let my = MySqlAdapter::new();
    let sql = MutationBuilder::new(&schema, &my)
        .build_insert(user, &scalars, true)
        .unwrap()
        .render(Dialect::MySQL);
    assert_eq!(sql.sql, "INSERT INTO `user` (`id`) VALUES (?)");
}

#[test]
fn last_insert_id_chain_per_dialect() {
    let schema = blog_schema();
    let user = schema.model_id("user").unwrap();

    let my = MySqlAdapter::new();
    let sql = MutationBuilder::new(&schema, &my)
        .build_select_by_last_insert_id(user)
        .unwrap()
        .render(Dialect::MySQL);
    assert!(sql.sql.contains("WHERE `id` = LAST_INSERT_ID()"));

    let lite = SqliteAdapter::new();
    let sql = MutationBuilder::new(&schema, &lite)
        .build_select_by_last_insert_id(user)
        .unwrap()
        .render(Dialect::SQLite);
    assert!(sql.sql.contains("last_insert_rowid()"));
}

#[test]
fn batch_insert_unions_columns_and_skips_duplicates() {
    let schema = blog_schema();
    let user = schema.model_id("user").unwrap();
    let rows = vec![
        writes([
            ("id", Value::Text("u1".into())),
            ("email", Value::Text("a@b.c".into())),
        ]),
        writes([
            ("id", Value::Text("u2".into())),
            ("email", Value::Text("b@b.c".into())),
            ("name", Value::Text("Bea".into())),
        ]),
    ];

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_insert_many(user, &rows, true)
        .unwrap()
        .render(Dialect::PostgreSQL);
    // First row has no `name`: the cell falls back to DEFAULT.
    assert!(sql.sql.contains("($1, $2, DEFAULT), ($3, $4, $5)"));
    assert!(sql.sql.ends_with(" ON CONFLICT DO NOTHING"));

    let my = MySqlAdapter::new();
    let sql = MutationBuilder::new(&schema, &my)
        .build_insert_many(user, &rows, true)
        .unwrap()
        .render(Dialect::MySQL);
    assert!(sql.sql.starts_with("INSERT IGNORE INTO `user`"));

    let lite = SqliteAdapter::new();
    let sql = MutationBuilder::new(&schema, &lite)
        .build_insert_many(user, &rows, false)
        .unwrap()
        .render(Dialect::SQLite);
    // SQLite has no DEFAULT keyword in multi-row VALUES.
    assert!(sql.sql.contains("NULL"));
}

#[test]
fn update_set_operation_dispatch() {
    let schema = blog_schema();
    let post = schema.model_id("post").unwrap();
    let mut sets: IndexMap<String, SetOp> = IndexMap::new();
    sets.insert("title".into(), SetOp::Set(Value::Text("New".into())));
    sets.insert("views".into(), SetOp::Increment(Value::Int(1)));

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_update(post, Some(&Filter::equals("id", "p1")), &sets, false)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert_eq!(
        sql.sql,
        "UPDATE \"post\" SET \"title\" = $1, \"views\" = \"views\" + $2 \
         WHERE \"post\".\"id\" = $3"
    );
}

#[test]
fn delete_filters_through_the_table_name() {
    let schema = blog_schema();
    let post = schema.model_id("post").unwrap();

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_delete(post, Some(&Filter::equals("id", "p1")), false)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert_eq!(sql.sql, "DELETE FROM \"post\" WHERE \"post\".\"id\" = $1");
}

#[test]
fn upsert_conflict_clause_per_dialect() {
    let schema = blog_schema();
    let user = schema.model_id("user").unwrap();
    let filter = Filter::equals("email", "a@b.c");
    let create = writes([
        ("id", Value::Text("u1".into())),
        ("email", Value::Text("a@b.c".into())),
    ]);
    let mut update: IndexMap<String, SetOp> = IndexMap::new();
    update.insert("name".into(), SetOp::Set(Value::Text("Ann".into())));

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_upsert(user, &filter, &create, &update, false)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert!(sql
        .sql
        .contains(" ON CONFLICT (\"email\") DO UPDATE SET \"name\" = $3"));

    let my = MySqlAdapter::new();
    let sql = MutationBuilder::new(&schema, &my)
        .build_upsert(user, &filter, &create, &update, false)
        .unwrap()
        .render(Dialect::MySQL);
    assert!(sql.sql.contains(" ON DUPLICATE KEY UPDATE `name` = ?"));
    assert!(!sql.sql.contains("ON CONFLICT"));
}

#[test]
fn empty_upsert_update_keeps_the_statement_valid() {
    let schema = blog_schema();
    let user = schema.model_id("user").unwrap();
    let filter = Filter::equals("email", "a@b.c");
    let create = writes([("email", Value::Text("a@b.c".into()))]);
    let update: IndexMap<String, SetOp> = IndexMap::new();

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_upsert(user, &filter, &create, &update, false)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert!(sql.sql.contains("DO UPDATE SET \"email\" = \"email\""));
}

#[test]
fn junction_statements() {
    let schema = blog_schema();
    let post = schema.model_by_name("post").unwrap();
    let junction = post.relation("tags").unwrap().junction.as_ref().unwrap();

    let pg = PostgresAdapter::new();
    let builder = MutationBuilder::new(&schema, &pg);

    let insert = builder
        .build_junction_insert(
            junction,
            Value::Text("p1".into()),
            Value::Text("t1".into()),
        )
        .render(Dialect::PostgreSQL);
    assert_eq!(
        insert.sql,
        "INSERT INTO \"post_tags\" (\"post_id\", \"tag_id\") VALUES ($1, $2) \
         ON CONFLICT DO NOTHING"
    );

    let delete = builder
        .build_junction_delete(junction, Value::Text("p1".into()), None)
        .render(Dialect::PostgreSQL);
    assert_eq!(
        delete.sql,
        "DELETE FROM \"post_tags\" WHERE \"post_id\" = $1"
    );
}

#[test]
fn array_push_assignments_per_dialect() {
    let schema = viborm_core::schema::Schema::builder()
        .model("doc", |m| {
            m.field(
                viborm_core::schema::FieldState::new("id", viborm_core::schema::FieldKind::String)
                    .id(),
            )
            .field(
                viborm_core::schema::FieldState::new(
                    "labels",
                    viborm_core::schema::FieldKind::String,
                )
                .array(),
            );
        })
        .build()
        .unwrap();
    let doc = schema.model_id("doc").unwrap();
    let mut sets: IndexMap<String, SetOp> = IndexMap::new();
    sets.insert("labels".into(), SetOp::Push(Value::Text("x".into())));

    let pg = PostgresAdapter::new();
    let sql = MutationBuilder::new(&schema, &pg)
        .build_update(doc, Some(&Filter::equals("id", "d1")), &sets, false)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert!(sql.sql.contains("\"labels\" = array_append(\"labels\", $1)"));

    let my = MySqlAdapter::new();
    let sql = MutationBuilder::new(&schema, &my)
        .build_update(doc, Some(&Filter::equals("id", "d1")), &sets, false)
        .unwrap()
        .render(Dialect::MySQL);
    assert!(sql.sql.contains("JSON_ARRAY_APPEND(COALESCE(`labels`, JSON_ARRAY()), '$', ?)"));
}
