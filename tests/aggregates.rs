//! Aggregation planning: count, aggregate buckets, group_by with HAVING,
//! exist; plus CTE and set-operation fragment assembly.

mod common;

use common::blog_schema;
use viborm::query::{
    AggregateArgs, AggregateFn, AggregateSelection, CountArgs, Filter, GroupByArgs, Having,
    OrderBy, ScalarFilter,
};
use viborm::{Dialect, Value};
use viborm_core::adapter::SqlAdapter;
use viborm_core::builder::QueryBuilder;
use viborm_core::sql::Sql;
use viborm_postgres::PostgresAdapter;

#[test]
fn count_aliases_to_the_result_key() {
    let schema = blog_schema();
    let adapter = PostgresAdapter::new();
    let builder = QueryBuilder::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let sql = builder
        .build_count(
            post,
            &CountArgs {
                filter: Some(Filter::equals("author_id", "u1")),
                ..CountArgs::default()
            },
        )
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert_eq!(
        sql.sql,
        "SELECT COUNT(*) AS \"_result\" FROM \"post\" AS \"t0\" \
         WHERE \"t0\".\"author_id\" = $1"
    );
}

#[test]
fn paged_count_wraps_a_derived_table() {
    let schema = blog_schema();
    let adapter = PostgresAdapter::new();
    let builder = QueryBuilder::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let sql = builder
        .build_count(
            post,
            &CountArgs {
                take: Some(10),
                skip: Some(5),
                ..CountArgs::default()
            },
        )
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert!(sql.sql.contains("FROM (SELECT 1 FROM \"post\" AS \"t0\""));
    assert!(sql.sql.contains("LIMIT 10 OFFSET 5"));
}

#[test]
fn aggregate_buckets_use_dotted_aliases() {
    let schema = blog_schema();
    let adapter = PostgresAdapter::new();
    let builder = QueryBuilder::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let sql = builder
        .build_aggregate(
            post,
            &AggregateArgs {
                selection: AggregateSelection {
                    count_all: true,
                    sum: vec!["views".into()],
                    avg: vec!["views".into()],
                    ..AggregateSelection::default()
                },
                ..AggregateArgs::default()
            },
        )
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert!(sql.sql.contains("COUNT(*) AS \"_count._all\""));
    assert!(sql.sql.contains("SUM(\"t0\".\"views\") AS \"_sum.views\""));
    assert!(sql.sql.contains("AVG(\"t0\".\"views\") AS \"_avg.views\""));
}

#[test]
fn group_by_emits_keys_aggregates_and_having() {
    let schema = blog_schema();
    let adapter = PostgresAdapter::new();
    let builder = QueryBuilder::new(&schema, &adapter);
    let post = schema.model_id("post").unwrap();

    let sql = builder
        .build_group_by(
            post,
            &GroupByArgs {
                by: vec!["author_id".into()],
                selection: AggregateSelection {
                    count_all: true,
                    ..AggregateSelection::default()
                },
                having: vec![Having {
                    aggregate: AggregateFn::Count,
                    field: None,
                    condition: ScalarFilter::Gt(Value::Int(1)),
                }],
                order_by: vec![OrderBy::asc("author_id")],
                ..GroupByArgs::default()
            },
        )
        .unwrap()
        .render(Dialect::PostgreSQL);

    assert!(sql.sql.contains("GROUP BY \"t0\".\"author_id\""));
    assert!(sql.sql.contains(" HAVING COUNT(*) > $1"));
    assert!(sql.sql.contains("COUNT(*) AS \"_count._all\""));
    assert!(sql.sql.contains("ORDER BY \"t0\".\"author_id\" ASC"));
}

#[test]
fn exist_wraps_an_exists_check() {
    let schema = blog_schema();
    let adapter = PostgresAdapter::new();
    let builder = QueryBuilder::new(&schema, &adapter);
    let user = schema.model_id("user").unwrap();

    let sql = builder
        .build_exist(
            user,
            &CountArgs {
                filter: Some(Filter::equals("email", "a@b.c")),
                ..CountArgs::default()
            },
        )
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert_eq!(
        sql.sql,
        "SELECT EXISTS (SELECT 1 FROM \"user\" AS \"t0\" \
         WHERE \"t0\".\"email\" = $1) AS \"_result\""
    );
}

#[test]
fn cte_assembly() {
    let adapter = PostgresAdapter::new();
    let body = Sql::raw("SELECT * FROM ").append(Sql::ident("recent"));
    let sql = adapter
        .with(
            vec![(
                "recent".to_string(),
                Sql::raw("SELECT 1 AS n"),
            )],
            body,
        )
        .render(Dialect::PostgreSQL);
    assert_eq!(
        sql.sql,
        "WITH \"recent\" AS (SELECT 1 AS n) SELECT * FROM \"recent\""
    );

    let recursive = adapter
        .with_recursive(
            "tree",
            Sql::raw("SELECT 1 AS depth"),
            Sql::raw("SELECT depth + 1 FROM tree WHERE depth < 5"),
            true,
            Sql::raw("SELECT * FROM tree"),
        )
        .render(Dialect::PostgreSQL);
    assert!(recursive.sql.starts_with("WITH RECURSIVE \"tree\" AS ("));
    assert!(recursive.sql.contains(" UNION ALL "));
}

#[test]
fn set_operations_concatenate() {
    let adapter = PostgresAdapter::new();
    let union = adapter
        .union_all(Sql::raw("SELECT 1"), Sql::raw("SELECT 2"))
        .render(Dialect::PostgreSQL);
    assert_eq!(union.sql, "SELECT 1 UNION ALL SELECT 2");

    let except = adapter
        .except(Sql::raw("SELECT 1"), Sql::raw("SELECT 2"))
        .render(Dialect::PostgreSQL);
    assert_eq!(except.sql, "SELECT 1 EXCEPT SELECT 2");
}
