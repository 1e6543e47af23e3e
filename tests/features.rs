//! Optional feature groups: vector and geospatial emit on PostgreSQL and
//! fail with `FeatureNotSupported` elsewhere; capability flags gate joins.

use viborm::query::{Filter, FindArgs, GeoOp, Operation, ScalarFilter};
use viborm::{Dialect, Value};
use viborm_core::adapter::SqlAdapter;
use viborm_core::builder::QueryBuilder;
use viborm_core::schema::{FieldKind, FieldState, Schema};
use viborm_core::sql::Sql;
use viborm_core::validate::PayloadValidator;
use viborm_mysql::MySqlAdapter;
use viborm_postgres::PostgresAdapter;
use viborm_sqlite::SqliteAdapter;

fn geo_schema() -> Schema {
    Schema::builder()
        .model("place", |m| {
            m.field(FieldState::new("id", FieldKind::String).id())
                .field(FieldState::new("location", FieldKind::Geometry))
                .field(FieldState::new("embedding", FieldKind::Vector { dimensions: 3 }));
        })
        .build()
        .unwrap()
}

fn build_where(adapter: &dyn SqlAdapter, filter: Filter) -> viborm::Result<Sql> {
    let schema = geo_schema();
    let model = schema.model_id("place").unwrap();
    let args = FindArgs::filtered(filter);
    let selection = PayloadValidator::new(&schema)
        .validate_find(model, &args)
        .unwrap();
    QueryBuilder::new(&schema, adapter)
        .build_find(model, Operation::FindMany, &args, &selection)
        .map(|plan| plan.sql)
}

#[test]
fn geospatial_predicates_emit_on_postgres() {
    let filter = Filter::field(
        "location",
        ScalarFilter::Geo(GeoOp::DWithin(500.0), Value::Text("POINT(2.35 48.85)".into())),
    );
    let sql = build_where(&PostgresAdapter::new(), filter)
        .unwrap()
        .render(Dialect::PostgreSQL);
    assert!(sql.sql.contains("ST_DWithin("));
    assert!(sql.sql.contains("ST_GeomFromText($1, 4326)"));
}

#[test]
fn geospatial_is_unsupported_off_postgres() {
    let filter = Filter::field(
        "location",
        ScalarFilter::Geo(GeoOp::Within, Value::Text("POINT(0 0)".into())),
    );
    let error = build_where(&MySqlAdapter::new(), filter.clone()).unwrap_err();
    assert_eq!(error.code(), "feature_not_supported");

    let error = build_where(&SqliteAdapter::new(), filter).unwrap_err();
    assert_eq!(error.code(), "feature_not_supported");
}

#[test]
fn vector_literals_emit_on_postgres_only() {
    use viborm_core::adapter::FeatureSupport;

    let pg = PostgresAdapter::new();
    match pg.vector() {
        FeatureSupport::Supported(ops) => {
            let sql = ops
                .cosine(pg.column("t0", "embedding"), &[0.1, 0.2, 0.3])
                .render(Dialect::PostgreSQL);
            assert!(sql.sql.contains("<=>"));
            assert!(sql.sql.contains("$1::vector"));
        }
        FeatureSupport::Unsupported => panic!("pgvector is supported"),
    }

    let lite = SqliteAdapter::new();
    assert!(!lite.vector().is_supported());
    let error = lite
        .vector()
        .require("vector", lite.dialect().name())
        .unwrap_err();
    assert_eq!(error.code(), "feature_not_supported");
}

#[test]
fn full_outer_join_is_capability_gated() {
    let pg = PostgresAdapter::new();
    assert!(pg
        .join_full(pg.table("a", "t1"), Sql::raw("TRUE"))
        .is_ok());

    let my = MySqlAdapter::new();
    let error = my
        .join_full(my.table("a", "t1"), Sql::raw("TRUE"))
        .unwrap_err();
    assert_eq!(error.code(), "feature_not_supported");

    let lite = SqliteAdapter::new();
    assert!(lite.join_full(lite.table("a", "t1"), Sql::raw("TRUE")).is_err());
}

#[test]
fn lateral_joins_are_capability_gated() {
    let lite = SqliteAdapter::new();
    let error = lite
        .join_lateral_left(Sql::raw("SELECT 1"), "t1")
        .unwrap_err();
    assert_eq!(error.code(), "feature_not_supported");

    let my = MySqlAdapter::new();
    assert!(my.capabilities().supports_lateral_joins);
    assert!(my.join_lateral_left(Sql::raw("SELECT 1"), "t1").is_ok());
}
