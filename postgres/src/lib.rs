//! PostgreSQL adapter for viborm.
//!
//! Emits `"quoted"` identifiers, `$n` placeholders, native arrays and JSON
//! (`json_build_object`, `json_agg`, `->`/`->>`), `RETURNING`,
//! `ON CONFLICT (...)`, `LATERAL`, `DISTINCT ON`, `ILIKE`,
//! `NULLS FIRST/LAST`, and `lastval()`. The only dialect in the set carrying
//! the vector and geospatial feature groups (pgvector / PostGIS).

mod adapter;
mod ddl;
mod features;

pub use adapter::PostgresAdapter;
