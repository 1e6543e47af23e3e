//! SQLite adapter for viborm.
//!
//! Emits `"quoted"` identifiers, `?` placeholders, JSON built on
//! `json_object` / `json_group_array` / `json_extract`,
//! `ON CONFLICT DO NOTHING`, `COLLATE NOCASE`, and `last_insert_rowid()`.
//! RETURNING is available (SQLite 3.35+); LATERAL is not, so relation
//! loading uses correlated scalar subqueries.

mod adapter;
mod ddl;

pub use adapter::SqliteAdapter;
