//! MySQL adapter for viborm.
//!
//! Emits `` `quoted` `` identifiers, `?` placeholders, JSON built on
//! `JSON_OBJECT` / `JSON_ARRAYAGG` / `JSON_EXTRACT` / `JSON_CONTAINS`,
//! `ON DUPLICATE KEY UPDATE`, `INSERT IGNORE`, and `LAST_INSERT_ID()`.
//! No RETURNING: created rows are surfaced through a follow-up SELECT keyed
//! by the session-local last insert id.

mod adapter;
mod ddl;

pub use adapter::MySqlAdapter;
