//! Shared test fixtures: a scripted driver and a small blog schema.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use viborm::driver::{Driver, ExecuteResult};
use viborm::{Dialect, Result, Row, Value};
use viborm_core::schema::{FieldKind, FieldState, JunctionTable, RelationDef, Schema};

/// Records every wire interaction and replays scripted responses in order.
/// Statements with no scripted response return an empty result.
pub struct StubDriver {
    dialect: Dialect,
    log: Mutex<Vec<WireEvent>>,
    responses: Mutex<VecDeque<ExecuteResult>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Begin,
    Commit,
    Rollback,
    Statement { sql: String, params: Vec<Value> },
}

impl StubDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            log: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn respond(&self, result: ExecuteResult) {
        self.responses.lock().unwrap().push_back(result);
    }

    pub fn respond_rows(&self, rows: Vec<Row>) {
        self.respond(ExecuteResult { rows, affected: 0 });
    }

    pub fn respond_affected(&self, affected: u64) {
        self.respond(ExecuteResult {
            rows: Vec::new(),
            affected,
        });
    }

    pub fn events(&self) -> Vec<WireEvent> {
        self.log.lock().unwrap().clone()
    }

    /// Only the statement texts, in wire order.
    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                WireEvent::Statement { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
        self.responses.lock().unwrap().clear();
    }

    fn record(&self, sql: &str, params: &[Value]) -> ExecuteResult {
        self.log.lock().unwrap().push(WireEvent::Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }
}

impl Driver for StubDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        Ok(self.record(sql, params))
    }

    async fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        Ok(self.record(sql, params))
    }

    async fn begin(&self) -> Result<()> {
        self.log.lock().unwrap().push(WireEvent::Begin);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.log.lock().unwrap().push(WireEvent::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.log.lock().unwrap().push(WireEvent::Rollback);
        Ok(())
    }
}

/// users ↔ posts ↔ comments, plus tags through a junction table.
pub fn blog_schema() -> Schema {
    Schema::builder()
        .model("user", |m| {
            m.field(FieldState::new("id", FieldKind::String).id())
                .field(FieldState::new("email", FieldKind::String).unique())
                .field(FieldState::new("name", FieldKind::String).nullable())
                .relation(RelationDef::one_to_many("posts", "post", ["id"], ["author_id"]));
        })
        .model("post", |m| {
            m.field(FieldState::new("id", FieldKind::String).id())
                .field(FieldState::new("title", FieldKind::String))
                .field(FieldState::new("views", FieldKind::BigInt))
                .field(FieldState::new("author_id", FieldKind::String))
                .relation(RelationDef::many_to_one("author", "user", ["author_id"], ["id"]))
                .relation(RelationDef::one_to_many("comments", "comment", ["id"], ["post_id"]))
                .relation(RelationDef::many_to_many(
                    "tags",
                    "tag",
                    ["id"],
                    ["id"],
                    JunctionTable {
                        table: "post_tags".into(),
                        a_column: "post_id".into(),
                        b_column: "tag_id".into(),
                    },
                ));
        })
        .model("comment", |m| {
            m.field(FieldState::new("id", FieldKind::String).id())
                .field(FieldState::new("body", FieldKind::String))
                .field(FieldState::new("post_id", FieldKind::String))
                .relation(RelationDef::many_to_one("post", "post", ["post_id"], ["id"]));
        })
        .model("tag", |m| {
            m.field(FieldState::new("id", FieldKind::String).id())
                .field(FieldState::new("label", FieldKind::String).unique())
                .relation(RelationDef::many_to_many(
                    "posts",
                    "post",
                    ["id"],
                    ["id"],
                    JunctionTable {
                        table: "post_tags".into(),
                        a_column: "tag_id".into(),
                        b_column: "post_id".into(),
                    },
                ));
        })
        .build()
        .expect("blog schema is valid")
}

/// Builds a raw driver row from (column, value) pairs.
pub fn row(cells: impl IntoIterator<Item = (&'static str, Value)>) -> Row {
    cells
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
