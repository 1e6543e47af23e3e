//! Embedded SQLite driver over rusqlite (bundled).
//!
//! The connection opens lazily on first use and enforces `foreign_keys` ON.
//! rusqlite is synchronous; statements run inline on the calling task, which
//! is fine for an in-process engine.

use crate::driver::{Driver, ExecuteResult};
use chrono::SecondsFormat;
use rusqlite::types::Value as SqliteValue;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;
use viborm_core::error::{Error, Result};
use viborm_core::parse::Row;
use viborm_core::value::Value;
use viborm_core::Dialect;

enum Target {
    Memory,
    File(PathBuf),
}

/// A lazily-opened rusqlite connection.
pub struct RusqliteDriver {
    target: Target,
    conn: Mutex<Option<Connection>>,
}

impl RusqliteDriver {
    pub fn in_memory() -> Self {
        Self {
            target: Target::Memory,
            conn: Mutex::new(None),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::File(path.into()),
            conn: Mutex::new(None),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Connection("sqlite connection poisoned".into()))?;
        if guard.is_none() {
            let conn = match &self.target {
                Target::Memory => Connection::open_in_memory(),
                Target::File(path) => Connection::open(path),
            }
            .map_err(|e| Error::Connection(e.to_string()))?;
            conn.pragma_update(None, "foreign_keys", true)
                .map_err(|e| Error::Connection(e.to_string()))?;
            *guard = Some(conn);
        }
        f(guard.as_ref().expect("connection opened above"))
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| map_sqlite_error(&e))?;
            let bound: Vec<SqliteValue> = params.iter().map(encode_value).collect();

            if stmt.column_count() == 0 {
                let affected = stmt
                    .execute(rusqlite::params_from_iter(bound))
                    .map_err(|e| map_sqlite_error(&e))?;
                return Ok(ExecuteResult {
                    rows: Vec::new(),
                    affected: affected as u64,
                });
            }

            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut rows = Vec::new();
            let mut result_rows = stmt
                .query(rusqlite::params_from_iter(bound))
                .map_err(|e| map_sqlite_error(&e))?;
            while let Some(row) = result_rows.next().map_err(|e| map_sqlite_error(&e))? {
                let mut record = Row::new();
                for (index, name) in names.iter().enumerate() {
                    let cell = row
                        .get_ref(index)
                        .map_err(|e| map_sqlite_error(&e))?;
                    record.insert(name.clone(), decode_cell(cell));
                }
                rows.push(record);
            }
            drop(result_rows);

            Ok(ExecuteResult {
                rows,
                affected: conn.changes(),
            })
        })
    }
}

impl Driver for RusqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    async fn connect(&self) -> Result<()> {
        self.with_conn(|_| Ok(()))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Connection("sqlite connection poisoned".into()))?;
        guard.take();
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        self.run(sql, params)
    }

    async fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        self.run(sql, params)
    }

    async fn begin(&self) -> Result<()> {
        self.run("BEGIN", &[]).map(|_| ())
    }

    async fn commit(&self) -> Result<()> {
        self.run("COMMIT", &[]).map(|_| ())
    }

    async fn rollback(&self) -> Result<()> {
        self.run("ROLLBACK", &[]).map(|_| ())
    }
}

fn map_sqlite_error(error: &rusqlite::Error) -> Error {
    let code = match error {
        rusqlite::Error::SqliteFailure(inner, _) => Some(inner.extended_code.to_string()),
        _ => None,
    };
    Error::from_driver(code.as_deref(), error.to_string())
}

/// SQLite stores everything structured as TEXT; wide integers that no longer
/// fit the INTEGER storage class degrade to their decimal text form.
fn encode_value(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(n) => SqliteValue::Integer(*n),
        Value::BigInt(n) => match i64::try_from(*n) {
            Ok(narrow) => SqliteValue::Integer(narrow),
            Err(_) => SqliteValue::Text(n.to_string()),
        },
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Decimal(d) => SqliteValue::Text(d.to_string()),
        Value::Text(s) | Value::Enum(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::DateTime(dt) => {
            SqliteValue::Text(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Value::Date(d) => SqliteValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqliteValue::Text(t.format("%H:%M:%S%.3f").to_string()),
        Value::Json(json) => SqliteValue::Text(json.to_string()),
        Value::Uuid(u) => SqliteValue::Text(u.to_string()),
        list @ (Value::List(_) | Value::Vector(_)) => {
            SqliteValue::Text(list.to_json().to_string())
        }
    }
}

fn decode_cell(cell: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
