//! The driver abstraction.
//!
//! The engine needs a thin async surface over a SQL transport: execute a
//! rendered statement with its parameter vector, get rows and an
//! affected-count back, and control transaction boundaries. Everything else
//! (pooling, wire protocol, value decoding into [`Value`]) belongs to the
//! concrete binding. Drivers may connect lazily on first use; `disconnect`
//! is idempotent.

use std::future::Future;
use viborm_core::error::Result;
use viborm_core::parse::Row;
use viborm_core::value::Value;
use viborm_core::Dialect;

/// The outcome of one statement.
#[derive(Debug, Clone, Default)]
pub struct ExecuteResult {
    /// Rows as ordered column-name → raw-value records.
    pub rows: Vec<Row>,
    pub affected: u64,
}

impl ExecuteResult {
    pub fn rows_only(rows: Vec<Row>) -> Self {
        Self { rows, affected: 0 }
    }
}

/// An async SQL transport.
///
/// Methods return `Send` futures so engine work can be spawned (SWR
/// revalidation runs in the background).
pub trait Driver: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Establishes the underlying connection. Drivers may defer to the first
    /// `execute`; repeated calls are no-ops.
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Tears the connection down. Idempotent.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Executes an engine-rendered statement.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<ExecuteResult>> + Send;

    /// Executes caller-supplied SQL verbatim. Same shape as `execute`.
    fn execute_raw(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<ExecuteResult>> + Send;

    /// Opens a transaction. The connection stays pinned until `commit` or
    /// `rollback`.
    fn begin(&self) -> impl Future<Output = Result<()>> + Send;

    fn commit(&self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&self) -> impl Future<Output = Result<()>> + Send;
}
