//! Transactions and savepoint discipline.
//!
//! Nested transactions compile to `SAVEPOINT sp_n` / `RELEASE SAVEPOINT` /
//! `ROLLBACK TO SAVEPOINT`. PostgreSQL savepoints are stack-scoped, so two
//! nested transactions launched concurrently within one parent must not
//! interleave: each transaction level gates its direct children behind a
//! FIFO queue (a fair async mutex), guaranteeing the savepoint bracket
//! sequence on the wire is always well-balanced LIFO.

use crate::driver::{Driver, ExecuteResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use viborm_core::error::Result;
use viborm_core::value::Value;
use viborm_core::viborm_trace_tx;

/// A transaction scope bound to one driver connection.
///
/// The root scope maps to `BEGIN`/`COMMIT`; every nested scope is a
/// savepoint. Savepoint names are minted from a counter shared across the
/// whole tree, so the wire shows `sp_1`, `sp_2`, ... in execution order.
pub struct Transaction<'a, D: Driver> {
    driver: &'a D,
    depth: u32,
    counter: Arc<AtomicU32>,
    /// Serializes this scope's direct children (FIFO; tokio mutexes wake
    /// waiters in queue order).
    child_gate: Mutex<()>,
}

impl<'a, D: Driver> Transaction<'a, D> {
    pub(crate) fn root(driver: &'a D) -> Self {
        Self {
            driver,
            depth: 0,
            counter: Arc::new(AtomicU32::new(0)),
            child_gate: Mutex::new(()),
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn driver(&self) -> &'a D {
        self.driver
    }

    /// Executes a statement inside this transaction scope.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        self.driver.execute(sql, params).await
    }

    /// Executes caller-supplied SQL inside this transaction scope.
    pub async fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult> {
        self.driver.execute_raw(sql, params).await
    }

    /// Runs `f` inside a nested savepoint scope.
    ///
    /// On `Ok` the savepoint is released; on `Err` it is rolled back to and
    /// then released, leaving the enclosing scope intact. Concurrent calls
    /// on the same scope queue up and run one after another, each completing
    /// its whole savepoint bracket before the next begins.
    pub async fn transaction<R, F>(&self, f: F) -> Result<R>
    where
        F: for<'t> AsyncFnOnce(&'t Transaction<'a, D>) -> Result<R>,
    {
        let _guard = self.child_gate.lock().await;
        let name = format!("sp_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);

        self.driver
            .execute_raw(&format!("SAVEPOINT {name}"), &[])
            .await?;
        viborm_trace_tx!("savepoint", self.driver.dialect());

        let child = Transaction {
            driver: self.driver,
            depth: self.depth + 1,
            counter: Arc::clone(&self.counter),
            child_gate: Mutex::new(()),
        };

        match f(&child).await {
            Ok(value) => {
                self.driver
                    .execute_raw(&format!("RELEASE SAVEPOINT {name}"), &[])
                    .await?;
                Ok(value)
            }
            Err(error) => {
                let _ = self
                    .driver
                    .execute_raw(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
                    .await;
                let _ = self
                    .driver
                    .execute_raw(&format!("RELEASE SAVEPOINT {name}"), &[])
                    .await;
                Err(error)
            }
        }
    }
}

/// Opens a root transaction, runs `f`, and commits — or rolls back on any
/// error, including cancellation observed at the next suspension point.
pub(crate) async fn run_root<'a, D, R, F>(driver: &'a D, f: F) -> Result<R>
where
    D: Driver,
    F: for<'t> AsyncFnOnce(&'t Transaction<'a, D>) -> Result<R>,
{
    driver.begin().await?;
    viborm_trace_tx!("begin", driver.dialect());
    let tx = Transaction::root(driver);
    match f(&tx).await {
        Ok(value) => {
            driver.commit().await?;
            viborm_trace_tx!("commit", driver.dialect());
            Ok(value)
        }
        Err(error) => {
            let _ = driver.rollback().await;
            viborm_trace_tx!("rollback", driver.dialect());
            Err(error)
        }
    }
}
