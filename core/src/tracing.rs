//! Tracing shims for query observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate. The
//! macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate at
//! every call site.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// viborm_trace_query!(&rendered.sql, rendered.params.len());
/// ```
#[macro_export]
macro_rules! viborm_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "viborm.query");
    };
}

/// Emit an info-level tracing event for transaction lifecycle.
///
/// ```ignore
/// viborm_trace_tx!("begin", "sqlite");
/// ```
#[macro_export]
macro_rules! viborm_trace_tx {
    ($event:literal, $dialect:expr) => {
        #[cfg(feature = "tracing")]
        tracing::info!(event = $event, dialect = %$dialect, "viborm.transaction");
    };
}
