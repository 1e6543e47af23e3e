//! Instrumentation: spans and structured query logging.
//!
//! Span emission rides the `tracing` crate behind the `tracing` cargo
//! feature — an OpenTelemetry exporter subscribes externally (e.g. via
//! `tracing-opentelemetry`), so nothing here touches an OTel SDK directly
//! and the whole layer compiles away when the feature is off. Attribute
//! names follow the OTel database semantic conventions.

mod logger;
mod tracer;

pub use logger::{LogEvent, LogLevel, QueryLogger};
pub use tracer::{SpanAttrs, Tracer};

use std::sync::Arc;

/// Per-client instrumentation config. Tracing and logging enable
/// independently; SQL text and parameters are elided unless `include_sql`.
#[derive(Clone, Default)]
pub struct TelemetryConfig {
    pub tracing_enabled: bool,
    /// Include `db.query.text` / parameters in spans and log events.
    pub include_sql: bool,
    pub log_callback: Option<Arc<dyn Fn(LogEvent) + Send + Sync>>,
    pub log_levels: Vec<LogLevel>,
}

/// The assembled instrumentation facade the executor calls into.
#[derive(Clone)]
pub(crate) struct Telemetry {
    pub tracer: Tracer,
    pub logger: QueryLogger,
}

impl Telemetry {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            tracer: Tracer::new(config.tracing_enabled, config.include_sql),
            logger: QueryLogger::new(
                config.log_callback.clone(),
                config.log_levels.clone(),
                config.include_sql,
            ),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&TelemetryConfig::default())
    }
}
