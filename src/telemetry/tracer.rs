//! Span emission.

use viborm_core::error::Result;

/// Attributes attached to an engine span, following the OTel database
/// semantic conventions (`error.code` carries the stable machine code an
/// exporter maps onto `error.type`).
#[derive(Debug, Default, Clone)]
pub struct SpanAttrs {
    /// `db.system.name`
    pub system: Option<&'static str>,
    /// `db.collection.name`
    pub collection: Option<String>,
    /// `db.operation.name`
    pub operation: Option<&'static str>,
    /// `db.query.text` — only populated when SQL capture is enabled.
    pub query_text: Option<String>,
    /// Open the span detached from the ambient context (SWR background
    /// revalidation, so traces are not nested under a long-gone request).
    pub root: bool,
}

impl SpanAttrs {
    pub fn operation(system: &'static str, collection: &str, operation: &'static str) -> Self {
        Self {
            system: Some(system),
            collection: Some(collection.to_string()),
            operation: Some(operation),
            ..Self::default()
        }
    }
}

/// Wraps engine phases in spans. A no-op unless constructed enabled and the
/// `tracing` feature is compiled in; the span is entered, closed on every
/// exit path, and marked with `error.type` when the future fails.
#[derive(Debug, Clone, Copy)]
pub struct Tracer {
    enabled: bool,
    include_sql: bool,
}

impl Tracer {
    pub fn new(enabled: bool, include_sql: bool) -> Self {
        Self {
            enabled,
            include_sql,
        }
    }

    pub fn include_sql(&self) -> bool {
        self.include_sql
    }

    #[cfg(feature = "tracing")]
    pub async fn in_span<T, F>(&self, name: &'static str, attrs: SpanAttrs, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        use tracing::Instrument;

        if !self.enabled {
            return fut.await;
        }

        let query_text = if self.include_sql {
            attrs.query_text.as_deref()
        } else {
            None
        };
        let make_span = || {
            if attrs.root {
                tracing::info_span!(
                    parent: None,
                    "viborm",
                    otel.name = name,
                    db.system.name = attrs.system,
                    db.collection.name = attrs.collection.as_deref(),
                    db.operation.name = attrs.operation,
                    db.query.text = query_text,
                    db.response.returned_rows = tracing::field::Empty,
                    error.code = tracing::field::Empty,
                )
            } else {
                tracing::info_span!(
                    "viborm",
                    otel.name = name,
                    db.system.name = attrs.system,
                    db.collection.name = attrs.collection.as_deref(),
                    db.operation.name = attrs.operation,
                    db.query.text = query_text,
                    db.response.returned_rows = tracing::field::Empty,
                    error.code = tracing::field::Empty,
                )
            }
        };
        let span = make_span();

        let result = fut.instrument(span.clone()).await;
        match &result {
            Ok(_) => {}
            Err(error) => {
                span.record("error.code", error.code());
                tracing::error!(parent: &span, error = %error, "viborm.error");
            }
        }
        result
    }

    #[cfg(not(feature = "tracing"))]
    pub async fn in_span<T, F>(&self, _name: &'static str, _attrs: SpanAttrs, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        fut.await
    }

    /// Records the returned-row count on the current span.
    pub fn record_rows(&self, rows: usize) {
        #[cfg(feature = "tracing")]
        if self.enabled {
            tracing::Span::current().record("db.response.returned_rows", rows);
        }
        #[cfg(not(feature = "tracing"))]
        let _ = rows;
    }
}
