//! Structured query logging.

use std::sync::Arc;
use std::time::Duration;

/// Log levels a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Query,
    Warning,
    Error,
}

/// One structured log event handed to the configured callback.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    /// Statement text; elided unless SQL capture is enabled.
    pub query: Option<String>,
    /// Bound parameter count (values are never logged, only the count).
    pub param_count: Option<usize>,
    pub duration: Option<Duration>,
}

/// Level-filtered logger dispatching to a user callback.
#[derive(Clone)]
pub struct QueryLogger {
    callback: Option<Arc<dyn Fn(LogEvent) + Send + Sync>>,
    levels: Vec<LogLevel>,
    include_sql: bool,
}

impl QueryLogger {
    pub fn new(
        callback: Option<Arc<dyn Fn(LogEvent) + Send + Sync>>,
        levels: Vec<LogLevel>,
        include_sql: bool,
    ) -> Self {
        Self {
            callback,
            levels,
            include_sql,
        }
    }

    fn emit(&self, event: LogEvent) {
        let Some(callback) = &self.callback else {
            return;
        };
        if !self.levels.contains(&event.level) {
            return;
        }
        callback(event);
    }

    pub fn query(&self, sql: &str, param_count: usize, duration: Duration) {
        self.emit(LogEvent {
            level: LogLevel::Query,
            message: "query".to_string(),
            query: self.include_sql.then(|| sql.to_string()),
            param_count: Some(param_count),
            duration: Some(duration),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(LogEvent {
            level: LogLevel::Warning,
            message: message.into(),
            query: None,
            param_count: None,
            duration: None,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogEvent {
            level: LogLevel::Error,
            message: message.into(),
            query: None,
            param_count: None,
            duration: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn level_filtering_and_sql_elision() {
        let seen: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let logger = QueryLogger::new(
            Some(Arc::new(move |event| sink.lock().unwrap().push(event))),
            vec![LogLevel::Query],
            false,
        );

        logger.query("SELECT 1", 0, Duration::from_millis(2));
        logger.warning("ignored");

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, LogLevel::Query);
        assert!(events[0].query.is_none());
    }
}
