//! Engine error taxonomy.
//!
//! Every variant carries a stable machine code (see [`Error::code`]) and a
//! [`Category`]. Constraint violations are surfaced verbatim from the driver
//! with a normalized discriminator derived from the SQLSTATE / native error
//! code.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category, stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Schema,
    Validation,
    Feature,
    Record,
    Constraint,
    Cache,
    Connection,
    Driver,
    Internal,
}

impl Category {
    pub const fn name(&self) -> &'static str {
        match self {
            Category::Schema => "schema",
            Category::Validation => "validation",
            Category::Feature => "feature",
            Category::Record => "record",
            Category::Constraint => "constraint",
            Category::Cache => "cache",
            Category::Connection => "connection",
            Category::Driver => "driver",
            Category::Internal => "internal",
        }
    }
}

/// Core error type for engine operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown model `{model}`")]
    UnknownModel { model: String },

    #[error("unknown field `{field}` on model `{model}`")]
    UnknownField { model: String, field: String },

    #[error("unknown relation `{relation}` on model `{model}`")]
    UnknownRelation { model: String, relation: String },

    #[error("invalid query for {model}.{operation}: {message}")]
    Validation {
        model: String,
        operation: &'static str,
        message: String,
    },

    #[error("type mismatch on `{field}`: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("`{feature}` is not supported on {dialect}")]
    FeatureNotSupported {
        feature: &'static str,
        dialect: &'static str,
    },

    #[error("no record found for {model}.{operation}")]
    RecordNotFound {
        model: String,
        operation: &'static str,
    },

    #[error("include tree on `{model}` exceeds the self-relation depth limit ({depth})")]
    QueryComplexity { model: String, depth: usize },

    #[error("unique constraint violation: {message}")]
    UniqueViolation { message: String },

    #[error("foreign key constraint violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("not-null constraint violation: {message}")]
    NotNullViolation { message: String },

    #[error("invalid cache TTL: {input}")]
    InvalidTtl { input: String },

    #[error("invalid cache key: {message}")]
    InvalidCacheKey { message: String },

    #[error("value cannot be cached: {reason}")]
    Uncacheable { reason: String },

    #[error("operation `{operation}` is not cacheable")]
    OperationNotCacheable { operation: &'static str },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {message}")]
    Driver {
        /// Driver-native error code (SQLSTATE or numeric), when available.
        code: Option<String>,
        message: String,
    },

    #[error("row decode error on column `{column}`: {message}")]
    Decode { column: String, message: String },

    #[error("not implemented: {feature}")]
    NotImplemented { feature: &'static str },

    #[error("unexpected engine state: {context}")]
    Unexpected { context: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine code for this error kind.
    pub const fn code(&self) -> &'static str {
        match self {
            Error::UnknownModel { .. } => "unknown_model",
            Error::UnknownField { .. } => "unknown_field",
            Error::UnknownRelation { .. } => "unknown_relation",
            Error::Validation { .. } => "invalid_payload",
            Error::TypeMismatch { .. } => "type_mismatch",
            Error::FeatureNotSupported { .. } => "feature_not_supported",
            Error::RecordNotFound { .. } => "record_not_found",
            Error::QueryComplexity { .. } => "query_complexity",
            Error::UniqueViolation { .. } => "unique_violation",
            Error::ForeignKeyViolation { .. } => "foreign_key_violation",
            Error::NotNullViolation { .. } => "not_null_violation",
            Error::InvalidTtl { .. } => "invalid_ttl",
            Error::InvalidCacheKey { .. } => "invalid_cache_key",
            Error::Uncacheable { .. } => "uncacheable_value",
            Error::OperationNotCacheable { .. } => "operation_not_cacheable",
            Error::Connection(_) => "connection_failed",
            Error::Driver { .. } => "driver_error",
            Error::Decode { .. } => "decode_error",
            Error::NotImplemented { .. } => "not_implemented",
            Error::Unexpected { .. } => "unexpected",
            Error::Json(_) => "json_error",
        }
    }

    pub const fn category(&self) -> Category {
        match self {
            Error::UnknownModel { .. }
            | Error::UnknownField { .. }
            | Error::UnknownRelation { .. } => Category::Schema,
            Error::Validation { .. } | Error::TypeMismatch { .. } => Category::Validation,
            Error::FeatureNotSupported { .. } => Category::Feature,
            Error::RecordNotFound { .. } => Category::Record,
            Error::QueryComplexity { .. } => Category::Validation,
            Error::UniqueViolation { .. }
            | Error::ForeignKeyViolation { .. }
            | Error::NotNullViolation { .. } => Category::Constraint,
            Error::InvalidTtl { .. }
            | Error::InvalidCacheKey { .. }
            | Error::Uncacheable { .. }
            | Error::OperationNotCacheable { .. } => Category::Cache,
            Error::Connection(_) => Category::Connection,
            Error::Driver { .. } | Error::Decode { .. } => Category::Driver,
            Error::NotImplemented { .. } | Error::Unexpected { .. } | Error::Json(_) => {
                Category::Internal
            }
        }
    }

    /// Short remediation hints, where any exist for the kind.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Error::UnknownField { .. } => {
                &["check the field name against the model definition"]
            }
            Error::FeatureNotSupported { .. } => {
                &["gate the call on the adapter's capability flags"]
            }
            Error::RecordNotFound { .. } => {
                &["use the non-throwing variant to receive None instead"]
            }
            Error::QueryComplexity { .. } => &["flatten the include tree or page the relation"],
            Error::InvalidTtl { .. } => &["use a duration like \"20 seconds\" or \"1 hour\""],
            Error::OperationNotCacheable { .. } => &["only read operations can be cached"],
            _ => &[],
        }
    }

    /// True if this is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::UniqueViolation { .. })
    }

    /// True if this is a missing-record error from an `*_or_throw` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RecordNotFound { .. })
    }

    /// Normalizes a driver error into a constraint-violation variant where the
    /// native code identifies one, and a generic driver error otherwise.
    ///
    /// Recognized codes: PostgreSQL SQLSTATE 23505/23503/23502, MySQL 1062/
    /// 1452/1048, SQLite extended codes 2067/787/1299. SQLite builds that only
    /// report primary codes are caught by message sniffing.
    pub fn from_driver(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        if let Some(code) = code {
            match code {
                "23505" | "1062" | "2067" | "1555" => {
                    return Error::UniqueViolation { message };
                }
                "23503" | "1452" | "787" => {
                    return Error::ForeignKeyViolation { message };
                }
                "23502" | "1048" | "1299" => {
                    return Error::NotNullViolation { message };
                }
                _ => {}
            }
        }
        if message.contains("UNIQUE constraint failed") {
            return Error::UniqueViolation { message };
        }
        if message.contains("FOREIGN KEY constraint failed") {
            return Error::ForeignKeyViolation { message };
        }
        if message.contains("NOT NULL constraint failed") {
            return Error::NotNullViolation { message };
        }
        Error::Driver {
            code: code.map(str::to_string),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_normalization() {
        let err = Error::from_driver(Some("23505"), "duplicate key value");
        assert!(err.is_unique_violation());
        assert_eq!(err.code(), "unique_violation");
        assert_eq!(err.category(), Category::Constraint);

        let err = Error::from_driver(Some("1452"), "fk fails");
        assert!(matches!(err, Error::ForeignKeyViolation { .. }));
    }

    #[test]
    fn sqlite_message_sniffing() {
        let err = Error::from_driver(None, "UNIQUE constraint failed: user.email");
        assert!(err.is_unique_violation());
    }

    #[test]
    fn unknown_code_stays_verbatim() {
        let err = Error::from_driver(Some("42P01"), "relation does not exist");
        match err {
            Error::Driver { code, message } => {
                assert_eq!(code.as_deref(), Some("42P01"));
                assert_eq!(message, "relation does not exist");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
