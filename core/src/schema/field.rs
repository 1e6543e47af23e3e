//! Scalar field metadata.

use crate::value::Value;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// The scalar kinds a column can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Int,
    Float,
    Decimal,
    BigInt,
    Boolean,
    DateTime { timezone: bool },
    Date,
    Time,
    Json,
    Blob,
    Enum { values: Vec<String> },
    Vector { dimensions: usize },
    Geometry,
}

impl FieldKind {
    pub const fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Decimal => "decimal",
            FieldKind::BigInt => "bigint",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime { .. } => "datetime",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Json => "json",
            FieldKind::Blob => "blob",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Vector { .. } => "vector",
            FieldKind::Geometry => "geometry",
        }
    }

    /// Kinds that may be declared as arrays.
    pub const fn supports_array(&self) -> bool {
        !matches!(self, FieldKind::Json | FieldKind::Vector { .. } | FieldKind::Geometry)
    }
}

/// A column default: either a literal or an engine-side generator tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Uuid,
    Ulid,
    Cuid,
    Nanoid,
    Now,
    /// Touched on every update as well as on create.
    UpdatedAt,
}

impl DefaultValue {
    /// Materializes the default engine-side. Literals clone; generator tags
    /// mint a fresh value.
    pub fn generate(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Uuid => Value::Uuid(uuid::Uuid::new_v4()),
            DefaultValue::Ulid => Value::Text(ulid::Ulid::new().to_string()),
            DefaultValue::Cuid => Value::Text(cuid::cuid2()),
            DefaultValue::Nanoid => Value::Text(nanoid::nanoid!()),
            DefaultValue::Now | DefaultValue::UpdatedAt => {
                Value::DateTime(Utc::now().fixed_offset())
            }
        }
    }
}

/// A single validation issue reported by a user validator.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

/// User-supplied value validator attached to a field.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> std::result::Result<(), Vec<Issue>>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> std::result::Result<(), Vec<Issue>> + Send + Sync,
{
    fn validate(&self, value: &Value) -> std::result::Result<(), Vec<Issue>> {
        self(value)
    }
}

/// Complete metadata for one scalar field.
#[derive(Clone)]
pub struct FieldState {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub array: bool,
    pub default: Option<DefaultValue>,
    pub is_id: bool,
    pub is_unique: bool,
    pub auto_increment: bool,
    /// Database column name when it differs from the field name.
    pub column: Option<String>,
    pub validator: Option<Arc<dyn Validator>>,
}

impl FieldState {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            array: false,
            default: None,
            is_id: false,
            is_unique: false,
            auto_increment: false,
            column: None,
            validator: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Marks the field as the primary key. Implies unique.
    pub fn id(mut self) -> Self {
        self.is_id = true;
        self.is_unique = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Overrides the database column name.
    pub fn mapped_to(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The database column this field maps to.
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for FieldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldState")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("array", &self.array)
            .field("default", &self.default)
            .field("is_id", &self.is_id)
            .field("is_unique", &self.is_unique)
            .field("auto_increment", &self.auto_increment)
            .field("column", &self.column)
            .field("validator", &self.validator.as_ref().map(|_| "<validator>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_implies_unique() {
        let field = FieldState::new("id", FieldKind::String).id();
        assert!(field.is_id);
        assert!(field.is_unique);
    }

    #[test]
    fn column_name_falls_back_to_field_name() {
        let plain = FieldState::new("email", FieldKind::String);
        assert_eq!(plain.column_name(), "email");
        let mapped = FieldState::new("email", FieldKind::String).mapped_to("email_address");
        assert_eq!(mapped.column_name(), "email_address");
    }

    #[test]
    fn generator_defaults_mint_fresh_values() {
        let a = DefaultValue::Uuid.generate();
        let b = DefaultValue::Uuid.generate();
        assert_ne!(a, b);
        assert!(matches!(DefaultValue::Now.generate(), Value::DateTime(_)));
    }
}
