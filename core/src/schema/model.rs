//! Model metadata.

use super::field::FieldState;
use super::relation::RelationState;
use crate::error::{Error, Result};
use indexmap::IndexMap;

/// A named unique constraint over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
}

/// A secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub fields: Vec<String>,
    /// Index method hint, e.g. `gin` on PostgreSQL.
    pub index_type: Option<String>,
}

/// Complete metadata for one model.
#[derive(Debug, Clone)]
pub struct ModelState {
    pub name: String,
    /// Table-name override; the model name is used when absent.
    pub table: Option<String>,
    pub fields: IndexMap<String, FieldState>,
    pub relations: IndexMap<String, RelationState>,
    /// Compound primary key, when the model has no single id field.
    pub primary_key: Option<Vec<String>>,
    pub uniques: Vec<UniqueConstraint>,
    pub indexes: Vec<IndexDef>,
}

impl ModelState {
    /// The database table this model maps to.
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Result<&FieldState> {
        self.fields.get(name).ok_or_else(|| Error::UnknownField {
            model: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn relation(&self, name: &str) -> Result<&RelationState> {
        self.relations
            .get(name)
            .ok_or_else(|| Error::UnknownRelation {
                model: self.name.clone(),
                relation: name.to_string(),
            })
    }

    /// Scalar fields in declaration order.
    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldState> {
        self.fields.values()
    }

    /// The id fields: single `is_id` field or the compound primary key.
    pub fn id_fields(&self) -> Vec<&FieldState> {
        if let Some(pk) = &self.primary_key {
            return pk.iter().filter_map(|name| self.fields.get(name)).collect();
        }
        self.fields.values().filter(|f| f.is_id).collect()
    }

    /// True when `fields` exactly covers a unique key (single unique field,
    /// the primary key, or a declared unique constraint).
    pub fn is_unique_key(&self, fields: &[&str]) -> bool {
        if fields.len() == 1 {
            if let Some(field) = self.fields.get(fields[0]) {
                if field.is_unique {
                    return true;
                }
            }
        }
        let mut sorted: Vec<&str> = fields.to_vec();
        sorted.sort_unstable();
        if let Some(pk) = &self.primary_key {
            let mut pk_sorted: Vec<&str> = pk.iter().map(String::as_str).collect();
            pk_sorted.sort_unstable();
            if pk_sorted == sorted {
                return true;
            }
        }
        self.uniques.iter().any(|unique| {
            let mut cols: Vec<&str> = unique.fields.iter().map(String::as_str).collect();
            cols.sort_unstable();
            cols == sorted
        })
    }
}
