//! Optional feature groups: vector search and geospatial predicates.
//!
//! A dialect either supplies an implementation or reports the group as
//! unsupported; invoking an unsupported group is a [`FeatureNotSupported`]
//! error, never a silent no-op.
//!
//! [`FeatureNotSupported`]: crate::error::Error::FeatureNotSupported

use crate::error::{Error, Result};
use crate::query::GeoOp;
use crate::sql::Sql;

/// Vector-search fragment emitters (pgvector-style).
pub trait VectorOps: Send + Sync + std::fmt::Debug {
    /// A vector literal, e.g. `'[1,2,3]'::vector`.
    fn literal(&self, values: &[f32]) -> Sql;
    /// L2 distance between a column and a literal vector.
    fn l2(&self, column: Sql, values: &[f32]) -> Sql;
    /// Cosine distance between a column and a literal vector.
    fn cosine(&self, column: Sql, values: &[f32]) -> Sql;
}

/// Geospatial fragment emitters (PostGIS-style).
pub trait GeoOps: Send + Sync {
    /// A point literal from longitude/latitude.
    fn point(&self, lng: f64, lat: f64) -> Sql;
    /// A geometry parameter from its runtime value (WKT text or GeoJSON).
    fn geometry(&self, value: crate::value::Value) -> Sql;
    /// A binary spatial predicate. `GeoOp::DWithin` carries its distance.
    fn predicate(&self, op: GeoOp, lhs: Sql, rhs: Sql) -> Sql;
}

/// Tagged support for an optional feature group.
pub enum FeatureSupport<'a, T: ?Sized> {
    Supported(&'a T),
    Unsupported,
}

impl<'a, T: ?Sized> FeatureSupport<'a, T> {
    /// Unwraps the implementation or fails with `FeatureNotSupported`.
    pub fn require(self, feature: &'static str, dialect: &'static str) -> Result<&'a T> {
        match self {
            FeatureSupport::Supported(ops) => Ok(ops),
            FeatureSupport::Unsupported => Err(Error::FeatureNotSupported { feature, dialect }),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, FeatureSupport::Supported(_))
    }
}
