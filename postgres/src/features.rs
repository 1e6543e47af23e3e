//! pgvector and PostGIS emitters.

use viborm_core::adapter::{GeoOps, VectorOps};
use viborm_core::query::GeoOp;
use viborm_core::sql::Sql;
use viborm_core::value::Value;

/// pgvector operators: `<->` (L2), `<=>` (cosine distance).
#[derive(Debug)]
pub(crate) struct PostgresVector;

impl PostgresVector {
    fn literal_text(values: &[f32]) -> String {
        let mut out = String::with_capacity(values.len() * 8 + 2);
        out.push('[');
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&v.to_string());
        }
        out.push(']');
        out
    }
}

impl VectorOps for PostgresVector {
    fn literal(&self, values: &[f32]) -> Sql {
        Sql::param(Value::Text(Self::literal_text(values))).push("::vector")
    }

    fn l2(&self, column: Sql, values: &[f32]) -> Sql {
        column.push(" <-> ").append(self.literal(values))
    }

    fn cosine(&self, column: Sql, values: &[f32]) -> Sql {
        column.push(" <=> ").append(self.literal(values))
    }
}

/// PostGIS predicates over geometry columns.
pub(crate) struct PostgresGeo;

impl GeoOps for PostgresGeo {
    fn point(&self, lng: f64, lat: f64) -> Sql {
        Sql::raw("ST_SetSRID(ST_MakePoint(")
            .append(Sql::param(Value::Float(lng)))
            .push(", ")
            .append(Sql::param(Value::Float(lat)))
            .push("), 4326)")
    }

    fn geometry(&self, value: Value) -> Sql {
        match value {
            Value::Json(json) => Sql::raw("ST_GeomFromGeoJSON(")
                .append(Sql::param(Value::Text(json.to_string())))
                .push(")"),
            other => Sql::raw("ST_GeomFromText(")
                .append(Sql::param(other))
                .push(", 4326)"),
        }
    }

    fn predicate(&self, op: GeoOp, lhs: Sql, rhs: Sql) -> Sql {
        let name = match op {
            GeoOp::Equals => "ST_Equals",
            GeoOp::Intersects => "ST_Intersects",
            GeoOp::Contains => "ST_Contains",
            GeoOp::Within => "ST_Within",
            GeoOp::Crosses => "ST_Crosses",
            GeoOp::Overlaps => "ST_Overlaps",
            GeoOp::Touches => "ST_Touches",
            GeoOp::Covers => "ST_Covers",
            GeoOp::DWithin(distance) => {
                return Sql::raw("ST_DWithin(")
                    .append(lhs)
                    .push(", ")
                    .append(rhs)
                    .push(", ")
                    .append(Sql::param(Value::Float(distance)))
                    .push(")");
            }
        };
        Sql::raw(name)
            .push("(")
            .append(lhs)
            .push(", ")
            .append(rhs)
            .push(")")
    }
}
