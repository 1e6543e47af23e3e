//! Dialect capability flags.

/// What a dialect can do. The planner consults these before emitting
/// RETURNING, CTEs embedding DML, FULL OUTER JOIN, or LATERAL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_returning: bool,
    pub supports_cte_with_mutations: bool,
    pub supports_full_outer_join: bool,
    pub supports_lateral_joins: bool,
}

impl Capabilities {
    pub const POSTGRES: Capabilities = Capabilities {
        supports_returning: true,
        supports_cte_with_mutations: true,
        supports_full_outer_join: true,
        supports_lateral_joins: true,
    };

    pub const MYSQL: Capabilities = Capabilities {
        supports_returning: false,
        supports_cte_with_mutations: false,
        supports_full_outer_join: false,
        supports_lateral_joins: true,
    };

    /// SQLite 3.35+ supports RETURNING; it has no LATERAL.
    pub const SQLITE: Capabilities = Capabilities {
        supports_returning: true,
        supports_cte_with_mutations: false,
        supports_full_outer_join: false,
        supports_lateral_joins: false,
    };
}
