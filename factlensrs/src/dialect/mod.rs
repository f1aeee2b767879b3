//! Per-engine SQL rendering.
//!
//! Dialects render identifiers, bound-parameter placeholders, aggregate
//! fragments, and carry the catalog-query template used by schema
//! introspection. Clause composition lives in the query builder.

use crate::models::{AggregateFn, DialectKind};

pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;

    /// Placeholder for the zero-based parameter index.
    fn placeholder(&self, idx: usize) -> String;

    fn render_aggregation(&self, agg: AggregateFn, expr: &str) -> String {
        match agg {
            AggregateFn::Sum => format!("SUM({expr})"),
            AggregateFn::Avg => format!("AVG({expr})"),
            AggregateFn::Count => format!("COUNT({expr})"),
            AggregateFn::Min => format!("MIN({expr})"),
            AggregateFn::Max => format!("MAX({expr})"),
            AggregateFn::Median => format!("MEDIAN({expr})"),
            AggregateFn::Stddev => format!("STDDEV_POP({expr})"),
            AggregateFn::Variance => format!("VAR_POP({expr})"),
        }
    }

    /// `information_schema.columns` lookup with two bound parameters:
    /// optional schema (NULL means the session default) and table name.
    /// Must return column names in ordinal position order.
    fn columns_query(&self) -> &'static str;
}

mod mysql;
mod postgres;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

/// Static dialect instance for an engine tag.
pub fn dialect_for(kind: DialectKind) -> &'static (dyn Dialect + Send + Sync) {
    match kind {
        DialectKind::Postgres => &PostgresDialect,
        DialectKind::MySql => &MySqlDialect,
    }
}
