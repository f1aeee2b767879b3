//! PostgreSQL dialect implementation.

use crate::models::AggregateFn;

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, idx: usize) -> String {
        format!("${}", idx + 1) // PostgreSQL uses $1, $2, ...
    }

    fn render_aggregation(&self, agg: AggregateFn, expr: &str) -> String {
        match agg {
            AggregateFn::Sum => format!("SUM({expr})"),
            AggregateFn::Avg => format!("AVG({expr})"),
            AggregateFn::Count => format!("COUNT({expr})"),
            AggregateFn::Min => format!("MIN({expr})"),
            AggregateFn::Max => format!("MAX({expr})"),
            // No MEDIAN aggregate in PostgreSQL
            AggregateFn::Median => {
                format!("PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY {expr})")
            }
            AggregateFn::Stddev => format!("STDDEV_POP({expr})"),
            AggregateFn::Variance => format!("VAR_POP({expr})"),
        }
    }

    fn columns_query(&self) -> &'static str {
        r#"
            SELECT column_name
            FROM information_schema.columns
            WHERE table_schema = COALESCE($1, current_schema())
              AND table_name = $2
            ORDER BY ordinal_position
        "#
    }
}
