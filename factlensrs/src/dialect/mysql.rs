//! MySQL dialect implementation.
//!
//! MySQL differences from ANSI that matter here:
//! - Backtick identifier quoting (`` `name` ``)
//! - `?` positional placeholders
//! - No percentile aggregate (MEDIAN emulated via GROUP_CONCAT)

use crate::models::AggregateFn;

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _idx: usize) -> String {
        "?".to_string()
    }

    fn render_aggregation(&self, agg: AggregateFn, expr: &str) -> String {
        match agg {
            AggregateFn::Sum => format!("SUM({expr})"),
            AggregateFn::Avg => format!("AVG({expr})"),
            AggregateFn::Count => format!("COUNT({expr})"),
            AggregateFn::Min => format!("MIN({expr})"),
            AggregateFn::Max => format!("MAX({expr})"),
            // MySQL has neither MEDIAN nor PERCENTILE_CONT aggregates; the
            // ordered GROUP_CONCAT / SUBSTRING_INDEX trick picks the middle
            // element per group.
            AggregateFn::Median => format!(
                "CAST(SUBSTRING_INDEX(SUBSTRING_INDEX(GROUP_CONCAT({expr} ORDER BY {expr}), ',', CEIL(COUNT({expr}) / 2)), ',', -1) AS DECIMAL(20,6))"
            ),
            AggregateFn::Stddev => format!("STDDEV_POP({expr})"),
            AggregateFn::Variance => format!("VAR_POP({expr})"),
        }
    }

    fn columns_query(&self) -> &'static str {
        r#"
            SELECT column_name
            FROM information_schema.columns
            WHERE table_schema = COALESCE(?, DATABASE())
              AND table_name = ?
            ORDER BY ordinal_position
        "#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_with_backticks() {
        let d = MySqlDialect;
        assert_eq!(d.quote_ident("orders"), "`orders`");
        assert_eq!(d.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn placeholders_are_positional() {
        let d = MySqlDialect;
        assert_eq!(d.placeholder(0), "?");
        assert_eq!(d.placeholder(5), "?");
    }
}
