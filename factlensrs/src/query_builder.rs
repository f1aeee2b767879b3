//! Clause assembly for the three request shapes: fact aggregation, KPI
//! aggregation, and report projection.
//!
//! Identifiers are dialect-quoted; every filter value becomes a bound
//! parameter in `BuiltQuery::params`, ordered to match the placeholders in
//! the SQL text.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{FactLensError, Result};
use crate::joins::{DimensionSelect, JoinPlan};
use crate::models::{AggregateFn, Fact, FilterOp, Report};
use crate::sql_ast::{
    Join, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, SqlRenderer, TableRef,
};

#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A dimension filter after its column has been resolved through the join plan.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    pub table: String,
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Default)]
pub struct SqlBuilder;

impl SqlBuilder {
    /// Fact aggregation: one aggregate per requested fact, dimension
    /// columns appended as plain selects, GROUP BY mirroring them. An
    /// empty dimension list produces neither dimension selects nor a
    /// GROUP BY clause.
    pub fn build_fact_query(
        &self,
        facts: &[&Fact],
        aggregation: Option<AggregateFn>,
        plan: &JoinPlan,
        selects: &[&DimensionSelect],
        filters: &[ResolvedFilter],
        dialect: &dyn Dialect,
    ) -> Result<BuiltQuery> {
        if facts.is_empty() {
            return Err(FactLensError::InvalidReference(
                "fact query requires at least one fact".to_string(),
            ));
        }

        let mut query = SelectQuery {
            from: TableRef {
                name: plan.base_table.clone(),
            },
            ..SelectQuery::default()
        };

        for fact in facts {
            query.select.push(SelectItem {
                expr: SqlExpr::Aggregate {
                    agg: aggregation.unwrap_or(fact.aggregate),
                    expr: Box::new(column(&fact.table, &fact.column)),
                },
                alias: Some(fact.name.clone()),
            });
        }

        self.append_dimensions(&mut query, selects);
        self.append_joins(&mut query, plan);
        let params = self.append_filters(&mut query, filters);

        Ok(BuiltQuery {
            sql: SqlRenderer::new(dialect).render_select(&query),
            params,
        })
    }

    /// KPI aggregation: the expanded expression selected as `value`, with
    /// the same dimension and join treatment as fact queries.
    pub fn build_kpi_query(
        &self,
        expanded_sql: &str,
        plan: &JoinPlan,
        selects: &[&DimensionSelect],
        filters: &[ResolvedFilter],
        dialect: &dyn Dialect,
    ) -> Result<BuiltQuery> {
        let mut query = SelectQuery {
            from: TableRef {
                name: plan.base_table.clone(),
            },
            ..SelectQuery::default()
        };
        query.select.push(SelectItem {
            expr: SqlExpr::Raw(expanded_sql.to_string()),
            alias: Some("value".to_string()),
        });

        self.append_dimensions(&mut query, selects);
        self.append_joins(&mut query, plan);
        let params = self.append_filters(&mut query, filters);

        Ok(BuiltQuery {
            sql: SqlRenderer::new(dialect).render_select(&query),
            params,
        })
    }

    /// Report projection: visible columns of a single base table, stored
    /// filters plus runtime equality overrides. A runtime override on a
    /// column replaces every stored filter on that column.
    pub fn build_report_query(
        &self,
        report: &Report,
        runtime_filters: &BTreeMap<String, String>,
        dialect: &dyn Dialect,
    ) -> Result<BuiltQuery> {
        let known_columns: HashSet<&str> =
            report.columns.iter().map(|c| c.name.as_str()).collect();
        for column in runtime_filters.keys() {
            if !known_columns.contains(column.as_str()) {
                return Err(FactLensError::InvalidReference(format!(
                    "report {} has no column '{}'",
                    report.id, column
                )));
            }
        }

        let mut visible: Vec<_> = report.columns.iter().filter(|c| c.visible).collect();
        visible.sort_by_key(|c| c.order_index);
        if visible.is_empty() {
            return Err(FactLensError::InvalidReference(format!(
                "report {} has no visible columns",
                report.id
            )));
        }

        let mut query = SelectQuery {
            from: TableRef {
                name: report.base_table.clone(),
            },
            ..SelectQuery::default()
        };
        for column_def in &visible {
            let alias = if column_def.alias.is_empty() {
                &column_def.name
            } else {
                &column_def.alias
            };
            query.select.push(SelectItem {
                expr: SqlExpr::Column {
                    table: None,
                    name: column_def.name.clone(),
                },
                alias: Some(alias.clone()),
            });
        }

        let mut params: Vec<Value> = Vec::new();

        let mut stored: Vec<_> = report
            .filters
            .iter()
            .filter(|f| !runtime_filters.contains_key(&f.column))
            .collect();
        stored.sort_by_key(|f| f.order_index);
        for filter in stored {
            let target = SqlExpr::Column {
                table: None,
                name: filter.column.clone(),
            };
            let expr = match filter.op {
                FilterOp::In | FilterOp::NotIn => {
                    let values: Vec<Value> = match &filter.value {
                        Value::Array(items) => items.clone(),
                        other => vec![other.clone()],
                    };
                    let indices: Vec<usize> = values
                        .into_iter()
                        .map(|v| {
                            params.push(v);
                            params.len() - 1
                        })
                        .collect();
                    SqlExpr::InList {
                        expr: Box::new(target),
                        params: indices,
                        negated: matches!(filter.op, FilterOp::NotIn),
                    }
                }
                op => {
                    params.push(filter.value.clone());
                    SqlExpr::BinaryOp {
                        op: binary_op(op),
                        left: Box::new(target),
                        right: Box::new(SqlExpr::Param(params.len() - 1)),
                    }
                }
            };
            query.filters.push(expr);
        }

        for (column_name, value) in runtime_filters {
            params.push(Value::String(value.clone()));
            query.filters.push(SqlExpr::BinaryOp {
                op: SqlBinaryOperator::Eq,
                left: Box::new(SqlExpr::Column {
                    table: None,
                    name: column_name.clone(),
                }),
                right: Box::new(SqlExpr::Param(params.len() - 1)),
            });
        }

        Ok(BuiltQuery {
            sql: SqlRenderer::new(dialect).render_select(&query),
            params,
        })
    }

    fn append_dimensions(&self, query: &mut SelectQuery, selects: &[&DimensionSelect]) {
        let mut grouped: HashSet<(String, String)> = HashSet::new();
        for select in selects {
            let expr = column(&select.table, &select.column);
            query.select.push(SelectItem {
                expr: expr.clone(),
                alias: Some(select.name.clone()),
            });
            // GROUP BY in select order, deduplicated.
            if grouped.insert((select.table.clone(), select.column.clone())) {
                query.group_by.push(expr);
            }
        }
    }

    /// One JOIN clause per edge, each bringing exactly one new table into
    /// scope: the dimension table when the edge's fact table is already
    /// reachable, otherwise the fact table (joined through the dimension
    /// table a previous edge introduced). An edge whose tables are both in
    /// scope already is skipped.
    fn append_joins(&self, query: &mut SelectQuery, plan: &JoinPlan) {
        let mut in_scope: HashSet<String> = HashSet::new();
        in_scope.insert(plan.base_table.clone());
        for edge in &plan.edges {
            let target = if in_scope.contains(&edge.fact_table) {
                &edge.table
            } else {
                &edge.fact_table
            };
            if !in_scope.insert(target.clone()) {
                continue;
            }
            query.joins.push(Join {
                table: TableRef {
                    name: target.clone(),
                },
                on: vec![SqlExpr::BinaryOp {
                    op: SqlBinaryOperator::Eq,
                    left: Box::new(column(&edge.table, &edge.dimension_column)),
                    right: Box::new(column(&edge.fact_table, &edge.fact_column)),
                }],
            });
        }
    }

    fn append_filters(&self, query: &mut SelectQuery, filters: &[ResolvedFilter]) -> Vec<Value> {
        let mut params = Vec::new();
        for filter in filters {
            params.push(filter.value.clone());
            query.filters.push(SqlExpr::BinaryOp {
                op: SqlBinaryOperator::Eq,
                left: Box::new(column(&filter.table, &filter.column)),
                right: Box::new(SqlExpr::Param(params.len() - 1)),
            });
        }
        params
    }
}

fn column(table: &str, name: &str) -> SqlExpr {
    SqlExpr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

fn binary_op(op: FilterOp) -> SqlBinaryOperator {
    match op {
        FilterOp::Eq => SqlBinaryOperator::Eq,
        FilterOp::Neq => SqlBinaryOperator::Neq,
        FilterOp::Gt => SqlBinaryOperator::Gt,
        FilterOp::Gte => SqlBinaryOperator::Gte,
        FilterOp::Lt => SqlBinaryOperator::Lt,
        FilterOp::Lte => SqlBinaryOperator::Lte,
        FilterOp::Like => SqlBinaryOperator::Like,
        FilterOp::In | FilterOp::NotIn => unreachable!("handled as IN list"),
    }
}
