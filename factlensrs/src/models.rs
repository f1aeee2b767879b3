use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine tag stored on a connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    MySql,
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Postgres => write!(f, "postgres"),
            DialectKind::MySql => write!(f, "mysql"),
        }
    }
}

/// One externally hosted database, owned by a user. Read-only to the
/// compiler; created and edited by the connection-management collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,
    pub owner_user_id: i64,
    pub name: String,
    pub dialect: DialectKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Schema (postgres search path) or selected database (mysql) applied
    /// once at pool creation.
    #[serde(default)]
    pub selected_schema: Option<String>,
    #[serde(default)]
    pub pool_size: Option<usize>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFn {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Median,
    Stddev,
    Variance,
}

/// A measure: an aggregatable column of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub connection_id: i64,
    pub name: String,
    pub table: String,
    pub column: String,
    pub aggregate: AggregateFn,
}

/// An attribute column queries can group and filter by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub id: i64,
    pub connection_id: i64,
    pub name: String,
    pub table: String,
    pub column: String,
}

/// Explicit join edge between a fact's table and a dimension's table.
/// Unique per `(fact_id, dimension_id)`. Rows produced by auto-map are
/// persisted by the metadata store, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactDimensionMapping {
    pub fact_id: i64,
    pub dimension_id: i64,
    pub join_table: String,
    pub fact_column: String,
    pub dimension_column: String,
}

/// A derived measure whose expression references fact names as bare
/// identifiers. Dimensions are supplied at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kpi {
    pub id: i64,
    pub connection_id: i64,
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportColumn {
    pub name: String,
    pub alias: String,
    #[serde(default)]
    pub data_type: Option<String>,
    pub visible: bool,
    pub order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
    pub editable: bool,
    pub order_index: i32,
}

/// Column-name to filter-name mapping into another report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrillThrough {
    pub target_report_id: i64,
    pub column_map: BTreeMap<String, String>,
}

/// Saved projection over one base table. Independent of the fact and
/// dimension model; it queries the base table directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub connection_id: i64,
    pub name: String,
    pub base_table: String,
    pub columns: Vec<ReportColumn>,
    #[serde(default)]
    pub filters: Vec<ReportFilter>,
    #[serde(default)]
    pub drill_throughs: Vec<DrillThrough>,
}

/// Equality filter pair against a resolved dimension column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub dimension_id: i64,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactQueryRequest {
    pub connection_id: i64,
    #[serde(default)]
    pub fact_ids: Vec<i64>,
    #[serde(default)]
    pub dimension_ids: Vec<i64>,
    /// Overrides every fact's own aggregate function when set.
    #[serde(default)]
    pub aggregation: Option<AggregateFn>,
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiQueryRequest {
    pub connection_id: i64,
    pub kpi_id: i64,
    #[serde(default)]
    pub dimension_ids: Vec<i64>,
    #[serde(default)]
    pub filters: Vec<DimensionFilter>,
}
