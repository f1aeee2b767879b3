//! Integration tests for join resolution against a canned backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use factlens::backends::BackendConnection;
use factlens::catalog::MetadataCatalog;
use factlens::dialect::{Dialect, PostgresDialect};
use factlens::error::{FactLensError, Result};
use factlens::executor::QueryResult;
use factlens::joins::resolve_joins;
use factlens::models::{
    AggregateFn, Connection, DialectKind, Dimension, Fact, FactDimensionMapping,
};
use factlens::schema::ColumnCache;

struct StubBackend {
    columns: HashMap<String, Vec<String>>,
    fetch_log: Mutex<Vec<String>>,
}

impl StubBackend {
    fn new(tables: &[(&str, &[&str])]) -> Self {
        let columns = tables
            .iter()
            .map(|(table, cols)| {
                (
                    table.to_string(),
                    cols.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect();
        Self {
            columns,
            fetch_log: Mutex::new(Vec::new()),
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetch_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendConnection for StubBackend {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &PostgresDialect
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<String>> {
        self.fetch_log.lock().unwrap().push(table.to_string());
        self.columns
            .get(table)
            .cloned()
            .ok_or_else(|| FactLensError::Introspection {
                table: table.to_string(),
                message: "unknown table".to_string(),
            })
    }

    async fn execute_sql(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult {
            columns: vec![],
            rows: vec![],
        })
    }

    async fn close(&self) {}
}

fn connection(id: i64) -> Connection {
    Connection {
        id,
        owner_user_id: 7,
        name: format!("conn{id}"),
        dialect: DialectKind::Postgres,
        host: "localhost".to_string(),
        port: 5432,
        database: "analytics".to_string(),
        username: "svc".to_string(),
        password: "secret".to_string(),
        selected_schema: None,
        pool_size: None,
        connect_timeout_ms: None,
    }
}

fn fact(id: i64, name: &str, table: &str, column: &str) -> Fact {
    Fact {
        id,
        connection_id: 1,
        name: name.to_string(),
        table: table.to_string(),
        column: column.to_string(),
        aggregate: AggregateFn::Sum,
    }
}

fn dimension(id: i64, name: &str, table: &str, column: &str) -> Dimension {
    Dimension {
        id,
        connection_id: 1,
        name: name.to_string(),
        table: table.to_string(),
        column: column.to_string(),
    }
}

#[tokio::test]
async fn explicit_mapping_wins_without_introspection() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![fact(1, "Revenue", "orders", "amount")],
        vec![dimension(10, "country", "customers", "country")],
        vec![FactDimensionMapping {
            fact_id: 1,
            dimension_id: 10,
            join_table: "customers".to_string(),
            fact_column: "customer_id".to_string(),
            dimension_column: "id".to_string(),
        }],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[]);
    let revenue = catalog.fact(1, 1).unwrap();
    let mut cache = ColumnCache::new();

    let plan = resolve_joins(&catalog, &backend, &mut cache, &[revenue], &[10], 1)
        .await
        .unwrap();

    assert_eq!(plan.base_table, "orders");
    assert_eq!(plan.edges.len(), 1);
    assert_eq!(plan.edges[0].table, "customers");
    assert_eq!(plan.edges[0].dimension_column, "id");
    assert_eq!(plan.edges[0].fact_column, "customer_id");
    assert_eq!(plan.selects[0].table, "customers");
    assert_eq!(plan.selects[0].column, "country");
    // Mapping resolution never touches the database.
    assert!(backend.fetched().is_empty());
}

#[tokio::test]
async fn same_table_dimension_needs_no_join() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![fact(1, "Revenue", "orders", "amount")],
        vec![dimension(10, "region", "orders", "region")],
        vec![],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[]);
    let revenue = catalog.fact(1, 1).unwrap();
    let mut cache = ColumnCache::new();

    let plan = resolve_joins(&catalog, &backend, &mut cache, &[revenue], &[10], 1)
        .await
        .unwrap();

    assert!(plan.edges.is_empty());
    assert_eq!(plan.selects[0].table, "orders");
    assert!(backend.fetched().is_empty());
}

#[tokio::test]
async fn common_column_fallback_picks_first_shared_column() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![fact(1, "Revenue", "orders", "amount")],
        vec![dimension(10, "country", "customers", "country")],
        vec![],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[
        ("orders", &["id", "customer_id", "amount"]),
        ("customers", &["customer_id", "name", "country"]),
    ]);
    let revenue = catalog.fact(1, 1).unwrap();
    let mut cache = ColumnCache::new();

    let plan = resolve_joins(&catalog, &backend, &mut cache, &[revenue], &[10], 1)
        .await
        .unwrap();

    assert_eq!(plan.edges.len(), 1);
    assert_eq!(plan.edges[0].dimension_column, "customer_id");
    assert_eq!(plan.edges[0].fact_column, "customer_id");
    assert_eq!(backend.fetched(), vec!["orders", "customers"]);
}

#[tokio::test]
async fn shared_dimension_joins_once_for_two_facts() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![
            fact(1, "Revenue", "orders", "amount"),
            fact(2, "Refunds", "orders", "refund"),
        ],
        vec![dimension(10, "country", "customers", "country")],
        vec![],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[
        ("orders", &["id", "customer_id", "amount", "refund"]),
        ("customers", &["customer_id", "country"]),
    ]);
    let revenue = catalog.fact(1, 1).unwrap();
    let refunds = catalog.fact(2, 1).unwrap();
    let mut cache = ColumnCache::new();

    let plan = resolve_joins(&catalog, &backend, &mut cache, &[revenue, refunds], &[10], 1)
        .await
        .unwrap();

    assert_eq!(plan.edges.len(), 1);
    // The cache keeps the second fact's resolution from re-introspecting.
    assert_eq!(backend.fetched(), vec!["orders", "customers"]);
}

#[tokio::test]
async fn facts_on_different_tables_each_get_an_edge() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![
            fact(1, "Revenue", "orders", "amount"),
            fact(2, "Paid", "payments", "paid"),
        ],
        vec![dimension(10, "Region", "regions", "name")],
        vec![],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[
        ("orders", &["id", "region_id", "amount"]),
        ("payments", &["id", "region_id", "paid"]),
        ("regions", &["region_id", "name"]),
    ]);
    let revenue = catalog.fact(1, 1).unwrap();
    let paid = catalog.fact(2, 1).unwrap();
    let mut cache = ColumnCache::new();

    let plan = resolve_joins(&catalog, &backend, &mut cache, &[revenue, paid], &[10], 1)
        .await
        .unwrap();

    assert_eq!(plan.base_table, "orders");
    assert_eq!(plan.edges.len(), 2);
    assert_eq!(plan.edges[0].fact_table, "orders");
    assert_eq!(plan.edges[1].fact_table, "payments");
    for edge in &plan.edges {
        assert_eq!(edge.table, "regions");
        assert_eq!(edge.dimension_column, "region_id");
        assert_eq!(edge.fact_column, "region_id");
    }
    assert_eq!(plan.selects.len(), 1);
    assert_eq!(plan.selects[0].table, "regions");
}

#[tokio::test]
async fn unreachable_dimension_is_dropped_with_warning() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![fact(1, "Revenue", "orders", "amount")],
        vec![
            dimension(10, "region", "orders", "region"),
            dimension(11, "weather", "weather_stations", "station_name"),
        ],
        vec![],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[
        ("orders", &["id", "region", "amount"]),
        ("weather_stations", &["station_id", "station_name"]),
    ]);
    let revenue = catalog.fact(1, 1).unwrap();
    let mut cache = ColumnCache::new();

    let plan = resolve_joins(&catalog, &backend, &mut cache, &[revenue], &[10, 11], 1)
        .await
        .unwrap();

    assert_eq!(plan.selects.len(), 1);
    assert!(plan.select_for(10).is_some());
    assert!(plan.select_for(11).is_none());
    assert_eq!(plan.dropped.len(), 1);
    assert!(plan.dropped[0].contains("weather"));
}

#[tokio::test]
async fn unknown_dimension_is_an_error() {
    let catalog = MetadataCatalog::from_parts(
        vec![connection(1)],
        vec![fact(1, "Revenue", "orders", "amount")],
        vec![],
        vec![],
        vec![],
        vec![],
    );
    let backend = StubBackend::new(&[]);
    let revenue = catalog.fact(1, 1).unwrap();
    let mut cache = ColumnCache::new();

    let err = resolve_joins(&catalog, &backend, &mut cache, &[revenue], &[99], 1)
        .await
        .unwrap_err();
    assert!(matches!(err, FactLensError::InvalidReference(_)));
}
