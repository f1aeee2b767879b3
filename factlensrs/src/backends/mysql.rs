//! MySQL backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row};

use crate::config::FactLensConfig;
use crate::dialect::{Dialect, MySqlDialect};
use crate::error::{FactLensError, Result};
use crate::executor::{ColumnMeta, QueryResult};
use crate::models::Connection;

use super::BackendConnection;

pub struct MySqlBackend {
    pool: sqlx::MySqlPool,
    schema: Option<String>,
    query_timeout: Duration,
    dialect: MySqlDialect,
}

impl MySqlBackend {
    /// Build a bounded pool from a stored connection record. A selected
    /// schema overrides the record's database for every pooled session,
    /// since in MySQL schema and database are the same namespace.
    pub async fn connect(connection: &Connection, config: &FactLensConfig) -> Result<Self> {
        let defaults = config.pool_defaults(connection.dialect);
        let pool_size = connection.pool_size.unwrap_or(defaults.pool_size);
        let connect_timeout = Duration::from_millis(
            connection
                .connect_timeout_ms
                .unwrap_or(defaults.connect_timeout_ms),
        );

        tracing::info!(
            host = %connection.host,
            database = %connection.database,
            pool_size,
            "creating MySQL connection pool"
        );

        let database = connection
            .selected_schema
            .as_deref()
            .unwrap_or(&connection.database);
        let options = MySqlConnectOptions::new()
            .host(&connection.host)
            .port(connection.port)
            .username(&connection.username)
            .password(&connection.password)
            .database(database);

        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size as u32)
            .acquire_timeout(connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to create MySQL pool");
                FactLensError::PoolAcquisition {
                    message: format!("create mysql pool: {e}"),
                    retryable: false,
                }
            })?;

        Ok(Self {
            pool,
            schema: connection.selected_schema.clone(),
            query_timeout: Duration::from_millis(config.defaults.query.timeout_ms),
            dialect: MySqlDialect,
        })
    }

    fn execution_error(sql: &str, e: sqlx::Error) -> FactLensError {
        match e {
            sqlx::Error::PoolTimedOut => FactLensError::PoolAcquisition {
                message: "get mysql connection: pool timed out".to_string(),
                retryable: true,
            },
            other => FactLensError::Execution {
                sql: sql.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Same classification for catalog lookups: pool exhaustion stays a
    /// retryable acquisition failure, everything else is an introspection
    /// failure on the table.
    fn introspection_error(table: &str, e: sqlx::Error) -> FactLensError {
        match e {
            sqlx::Error::PoolTimedOut => FactLensError::PoolAcquisition {
                message: "get mysql connection: pool timed out".to_string(),
                retryable: true,
            },
            other => FactLensError::Introspection {
                table: table.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl BackendConnection for MySqlBackend {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<String>> {
        let start = Instant::now();
        let rows = sqlx::query(self.dialect.columns_query())
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::introspection_error(table, e))?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get(0)
                .map_err(|e| Self::introspection_error(table, e))?;
            columns.push(name);
        }
        tracing::debug!(
            table,
            columns = columns.len(),
            ms = start.elapsed().as_millis(),
            "mysql fetch_columns"
        );
        Ok(columns)
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        tracing::trace!(sql = %sql, "executing MySQL query");

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(Option::<String>::None),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.bind(i)
                    } else {
                        query.bind(n.as_f64().unwrap_or(f64::NAN))
                    }
                }
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }

        let rows = super::with_query_deadline(sql, self.query_timeout, async {
            query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Self::execution_error(sql, e))
        })
        .await?;

        let mut columns: Vec<ColumnMeta> = Vec::new();
        if let Some(first_row) = rows.first() {
            columns = first_row
                .columns()
                .iter()
                .map(|col| ColumnMeta {
                    name: col.name().to_string(),
                })
                .collect();
        }

        let mut result_rows = Vec::new();
        for row in &rows {
            let mut map = serde_json::Map::new();
            for (idx, col) in row.columns().iter().enumerate() {
                map.insert(col.name().to_string(), mysql_value_to_json(row, idx));
            }
            result_rows.push(map);
        }

        tracing::debug!(
            rows = result_rows.len(),
            columns = columns.len(),
            ms = start.elapsed().as_millis(),
            "mysql execute_sql"
        );

        Ok(QueryResult {
            columns,
            rows: result_rows,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Convert a MySQL value to JSON by trying decodes in order of likelihood.
/// Aggregates over integer columns come back as DECIMAL, so BigDecimal is
/// tried before the plain numeric types.
fn mysql_value_to_json(row: &MySqlRow, idx: usize) -> Value {
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(idx) {
        return v
            .and_then(|bd| bd.to_string().parse::<f64>().ok())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}
