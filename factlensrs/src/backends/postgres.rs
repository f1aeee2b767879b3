//! PostgreSQL backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::types::ToSql;

use crate::config::FactLensConfig;
use crate::dialect::{Dialect, PostgresDialect};
use crate::error::{FactLensError, Result};
use crate::executor::{ColumnMeta, QueryResult};
use crate::models::Connection;

use super::BackendConnection;

pub struct PostgresBackend {
    pool: deadpool_postgres::Pool,
    schema: Option<String>,
    query_timeout: Duration,
    dialect: PostgresDialect,
}

impl PostgresBackend {
    /// Build a bounded pool from a stored connection record. The search
    /// path, when configured, is applied once on a single pooled session
    /// and the client released.
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
            "creating PostgreSQL connection pool"
        );

        let mut cfg = deadpool_postgres::Config::new();
        cfg.host = Some(connection.host.clone());
        cfg.port = Some(connection.port);
        cfg.user = Some(connection.username.clone());
        cfg.password = Some(connection.password.clone());
        cfg.dbname = Some(connection.database.clone());
        cfg.connect_timeout = Some(connect_timeout);
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(pool_size);
        pool_cfg.timeouts.wait = Some(connect_timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| {
                tracing::error!(error = %e, "failed to create PostgreSQL pool");
                FactLensError::PoolAcquisition {
                    message: format!("create postgres pool: {e}"),
                    retryable: false,
                }
            })?;

        let backend = Self {
            pool,
            schema: connection.selected_schema.clone(),
            query_timeout: Duration::from_millis(config.defaults.query.timeout_ms),
            dialect: PostgresDialect,
        };

        if let Some(schema) = &backend.schema {
            let client = backend.checkout().await?;
            let set_sql = format!(
                "SET search_path TO {}",
                backend.dialect.quote_ident(schema)
            );
            client.batch_execute(&set_sql).await.map_err(|e| {
                FactLensError::PoolAcquisition {
                    message: format!("apply search_path: {e}"),
                    retryable: false,
                }
            })?;
        }

        Ok(backend)
    }

    async fn checkout(&self) -> Result<deadpool_postgres::Object> {
        let status = self.pool.status();
        tracing::debug!(
            available = status.available,
            size = status.size,
            max_size = status.max_size,
            "acquiring PostgreSQL connection"
        );
        self.pool.get().await.map_err(|e| {
            tracing::error!(error = %e, "failed to get PostgreSQL connection");
            let retryable = matches!(e, deadpool_postgres::PoolError::Timeout(_));
            FactLensError::PoolAcquisition {
                message: format!("get postgres connection: {e}"),
                retryable,
            }
        })
    }
}

#[async_trait]
impl BackendConnection for PostgresBackend {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<String>> {
        let start = Instant::now();
        let client = self.checkout().await?;
        let rows = client
            .query(self.dialect.columns_query(), &[&self.schema, &table])
            .await
            .map_err(|e| FactLensError::Introspection {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        let columns: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
        tracing::debug!(
            table,
            columns = columns.len(),
            ms = start.elapsed().as_millis(),
            "postgres fetch_columns"
        );
        Ok(columns)
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        tracing::trace!(sql = %sql, "executing PostgreSQL query");
        let client = self.checkout().await?;

        let boxed = pg_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = super::with_query_deadline(sql, self.query_timeout, async {
            client.query(sql, &refs).await.map_err(|e| {
                tracing::error!(error = %e, "PostgreSQL query execution failed");
                FactLensError::Execution {
                    sql: sql.to_string(),
                    message: e.to_string(),
                }
            })
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
                map.insert(col.name().to_string(), pg_value_to_json(row, idx, col));
            }
            result_rows.push(map);
        }

        tracing::debug!(
            rows = result_rows.len(),
            columns = columns.len(),
            ms = start.elapsed().as_millis(),
            "postgres execute_sql"
        );

        Ok(QueryResult {
            columns,
            rows: result_rows,
        })
    }

    async fn close(&self) {
        self.pool.close();
    }
}

fn pg_params(values: &[Value]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    values
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync + Send> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Bool(b) => Box::new(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Box::new(i)
                    } else {
                        Box::new(n.as_f64().unwrap_or(f64::NAN))
                    }
                }
                Value::String(s) => Box::new(s.clone()),
                other => Box::new(other.to_string()),
            }
        })
        .collect()
}

/// Convert a PostgreSQL value to JSON.
fn pg_value_to_json(
    row: &tokio_postgres::Row,
    idx: usize,
    col: &tokio_postgres::Column,
) -> Value {
    use tokio_postgres::types::Type;

    // Handle types explicitly, with fallbacks for aggregates
    match col.type_() {
        &Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        &Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        &Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        &Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        &Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v as f64).map(Value::Number))
            .unwrap_or(Value::Null),
        &Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))
            .unwrap_or(Value::Null),
        &Type::TEXT | &Type::VARCHAR | &Type::BPCHAR | &Type::NAME => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        &Type::NUMERIC => {
            // NUMERIC/DECIMAL - try f64 first (works for most aggregates),
            // then fall back to i64 for whole numbers
            if let Ok(Some(v)) = row.try_get::<_, Option<f64>>(idx) {
                serde_json::Number::from_f64(v)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            } else if let Ok(Some(v)) = row.try_get::<_, Option<i64>>(idx) {
                Value::Number(v.into())
            } else {
                Value::Null
            }
        }
        _ => {
            // For unknown types, try common conversions in order
            if let Ok(Some(v)) = row.try_get::<_, Option<String>>(idx) {
                Value::String(v)
            } else if let Ok(Some(v)) = row.try_get::<_, Option<f64>>(idx) {
                serde_json::Number::from_f64(v)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            } else if let Ok(Some(v)) = row.try_get::<_, Option<i64>>(idx) {
                Value::Number(v.into())
            } else {
                Value::Null
            }
        }
    }
}
