//! Database backend implementations and the process-wide pool registry.
//!
//! Each driver is implemented in its own file and gated behind a feature
//! flag.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::catalog::MetadataCatalog;
use crate::config::FactLensConfig;
use crate::dialect::Dialect;
use crate::error::{FactLensError, Result};
use crate::executor::QueryResult;
use crate::models::Connection;

/// Unified interface over one pooled database.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync);

    /// Column names of `table` in catalog order, via the engine's
    /// `information_schema`.
    async fn fetch_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Execute `sql` with bound parameters and return normalized rows.
    /// Leased clients are returned to the pool on success and failure.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Drain the pool. Called once at process shutdown.
    async fn close(&self);
}

impl std::fmt::Debug for dyn BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BackendConnection")
    }
}

/// Builds a backend for a connection record. The indirection exists so the
/// registry can be exercised without live databases.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(
        &self,
        connection: &Connection,
        config: &FactLensConfig,
    ) -> Result<Arc<dyn BackendConnection>>;
}

/// Process-wide cache of one live pool per connection id.
///
/// Creation is guarded per key: the cell for an id is installed under the
/// map lock, the pool built through `get_or_try_init` outside it, so
/// concurrent first acquisitions for the same id build exactly one pool.
/// A failed creation leaves the cell empty and the next acquisition
/// retries.
pub struct PoolRegistry {
    pools: Mutex<HashMap<i64, Arc<OnceCell<Arc<dyn BackendConnection>>>>>,
    factory: Arc<dyn BackendFactory>,
    config: FactLensConfig,
}

impl PoolRegistry {
    pub fn new(config: FactLensConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            factory,
            config,
        }
    }

    /// Memoized pool for a connection id, checking ownership first.
    pub async fn acquire(
        &self,
        catalog: &MetadataCatalog,
        connection_id: i64,
        user_id: i64,
    ) -> Result<Arc<dyn BackendConnection>> {
        let record = catalog.connection(connection_id)?;
        if record.owner_user_id != user_id {
            return Err(FactLensError::UnauthorizedConnection(connection_id));
        }

        let cell = {
            let mut pools = self.pools.lock().await;
            pools
                .entry(connection_id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let backend = cell
            .get_or_try_init(|| async {
                tracing::info!(
                    connection_id,
                    dialect = %record.dialect,
                    "creating connection pool"
                );
                self.factory.connect(record, &self.config).await
            })
            .await?;
        Ok(backend.clone())
    }

    /// Drain every created pool. Torn down once at process shutdown.
    pub async fn shutdown(&self) {
        let cells: Vec<_> = {
            let pools = self.pools.lock().await;
            pools.values().cloned().collect()
        };
        for cell in cells {
            if let Some(backend) = cell.get() {
                backend.close().await;
            }
        }
    }
}

/// Bound a driver call by the configured query timeout. On expiry the
/// in-flight future is dropped, which releases its pooled client.
pub(crate) async fn with_query_deadline<T>(
    sql: &str,
    deadline: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(sql = %sql, ms = deadline.as_millis(), "query timed out");
            Err(FactLensError::Execution {
                sql: sql.to_string(),
                message: format!("query timed out after {}ms", deadline.as_millis()),
            })
        }
    }
}

/// Default factory dispatching on the connection's dialect tag.
#[derive(Debug, Default)]
pub struct DriverFactory;

#[async_trait]
impl BackendFactory for DriverFactory {
    async fn connect(
        &self,
        connection: &Connection,
        config: &FactLensConfig,
    ) -> Result<Arc<dyn BackendConnection>> {
        match connection.dialect {
            #[cfg(feature = "postgres")]
            crate::models::DialectKind::Postgres => Ok(Arc::new(
                postgres::PostgresBackend::connect(connection, config).await?,
            )),
            #[cfg(feature = "mysql")]
            crate::models::DialectKind::MySql => Ok(Arc::new(
                mysql::MySqlBackend::connect(connection, config).await?,
            )),
            #[allow(unreachable_patterns)]
            other => Err(FactLensError::UnsupportedDialect(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_converts_slow_queries_to_execution_errors() {
        let err = with_query_deadline("SELECT 1", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(42)
        })
        .await
        .unwrap_err();
        match err {
            FactLensError::Execution { sql, message } => {
                assert_eq!(sql, "SELECT 1");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_passes_fast_queries_through() {
        let value = with_query_deadline("SELECT 1", Duration::from_millis(100), async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;
