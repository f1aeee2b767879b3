//! Request-scoped table-column memoization.
//!
//! Join resolution may need the column list of the same table for several
//! fact/dimension pairs; the cache bounds catalog round-trips to one per
//! distinct table per request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::BackendConnection;
use crate::error::Result;

#[derive(Default)]
pub struct ColumnCache {
    columns: HashMap<String, Arc<Vec<String>>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names of `table` in catalog (ordinal) order.
    pub async fn columns(
        &mut self,
        backend: &dyn BackendConnection,
        table: &str,
    ) -> Result<Arc<Vec<String>>> {
        if let Some(cached) = self.columns.get(table) {
            return Ok(cached.clone());
        }
        let fetched = backend.fetch_columns(table).await?;
        tracing::debug!(table, count = fetched.len(), "introspected table columns");
        let arc = Arc::new(fetched);
        self.columns.insert(table.to_string(), arc.clone());
        Ok(arc)
    }
}
