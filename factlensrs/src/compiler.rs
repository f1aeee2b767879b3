//! Top-level query compiler: request validation, join planning, SQL
//! assembly, and execution against the owning connection's pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backends::{BackendConnection, BackendFactory, DriverFactory, PoolRegistry};
use crate::catalog::MetadataCatalog;
use crate::config::FactLensConfig;
use crate::dialect::dialect_for;
use crate::error::{FactLensError, Result};
use crate::executor::QueryOutcome;
use crate::joins::{resolve_joins, JoinPlan};
use crate::kpi;
use crate::models::{
    DimensionFilter, Fact, FactDimensionMapping, FactQueryRequest, KpiQueryRequest,
};
use crate::query_builder::{ResolvedFilter, SqlBuilder};
use crate::schema::ColumnCache;

pub struct QueryCompiler {
    registry: PoolRegistry,
    builder: SqlBuilder,
}

impl QueryCompiler {
    pub fn new(config: FactLensConfig) -> Self {
        Self::with_factory(config, Arc::new(DriverFactory))
    }

    /// Compiler over a caller-supplied backend factory. Used by tests to
    /// substitute canned backends for live databases.
    pub fn with_factory(config: FactLensConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            registry: PoolRegistry::new(config, factory),
            builder: SqlBuilder,
        }
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Aggregate one or more facts, grouped by the requested dimensions.
    pub async fn run_fact_query(
        &self,
        catalog: &MetadataCatalog,
        request: &FactQueryRequest,
        user_id: i64,
    ) -> Result<QueryOutcome> {
        if request.fact_ids.is_empty() {
            return Err(FactLensError::InvalidReference(
                "fact query requires at least one fact".to_string(),
            ));
        }
        let mut facts: Vec<&Fact> = Vec::with_capacity(request.fact_ids.len());
        for &fact_id in &request.fact_ids {
            facts.push(catalog.fact(fact_id, request.connection_id)?);
        }

        let backend = self
            .registry
            .acquire(catalog, request.connection_id, user_id)
            .await?;
        let mut cache = ColumnCache::new();

        let resolve_ids = with_filter_dimensions(&request.dimension_ids, &request.filters);
        let plan = resolve_joins(
            catalog,
            backend.as_ref(),
            &mut cache,
            &facts,
            &resolve_ids,
            request.connection_id,
        )
        .await?;
        ensure_grouping_resolved(&plan, &request.dimension_ids)?;

        let selects: Vec<_> = request
            .dimension_ids
            .iter()
            .filter_map(|&id| plan.select_for(id))
            .collect();
        let mut warnings = plan.dropped.clone();
        let filters = resolve_filters(
            catalog,
            request.connection_id,
            &plan,
            &request.filters,
            &mut warnings,
        )?;

        let built = self.builder.build_fact_query(
            &facts,
            request.aggregation,
            &plan,
            &selects,
            &filters,
            backend.dialect(),
        )?;
        tracing::info!(
            connection_id = request.connection_id,
            facts = facts.len(),
            dimensions = selects.len(),
            sql = %built.sql,
            "running fact query"
        );
        let result = backend.execute_sql(&built.sql, &built.params).await?;
        Ok(QueryOutcome::new(built.sql, result, warnings))
    }

    /// Evaluate a KPI expression, grouped by the requested dimensions. The
    /// facts the expression references become the query's base facts; the
    /// first reference fixes the FROM table.
    pub async fn run_kpi_query(
        &self,
        catalog: &MetadataCatalog,
        request: &KpiQueryRequest,
        user_id: i64,
    ) -> Result<QueryOutcome> {
        let kpi_def = catalog.kpi(request.kpi_id, request.connection_id)?;
        let connection = catalog.connection(request.connection_id)?;

        // Expansion needs only the dialect, so it happens before any pool
        // is touched; a malformed KPI never costs a connection.
        let candidates = catalog.facts_for_connection(request.connection_id);
        let dialect = dialect_for(connection.dialect);
        let expanded = kpi::expand(&kpi_def.expression, &candidates, dialect)?;
        if expanded.fact_ids.is_empty() {
            return Err(FactLensError::InvalidReference(format!(
                "KPI '{}' references no known facts",
                kpi_def.name
            )));
        }
        let mut facts: Vec<&Fact> = Vec::with_capacity(expanded.fact_ids.len());
        for &fact_id in &expanded.fact_ids {
            facts.push(catalog.fact(fact_id, request.connection_id)?);
        }

        let backend = self
            .registry
            .acquire(catalog, request.connection_id, user_id)
            .await?;
        let mut cache = ColumnCache::new();

        let resolve_ids = with_filter_dimensions(&request.dimension_ids, &request.filters);
        let plan = resolve_joins(
            catalog,
            backend.as_ref(),
            &mut cache,
            &facts,
            &resolve_ids,
            request.connection_id,
        )
        .await?;
        ensure_grouping_resolved(&plan, &request.dimension_ids)?;

        let selects: Vec<_> = request
            .dimension_ids
            .iter()
            .filter_map(|&id| plan.select_for(id))
            .collect();
        let mut warnings = plan.dropped.clone();
        let filters = resolve_filters(
            catalog,
            request.connection_id,
            &plan,
            &request.filters,
            &mut warnings,
        )?;

        let built = self.builder.build_kpi_query(
            &expanded.sql,
            &plan,
            &selects,
            &filters,
            backend.dialect(),
        )?;
        tracing::info!(
            connection_id = request.connection_id,
            kpi = %kpi_def.name,
            sql = %built.sql,
            "running KPI query"
        );
        let result = backend.execute_sql(&built.sql, &built.params).await?;
        Ok(QueryOutcome::new(built.sql, result, warnings))
    }

    /// Execute a saved report with optional runtime filter overrides. A
    /// runtime value for a column replaces every stored filter on it.
    pub async fn run_report(
        &self,
        catalog: &MetadataCatalog,
        report_id: i64,
        runtime_filters: &BTreeMap<String, String>,
        user_id: i64,
    ) -> Result<QueryOutcome> {
        let report = catalog.report(report_id)?;
        let backend = self
            .registry
            .acquire(catalog, report.connection_id, user_id)
            .await?;

        let built = self
            .builder
            .build_report_query(report, runtime_filters, backend.dialect())?;
        tracing::info!(
            report_id,
            connection_id = report.connection_id,
            sql = %built.sql,
            "running report"
        );
        let result = backend.execute_sql(&built.sql, &built.params).await?;
        Ok(QueryOutcome::new(built.sql, result, Vec::new()))
    }

    /// Propose explicit mappings for every fact/dimension pair on a
    /// connection that shares a column name and has neither an existing
    /// mapping nor a shared table. Proposals are returned, not persisted.
    pub async fn auto_map(
        &self,
        catalog: &MetadataCatalog,
        connection_id: i64,
        user_id: i64,
    ) -> Result<Vec<FactDimensionMapping>> {
        let backend = self.registry.acquire(catalog, connection_id, user_id).await?;
        let mut cache = ColumnCache::new();
        let mut proposals = Vec::new();

        let dimensions = catalog.dimensions_for_connection(connection_id);
        for fact in catalog.facts_for_connection(connection_id) {
            for dimension in &dimensions {
                if catalog.mapping(fact.id, dimension.id).is_some()
                    || fact.table == dimension.table
                {
                    continue;
                }
                let common =
                    match common_column(backend.as_ref(), &mut cache, &fact.table, &dimension.table)
                        .await
                    {
                        Ok(column) => column,
                        Err(e) => {
                            // One unreadable table must not sink the scan.
                            tracing::warn!(
                                fact = %fact.name,
                                dimension = %dimension.name,
                                error = %e,
                                "skipping pair during auto-map"
                            );
                            continue;
                        }
                    };
                if let Some(column) = common {
                    proposals.push(FactDimensionMapping {
                        fact_id: fact.id,
                        dimension_id: dimension.id,
                        join_table: dimension.table.clone(),
                        fact_column: column.clone(),
                        dimension_column: column,
                    });
                }
            }
        }

        tracing::info!(connection_id, proposals = proposals.len(), "auto-map scan complete");
        Ok(proposals)
    }

    /// Drain every pool the compiler created.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// Dimension ids to resolve: the grouping list plus any filter-only
/// dimensions, in first-appearance order.
fn with_filter_dimensions(dimension_ids: &[i64], filters: &[DimensionFilter]) -> Vec<i64> {
    let mut ids: Vec<i64> = dimension_ids.to_vec();
    for filter in filters {
        if !ids.contains(&filter.dimension_id) {
            ids.push(filter.dimension_id);
        }
    }
    ids
}

/// A request that asked for grouping but kept none of its dimensions is an
/// error rather than an accidental grand total.
fn ensure_grouping_resolved(plan: &JoinPlan, dimension_ids: &[i64]) -> Result<()> {
    if !dimension_ids.is_empty() && dimension_ids.iter().all(|&id| plan.select_for(id).is_none())
    {
        return Err(FactLensError::NoResolvableDimensions);
    }
    Ok(())
}

fn resolve_filters(
    catalog: &MetadataCatalog,
    connection_id: i64,
    plan: &JoinPlan,
    filters: &[DimensionFilter],
    warnings: &mut Vec<String>,
) -> Result<Vec<ResolvedFilter>> {
    let mut resolved = Vec::with_capacity(filters.len());
    for filter in filters {
        match plan.select_for(filter.dimension_id) {
            Some(select) => resolved.push(ResolvedFilter {
                table: select.table.clone(),
                column: select.column.clone(),
                value: filter.value.clone(),
            }),
            None => {
                let name = catalog.dimension(filter.dimension_id, connection_id)?.name.clone();
                tracing::warn!(dimension = %name, "filter on unresolvable dimension ignored");
                warnings.push(format!(
                    "filter on dimension '{name}' was ignored because the dimension could not be joined"
                ));
            }
        }
    }
    Ok(resolved)
}

/// First column name shared by both tables, in the dimension table's
/// catalog order.
async fn common_column(
    backend: &dyn BackendConnection,
    cache: &mut ColumnCache,
    fact_table: &str,
    dimension_table: &str,
) -> Result<Option<String>> {
    let fact_columns = cache.columns(backend, fact_table).await?;
    let dimension_columns = cache.columns(backend, dimension_table).await?;
    let fact_set: std::collections::HashSet<&str> =
        fact_columns.iter().map(String::as_str).collect();
    Ok(dimension_columns
        .iter()
        .find(|c| fact_set.contains(c.as_str()))
        .cloned())
}
