//! Join resolution between fact tables and dimension tables.
//!
//! Explicit mappings win; otherwise the resolver introspects both tables
//! and joins on the first common column name in catalog order. Dimensions
//! that share the fact's table are selected directly from it. A dimension
//! no fact can reach is dropped and reported, not an error, unless every
//! requested dimension drops.

use std::collections::HashSet;

use crate::backends::BackendConnection;
use crate::catalog::MetadataCatalog;
use crate::error::Result;
use crate::models::Fact;
use crate::schema::ColumnCache;

/// One equi-join edge: `JOIN table ON table.dimension_column = fact_table.fact_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub table: String,
    pub dimension_column: String,
    pub fact_table: String,
    pub fact_column: String,
}

/// Where a requested dimension's value is read from once joins are applied.
#[derive(Debug, Clone)]
pub struct DimensionSelect {
    pub dimension_id: i64,
    pub name: String,
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Default)]
pub struct JoinPlan {
    pub base_table: String,
    pub edges: Vec<JoinEdge>,
    pub selects: Vec<DimensionSelect>,
    /// Human-readable notes for dimensions dropped because no fact could
    /// reach them; surfaced to callers as warnings.
    pub dropped: Vec<String>,
}

impl JoinPlan {
    pub fn select_for(&self, dimension_id: i64) -> Option<&DimensionSelect> {
        self.selects.iter().find(|s| s.dimension_id == dimension_id)
    }
}

/// Resolve join edges and dimension selects for a set of base facts.
///
/// The base table for the eventual FROM clause is always the first fact's
/// table; additional facts and dimensions join relative to it.
pub async fn resolve_joins(
    catalog: &MetadataCatalog,
    backend: &dyn BackendConnection,
    cache: &mut ColumnCache,
    facts: &[&Fact],
    dimension_ids: &[i64],
    connection_id: i64,
) -> Result<JoinPlan> {
    let mut plan = JoinPlan {
        base_table: facts
            .first()
            .map(|f| f.table.clone())
            .unwrap_or_default(),
        ..JoinPlan::default()
    };
    let mut edge_keys: HashSet<(String, String, String)> = HashSet::new();
    let mut seen_dimensions: HashSet<i64> = HashSet::new();

    for &dimension_id in dimension_ids {
        if !seen_dimensions.insert(dimension_id) {
            continue;
        }
        let dimension = catalog.dimension(dimension_id, connection_id)?;
        let mut resolved = false;

        for fact in facts {
            if let Some(mapping) = catalog.mapping(fact.id, dimension_id) {
                push_edge(
                    &mut plan,
                    &mut edge_keys,
                    JoinEdge {
                        table: mapping.join_table.clone(),
                        dimension_column: mapping.dimension_column.clone(),
                        fact_table: fact.table.clone(),
                        fact_column: mapping.fact_column.clone(),
                    },
                );
                if !resolved {
                    plan.selects.push(DimensionSelect {
                        dimension_id,
                        name: dimension.name.clone(),
                        table: mapping.join_table.clone(),
                        column: dimension.column.clone(),
                    });
                    resolved = true;
                }
                continue;
            }

            if dimension.table == fact.table {
                // Same-table attribute: selected from the base table, no join.
                if !resolved {
                    plan.selects.push(DimensionSelect {
                        dimension_id,
                        name: dimension.name.clone(),
                        table: fact.table.clone(),
                        column: dimension.column.clone(),
                    });
                    resolved = true;
                }
                continue;
            }

            let fact_columns = cache.columns(backend, &fact.table).await?;
            let dimension_columns = cache.columns(backend, &dimension.table).await?;
            let fact_set: HashSet<&str> = fact_columns.iter().map(String::as_str).collect();
            let common = dimension_columns
                .iter()
                .find(|c| fact_set.contains(c.as_str()));

            match common {
                Some(column) => {
                    push_edge(
                        &mut plan,
                        &mut edge_keys,
                        JoinEdge {
                            table: dimension.table.clone(),
                            dimension_column: column.clone(),
                            fact_table: fact.table.clone(),
                            fact_column: column.clone(),
                        },
                    );
                    if !resolved {
                        plan.selects.push(DimensionSelect {
                            dimension_id,
                            name: dimension.name.clone(),
                            table: dimension.table.clone(),
                            column: dimension.column.clone(),
                        });
                        resolved = true;
                    }
                }
                None => {
                    tracing::debug!(
                        dimension = %dimension.name,
                        fact = %fact.name,
                        "no mapping and no common column between tables"
                    );
                }
            }
        }

        if !resolved {
            tracing::warn!(
                dimension = %dimension.name,
                "dimension unreachable from every requested fact, dropping"
            );
            plan.dropped.push(format!(
                "dimension '{}' could not be joined to any requested fact and was dropped",
                dimension.name
            ));
        }
    }

    Ok(plan)
}

fn push_edge(plan: &mut JoinPlan, keys: &mut HashSet<(String, String, String)>, edge: JoinEdge) {
    // Facts sharing one table reach the dimension through one edge; facts
    // on different tables each need their own, so the fact table is part
    // of the key.
    if keys.insert((
        edge.table.clone(),
        edge.dimension_column.clone(),
        edge.fact_table.clone(),
    )) {
        plan.edges.push(edge);
    }
}
