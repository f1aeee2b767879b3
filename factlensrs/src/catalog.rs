use std::collections::HashMap;

use crate::error::{FactLensError, Result};
use crate::models::{Connection, Dimension, Fact, FactDimensionMapping, Kpi, Report};

/// Immutable metadata snapshot for the duration of one request.
///
/// Facts and dimensions keep their store order so that "first fact" and
/// auto-map iteration are deterministic.
#[derive(Debug, Default, Clone)]
pub struct MetadataCatalog {
    connections: HashMap<i64, Connection>,
    facts: Vec<Fact>,
    fact_index: HashMap<i64, usize>,
    dimensions: Vec<Dimension>,
    dimension_index: HashMap<i64, usize>,
    mappings: HashMap<(i64, i64), FactDimensionMapping>,
    kpis: HashMap<i64, Kpi>,
    reports: HashMap<i64, Report>,
}

impl MetadataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        connections: Vec<Connection>,
        facts: Vec<Fact>,
        dimensions: Vec<Dimension>,
        mappings: Vec<FactDimensionMapping>,
        kpis: Vec<Kpi>,
        reports: Vec<Report>,
    ) -> Self {
        let mut catalog = MetadataCatalog::new();
        for connection in connections {
            catalog.connections.insert(connection.id, connection);
        }
        for fact in facts {
            catalog.fact_index.insert(fact.id, catalog.facts.len());
            catalog.facts.push(fact);
        }
        for dimension in dimensions {
            catalog
                .dimension_index
                .insert(dimension.id, catalog.dimensions.len());
            catalog.dimensions.push(dimension);
        }
        for mapping in mappings {
            catalog
                .mappings
                .insert((mapping.fact_id, mapping.dimension_id), mapping);
        }
        for kpi in kpis {
            catalog.kpis.insert(kpi.id, kpi);
        }
        for report in reports {
            catalog.reports.insert(report.id, report);
        }
        catalog
    }

    pub fn connection(&self, id: i64) -> Result<&Connection> {
        self.connections
            .get(&id)
            .ok_or(FactLensError::UnknownConnection(id))
    }

    /// Look up a fact and check it belongs to the given connection.
    pub fn fact(&self, id: i64, connection_id: i64) -> Result<&Fact> {
        let fact = self
            .fact_index
            .get(&id)
            .map(|idx| &self.facts[*idx])
            .ok_or_else(|| FactLensError::InvalidReference(format!("unknown fact {id}")))?;
        if fact.connection_id != connection_id {
            return Err(FactLensError::InvalidReference(format!(
                "fact {id} does not belong to connection {connection_id}"
            )));
        }
        Ok(fact)
    }

    pub fn dimension(&self, id: i64, connection_id: i64) -> Result<&Dimension> {
        let dimension = self
            .dimension_index
            .get(&id)
            .map(|idx| &self.dimensions[*idx])
            .ok_or_else(|| FactLensError::InvalidReference(format!("unknown dimension {id}")))?;
        if dimension.connection_id != connection_id {
            return Err(FactLensError::InvalidReference(format!(
                "dimension {id} does not belong to connection {connection_id}"
            )));
        }
        Ok(dimension)
    }

    pub fn kpi(&self, id: i64, connection_id: i64) -> Result<&Kpi> {
        let kpi = self
            .kpis
            .get(&id)
            .ok_or_else(|| FactLensError::InvalidReference(format!("unknown KPI {id}")))?;
        if kpi.connection_id != connection_id {
            return Err(FactLensError::InvalidReference(format!(
                "KPI {id} does not belong to connection {connection_id}"
            )));
        }
        Ok(kpi)
    }

    pub fn report(&self, id: i64) -> Result<&Report> {
        self.reports
            .get(&id)
            .ok_or_else(|| FactLensError::InvalidReference(format!("unknown report {id}")))
    }

    pub fn mapping(&self, fact_id: i64, dimension_id: i64) -> Option<&FactDimensionMapping> {
        self.mappings.get(&(fact_id, dimension_id))
    }

    pub fn facts_for_connection(&self, connection_id: i64) -> Vec<&Fact> {
        self.facts
            .iter()
            .filter(|f| f.connection_id == connection_id)
            .collect()
    }

    pub fn dimensions_for_connection(&self, connection_id: i64) -> Vec<&Dimension> {
        self.dimensions
            .iter()
            .filter(|d| d.connection_id == connection_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateFn, DialectKind};

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

    fn fact(id: i64, connection_id: i64) -> Fact {
        Fact {
            id,
            connection_id,
            name: format!("fact{id}"),
            table: "orders".to_string(),
            column: "amount".to_string(),
            aggregate: AggregateFn::Sum,
        }
    }

    #[test]
    fn fact_lookup_enforces_connection_ownership() {
        let catalog = MetadataCatalog::from_parts(
            vec![connection(1), connection(2)],
            vec![fact(10, 1)],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        assert!(catalog.fact(10, 1).is_ok());
        assert!(matches!(
            catalog.fact(10, 2),
            Err(FactLensError::InvalidReference(_))
        ));
        assert!(matches!(
            catalog.fact(99, 1),
            Err(FactLensError::InvalidReference(_))
        ));
    }

    #[test]
    fn unknown_connection_is_its_own_error() {
        let catalog = MetadataCatalog::new();
        assert!(matches!(
            catalog.connection(5),
            Err(FactLensError::UnknownConnection(5))
        ));
    }
}
