use factlens::dialect::{dialect_for, MySqlDialect, PostgresDialect};
use factlens::joins::{DimensionSelect, JoinEdge, JoinPlan};
use factlens::kpi;
use factlens::models::{AggregateFn, DialectKind, Fact};
use factlens::query_builder::{ResolvedFilter, SqlBuilder};

fn main() -> anyhow::Result<()> {
    factlens::init_tracing();

    let revenue = Fact {
        id: 1,
        connection_id: 1,
        name: "Revenue".to_string(),
        table: "orders".to_string(),
        column: "amount".to_string(),
        aggregate: AggregateFn::Sum,
    };
    let cost = Fact {
        id: 2,
        connection_id: 1,
        name: "Cost".to_string(),
        table: "orders".to_string(),
        column: "cost".to_string(),
        aggregate: AggregateFn::Sum,
    };

    let plan = JoinPlan {
        base_table: "orders".to_string(),
        edges: vec![JoinEdge {
            table: "customers".to_string(),
            dimension_column: "customer_id".to_string(),
            fact_table: "orders".to_string(),
            fact_column: "customer_id".to_string(),
        }],
        selects: vec![DimensionSelect {
            dimension_id: 10,
            name: "country".to_string(),
            table: "customers".to_string(),
            column: "country".to_string(),
        }],
        dropped: vec![],
    };
    let selects: Vec<&DimensionSelect> = plan.selects.iter().collect();
    let filters = vec![ResolvedFilter {
        table: "customers".to_string(),
        column: "country".to_string(),
        value: serde_json::Value::String("US".to_string()),
    }];

    let builder = SqlBuilder::default();
    for kind in [DialectKind::Postgres, DialectKind::MySql] {
        let dialect = dialect_for(kind);
        let built =
            builder.build_fact_query(&[&revenue], None, &plan, &selects, &filters, dialect)?;
        println!("[{kind}] {}", built.sql);
        println!("[{kind}] params: {:?}", built.params);
    }

    let expanded = kpi::expand("Revenue - Cost", &[&revenue, &cost], &PostgresDialect)?;
    let margin = builder.build_kpi_query(&expanded.sql, &plan, &selects, &[], &PostgresDialect)?;
    println!("[postgres kpi] {}", margin.sql);

    let expanded = kpi::expand("Revenue - Cost", &[&revenue, &cost], &MySqlDialect)?;
    let margin = builder.build_kpi_query(&expanded.sql, &plan, &selects, &[], &MySqlDialect)?;
    println!("[mysql kpi] {}", margin.sql);

    Ok(())
}
