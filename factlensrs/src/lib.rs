pub mod backends;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod joins;
pub mod kpi;
pub mod models;
pub mod query_builder;
pub mod schema;
pub mod sql_ast;

/// Install a formatted subscriber honoring `RUST_LOG`. Call once from the
/// hosting binary; a second call is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

pub use backends::{BackendConnection, BackendFactory, PoolRegistry};
pub use catalog::MetadataCatalog;
pub use compiler::QueryCompiler;
pub use config::FactLensConfig;
pub use error::{FactLensError, Result};
pub use executor::{QueryOutcome, QueryResult};
pub use models::{FactQueryRequest, KpiQueryRequest};
pub use query_builder::SqlBuilder;
