use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct ColumnMeta {
    pub name: String,
}

/// Rows as returned by a backend, normalized to string-keyed maps
/// regardless of driver row shape.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

/// What every query operation hands back to its caller: the generated SQL
/// (always, to support caller-side debugging and auditing), the rows, and
/// any warnings produced while resolving the request.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub sql: String,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
    pub warnings: Vec<String>,
}

impl QueryOutcome {
    pub fn new(sql: String, result: QueryResult, warnings: Vec<String>) -> Self {
        Self {
            sql,
            columns: result.columns,
            rows: result.rows,
            warnings,
        }
    }
}
