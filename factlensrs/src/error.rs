use thiserror::Error;

pub type Result<T> = std::result::Result<T, FactLensError>;

#[derive(Debug, Error)]
pub enum FactLensError {
    #[error("unknown connection {0}")]
    UnknownConnection(i64),
    #[error("connection {0} is not owned by the requesting user")]
    UnauthorizedConnection(i64),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),
    #[error("none of the requested dimensions could be resolved")]
    NoResolvableDimensions,
    #[error("pool acquisition failed: {message}")]
    PoolAcquisition { message: String, retryable: bool },
    #[error("introspection of table {table} failed: {message}")]
    Introspection { table: String, message: String },
    #[error("execution failed: {message} (sql: {sql})")]
    Execution { sql: String, message: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FactLensError {
    /// Pool exhaustion is the one failure callers may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolAcquisition { retryable: true, .. })
    }
}
