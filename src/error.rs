use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GriddleError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Type mismatch for field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Field not found in schema: {0}")]
    FieldNotFound(String),

    #[error("Index is locked by another writer (waited {waited_ms} ms)")]
    IndexLocked { waited_ms: u64 },

    #[error("Worker already running")]
    WorkerRunning,

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GriddleError>;

impl From<std::io::Error> for GriddleError {
    fn from(e: std::io::Error) -> Self {
        GriddleError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for GriddleError {
    fn from(e: tantivy::TantivyError) -> Self {
        match e {
            tantivy::TantivyError::LockFailure(_, _) => GriddleError::IndexLocked { waited_ms: 0 },
            other => GriddleError::Tantivy(other.to_string()),
        }
    }
}

impl From<tantivy::query::QueryParserError> for GriddleError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        GriddleError::QueryParse(e.to_string())
    }
}

impl From<serde_json::Error> for GriddleError {
    fn from(e: serde_json::Error) -> Self {
        GriddleError::Json(e.to_string())
    }
}

impl GriddleError {
    /// Stable snake_case code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            GriddleError::InvalidQuery(_) => "invalid_query",
            GriddleError::InvalidSchema(_) => "invalid_schema",
            GriddleError::InvalidDocument(_) => "invalid_document",
            GriddleError::MissingField(_) => "missing_field",
            GriddleError::TypeMismatch { .. } => "type_mismatch",
            GriddleError::FieldNotFound(_) => "field_not_found",
            GriddleError::IndexLocked { .. } => "index_locked",
            GriddleError::WorkerRunning => "worker_running",
            GriddleError::JobFailed(_) => "job_failed",
            GriddleError::Io(_) => "io_error",
            GriddleError::Tantivy(_) => "tantivy_error",
            GriddleError::QueryParse(_) => "query_parse_error",
            GriddleError::Json(_) => "json_error",
            GriddleError::Config(_) => "config_error",
        }
    }

    /// True for errors caused by the caller's input rather than the index.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GriddleError::InvalidQuery(_)
                | GriddleError::InvalidDocument(_)
                | GriddleError::MissingField(_)
                | GriddleError::TypeMismatch { .. }
                | GriddleError::FieldNotFound(_)
                | GriddleError::QueryParse(_)
                | GriddleError::Json(_)
        )
    }
}
