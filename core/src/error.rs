use thiserror::Error;

pub type MapperResult<T> = Result<T, MapperError>;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at position {pos}: {msg}")]
    Parse { pos: usize, msg: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Expected one result (or null) to be returned by {statement}, but found: {found}")]
    TooManyResults { statement: String, found: usize },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Mapped statement '{0}' not found")]
    StatementNotFound(String),

    #[error("Recursive query on an in-flight result: {0}")]
    RecursiveQuery(String),

    #[error("Executor was closed")]
    ExecutorClosed,

    #[error("Cursor was closed")]
    CursorClosed,

    #[error("Cannot open more than one iterator on a cursor")]
    IteratorReused,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Interceptor error: {0}")]
    Interceptor(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl MapperError {
    /// Shorthand for a backend failure carrying the statement id it happened on.
    pub fn execution(statement: &str, cause: impl std::fmt::Display) -> Self {
        MapperError::Execution(format!("{statement}: {cause}"))
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(e: serde_json::Error) -> Self {
        MapperError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for MapperError {
    fn from(e: toml::de::Error) -> Self {
        MapperError::Config(e.to_string())
    }
}
