//! Error types for the flatdb engine.
//!
//! All public APIs return `FlatDbResult<T>`.

use thiserror::Error;

/// Unified error type for all flatdb operations.
#[derive(Debug, Error)]
pub enum FlatDbError {
    // ───── configuration ─────
    /// Data source path resolves to neither a file nor a directory
    #[error("storage not found: {0}")]
    StorageNotFound(String),

    /// Invalid connection configuration
    #[error("configuration error: {0}")]
    Config(String),

    // ───── schema ─────
    /// Requested table does not exist in storage
    #[error("table '{table}' not found in '{path}'")]
    TableNotFound { table: String, path: String },

    /// Requested column does not exist
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Table already has a schema
    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    /// Column already exists
    #[error("column '{column}' already exists in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// Column name matches more than one column
    #[error("ambiguous column reference '{column}' in table '{table}'")]
    AmbiguousColumn { table: String, column: String },

    /// Type mismatch between expected and actual values
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Row has more values than the table has columns
    #[error("table '{table}' has {expected} columns but {actual} values were supplied")]
    RowArity {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Reading a table's storage failed part way; the table cannot be used
    /// until it is reloaded
    #[error("table '{table}' could not be read completely: {message}")]
    IncompleteLoad { table: String, message: String },

    // ───── capability ─────
    /// The configured format cannot perform the operation
    #[error("{feature} is not supported by the {format} format")]
    NotSupported { feature: String, format: String },

    // ───── syntax ─────
    /// SQL parsing error
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// Unsupported SQL feature
    #[error("SQL feature not supported: {feature}\nHint: {hint}")]
    SqlNotSupported { feature: String, hint: String },

    /// Filter evaluated before its function references were resolved
    #[error("unresolved function reference '{0}' in filter")]
    UnresolvedFunction(String),

    /// Unknown scalar function
    #[error("function '{0}' not found")]
    FunctionNotFound(String),

    /// Predicate text could not be parsed by the row matcher
    #[error("invalid predicate '{predicate}': {message}")]
    Predicate { predicate: String, message: String },

    // ───── parameter binding ─────
    /// Referenced parameter has no bound value
    #[error("must declare the scalar variable '{0}'")]
    MustDeclareScalar(String),

    // ───── transactions ─────
    /// Begin/commit/rollback used out of order
    #[error("transaction error: {0}")]
    TransactionState(String),

    // ───── wrapped ─────
    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Apache Arrow error (RecordBatch operations)
    #[error("arrow error: {source}")]
    Arrow {
        #[from]
        source: arrow::error::ArrowError,
    },

    /// Apache Parquet error (file I/O)
    #[error("parquet error: {source}")]
    Parquet {
        #[from]
        source: parquet::errors::ParquetError,
    },

    /// File watcher error
    #[error("watch error: {0}")]
    Watch(String),
}

/// Result type alias for all flatdb operations.
pub type FlatDbResult<T> = Result<T, FlatDbError>;

impl From<serde_json::Error> for FlatDbError {
    fn from(err: serde_json::Error) -> Self {
        FlatDbError::Serialization(err.to_string())
    }
}

impl From<notify::Error> for FlatDbError {
    fn from(err: notify::Error) -> Self {
        FlatDbError::Watch(err.to_string())
    }
}

impl FlatDbError {
    pub(crate) fn not_supported(feature: impl Into<String>, format: &str) -> Self {
        FlatDbError::NotSupported {
            feature: feature.into(),
            format: format.to_string(),
        }
    }
}
