//! Error types for the mapper
//!
//! This module defines all error types that can occur while registering models,
//! building statements and talking to the database.

/// Result type alias for mapper operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for mapper and database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The connection manager has no handle yet
    #[error("Database not initialized")]
    NotInitialized,

    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Update requested on a model that was never persisted
    #[error("Identifier missing on {table}; update impossible")]
    MissingIdentifier { table: String },

    /// The driver did not report an auto-generated identifier after an insert
    #[error("No generated identifier reported for insert into {table}")]
    MissingGeneratedId { table: String },

    /// Type conversion error
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Text that should hold a number could not be parsed
    #[error("Cannot parse {input:?} as {target}")]
    Parse { target: &'static str, input: String },

    /// A number does not fit the requested type
    #[error("Value {value} out of range for {target}")]
    OutOfRange { target: &'static str, value: String },

    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Two fields of one model map to the same column
    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (configuration) error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// MySQL error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MysqlError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a connection timeout error
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        DatabaseError::ConnectionTimeout { timeout_ms }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a query timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        DatabaseError::QueryTimeout { timeout_ms }
    }

    /// Create a missing identifier error for `table`
    pub fn missing_identifier(table: impl Into<String>) -> Self {
        DatabaseError::MissingIdentifier {
            table: table.into(),
        }
    }

    /// Create a new type mismatch error
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        DatabaseError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a parse error for `input` targeting `target`
    pub fn parse(target: &'static str, input: impl Into<String>) -> Self {
        DatabaseError::Parse {
            target,
            input: input.into(),
        }
    }

    /// Create an out-of-range error for `value` targeting `target`
    pub fn out_of_range(target: &'static str, value: impl ToString) -> Self {
        DatabaseError::OutOfRange {
            target,
            value: value.to_string(),
        }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Config(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// True for failures caused by the connection rather than the statement
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::NotInitialized
                | DatabaseError::ConnectionError(_)
                | DatabaseError::ConnectionTimeout { .. }
        )
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for DatabaseError {
    fn from(err: mysql_async::Error) -> Self {
        DatabaseError::MysqlError(err.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::UrlError> for DatabaseError {
    fn from(err: mysql_async::UrlError) -> Self {
        DatabaseError::connection(format!("Invalid MySQL URL: {}", err))
    }
}
