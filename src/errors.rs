use thiserror::Error;

/// Custom error type for database operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Error that occurs during database interactions (e.g., SQL query failure).
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// Configuration error (e.g., invalid database URL or missing parameters).
    #[error("Configuration error: {0}")]
    Config(String),
    /// Transaction error (e.g., failed to commit or rollback a transaction).
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// Connection error (e.g., issues with network or database connection).
    #[error("Connection error: {0}")]
    Connection(String),
    /// The catalog has no columns for the requested table.
    #[error("Table not found: {0}")]
    SchemaNotFound(String),
    #[error("Table {0} has no columns")]
    EmptySchema(String),
    #[error("No value for column {column} of table {table}")]
    MissingValue { table: String, column: String },
    /// Submitted form is missing one or more fields.
    #[error("Missing fields: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("Invalid row identity: {0}")]
    InvalidRowIdentity(String),
    #[error("Row {index} of table {table} does not exist")]
    RowNotFound { table: String, index: usize },
    #[error("Statement timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Export error: {0}")]
    Export(String),
    /// General error with a custom message.
    #[error("Error: {0}")]
    General(String),
}
