//! Error types for pgtable

use thiserror::Error;

/// Result type alias for pgtable operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Error types for query building and execution
#[derive(Debug, Error)]
pub enum SqlError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error raised by the underlying driver
    #[error("Driver error: {0}")]
    Driver(#[from] tokio_postgres::Error),

    /// Malformed condition handed to the condition compiler
    #[error("Condition error: {0}")]
    Condition(String),

    /// Invalid schema definition detected at DDL-compile time
    #[error("Schema error: {0}")]
    Schema(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// An execution failure annotated with the offending SQL text
    #[error("error while executing query:\n```sql\n{sql}\n```\n{source}")]
    Execute {
        sql: String,
        #[source]
        source: Box<SqlError>,
    },
}

impl SqlError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a condition-compile error
    pub fn condition(message: impl Into<String>) -> Self {
        Self::Condition(message.into())
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Annotate this error with the SQL text of the failing query.
    ///
    /// The original error stays reachable through `source()`.
    pub fn with_query(self, sql: impl Into<String>) -> Self {
        Self::Execute {
            sql: sql.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a condition-compile error
    pub fn is_condition(&self) -> bool {
        matches!(self, Self::Condition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_wraps_and_keeps_source() {
        let err = SqlError::connection("boom").with_query("SELECT 1");
        let text = err.to_string();
        assert!(text.contains("```sql\nSELECT 1\n```"));
        assert!(matches!(
            err,
            SqlError::Execute { ref source, .. } if matches!(**source, SqlError::Connection(_))
        ));
    }
}
