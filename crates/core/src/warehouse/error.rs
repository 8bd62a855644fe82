//! Error types for warehouse operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while creating, loading or querying the warehouse
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Bulk copy into a table failed
    #[error("Bulk copy into {table} failed: {source}")]
    Copy {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Source file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Namespace is not a plain SQL identifier
    #[error("Invalid schema name '{0}'")]
    InvalidNamespace(String),

    /// Intermediate CSV could not be written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

impl WarehouseError {
    /// Wrap a copy failure with the target table
    pub fn copy(table: impl Into<String>, source: tokio_postgres::Error) -> Self {
        Self::Copy {
            table: table.into(),
            source,
        }
    }

    /// Wrap a read failure with the source path
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            WarehouseError::InvalidNamespace(name) => format!(
                "Invalid schema name '{name}'\n\n\
                Hint: Use letters, digits and underscores, starting with a letter or underscore."
            ),
            WarehouseError::Copy { table, source } => format!(
                "Bulk copy into {table} failed: {source}\n\n\
                Hint: Check that the CSV header and columns match the staging table."
            ),
            WarehouseError::Read { path, source } => format!(
                "Failed to read {}: {source}\n\nHint: Check the extracted file is readable.",
                path.display()
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = WarehouseError::read("/tmp/customers.csv", io_err);
        assert!(err.to_string().contains("/tmp/customers.csv"));
        assert!(err.user_message().contains("Hint:"));
    }

    #[test]
    fn test_invalid_namespace_message() {
        let err = WarehouseError::InvalidNamespace("bad-name".to_string());
        assert!(err.to_string().contains("bad-name"));
        assert!(err.user_message().contains("Hint:"));
    }
}
