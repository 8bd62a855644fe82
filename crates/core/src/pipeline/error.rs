//! Error types for pipeline operations
//!
//! Errors chain to their underlying cause for debugging while providing
//! user-friendly messages for CLI output.

use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::warehouse::WarehouseError;

use super::config::PipelineStage;

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Archive could not be extracted or is incomplete
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Could not connect to the warehouse
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: WarehouseError,
    },

    /// Transaction could not be opened or committed
    #[error("Transaction {action} failed: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Stage failed with underlying cause
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: PipelineStage,
        #[source]
        source: WarehouseError,
    },

    /// Run report could not be written
    #[error("Failed to write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create a stage failure with underlying error
    pub fn stage_failure(stage: PipelineStage, source: WarehouseError) -> Self {
        Self::StageFailure { stage, source }
    }

    /// Wrap a failure to begin or commit a transaction
    pub fn transaction(action: &'static str, source: tokio_postgres::Error) -> Self {
        Self::Transaction { action, source }
    }

    /// Get the stage name if this is a stage error
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::StageFailure { stage, .. } => Some(stage.name()),
            PipelineError::Archive(_) => Some(PipelineStage::Extract.name()),
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!(
                    "Configuration error: {msg}\n\nHint: Check the config file, HM_DWH_* environment variables and command-line flags."
                )
            }
            PipelineError::Archive(err) => err.user_message(),
            PipelineError::Connect { target, source } => {
                format!(
                    "Failed to connect to {target}: {source}\n\nHint: Check that PostgreSQL is running and the credentials are correct."
                )
            }
            PipelineError::StageFailure { stage, source } => {
                format!("Stage '{stage}' failed: {}", source.user_message())
            }
            _ => self.to_string(),
        }
    }
}
