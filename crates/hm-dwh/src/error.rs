//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Archive not found: {0}")]
    FileNotFound(PathBuf),

    #[error("{0}")]
    ConfigError(String),

    #[error("{0}")]
    PipelineError(String),

    #[error("IO error: {0}")]
    IoError(String),
}
