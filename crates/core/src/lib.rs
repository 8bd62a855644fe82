//! HM DWH Core - loads the H&M 2019 extract into a PostgreSQL star schema
//!
//! Provides:
//! - Archive extraction and source file resolution
//! - Encoding-tolerant bulk loading into staging tables
//! - Row transforms for region codes, ages and age ranges
//! - Dimension and fact population with post-load validation
//! - A staged pipeline with a JSON run report

pub mod archive;
pub mod config;
pub mod pipeline;
pub mod progress;
pub mod transform;
pub mod warehouse;

// Re-export commonly used types
pub use archive::{ArchiveError, ExtractedArchive, SourceFile, SourcePaths};
pub use config::{ConfigError, ConnectionSettings, LoaderConfig, WarehouseSettings, sample_config};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineExecutor, PipelineReport, PipelineStage,
    PipelineStatus, run_pipeline,
};
pub use transform::{AgeRange, Numeric, age_range, region_from_postal, safe_int};
pub use warehouse::{Namespace, ValidationReport, Warehouse, WarehouseError};
