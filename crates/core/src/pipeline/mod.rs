//! End-to-end load of the H&M extracts into the star schema
//!
//! The pipeline runs these stages strictly in order:
//!
//! 1. **Extract**: unpack the archive and resolve the four source files
//! 2. **Reset** (optional): drop target and staging tables
//! 3. **EnsureStaging** / **EnsureTargets**: create tables if absent
//! 4. **Truncate**: empty staging, fact and dimension tables
//! 5. **LoadStaging**: bulk-copy articles, customers, weather and transactions
//! 6. **DimArticle**, **DimCustomer**, **DimDate**: populate dimensions
//! 7. **FactSales**: populate the fact table
//! 8. **Validate**: log row counts
//!
//! Extraction runs before a connection is opened. Every database stage
//! commits on its own unless `single_transaction` is set, in which case the
//! whole run commits or rolls back as one.
//!
//! # Example
//!
//! ```rust,ignore
//! use hm_dwh_core::pipeline::{PipelineConfig, PipelineExecutor};
//!
//! let config = PipelineConfig::new("hm_2019.zip")
//!     .with_database("hm")
//!     .with_user("etl")
//!     .with_reset(true);
//!
//! let mut executor = PipelineExecutor::new(config)?;
//! let report = executor.run().await?;
//!
//! println!("Load completed in {}", report.duration_formatted());
//! ```

mod config;
mod error;
mod executor;
mod report;

pub use config::{DatabaseStage, PipelineConfig, PipelineStage};
pub use error::{PipelineError, PipelineResult};
pub use executor::PipelineExecutor;
pub use report::{PipelineReport, PipelineStatus, StageOutput};

/// Run a pipeline with the given configuration
pub async fn run_pipeline(config: PipelineConfig) -> PipelineResult<PipelineReport> {
    let mut executor = PipelineExecutor::new(config)?;
    executor.run().await
}
