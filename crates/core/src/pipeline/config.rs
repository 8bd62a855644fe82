//! Pipeline configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConnectionSettings, LoaderConfig, WarehouseSettings};
use crate::warehouse::Namespace;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input zip archive
    pub archive: PathBuf,
    /// PostgreSQL connection settings
    pub connection: ConnectionSettings,
    /// Namespace, covered year and transaction settings
    pub warehouse: WarehouseSettings,
    /// Drop and recreate every table before loading
    pub reset: bool,
}

impl PipelineConfig {
    /// Create a pipeline config for an archive with default settings
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            connection: ConnectionSettings::default(),
            warehouse: WarehouseSettings::default(),
            reset: false,
        }
    }

    /// Create a pipeline config from layered loader settings
    pub fn from_loader(archive: impl Into<PathBuf>, loader: LoaderConfig) -> Self {
        Self {
            archive: archive.into(),
            connection: loader.connection,
            warehouse: loader.warehouse,
            reset: false,
        }
    }

    /// Set the connection settings
    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    /// Set the database name
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.connection.database = Some(database.into());
        self
    }

    /// Set the database user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.connection.user = Some(user.into());
        self
    }

    /// Set the warehouse schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.warehouse.schema = schema.into();
        self
    }

    /// Set the calendar year generated into the date dimension
    pub fn with_covered_year(mut self, year: i32) -> Self {
        self.warehouse.covered_year = year;
        self
    }

    /// Set the customer cursor batch size
    pub fn with_fetch_size(mut self, fetch_size: i32) -> Self {
        self.warehouse.customer_fetch_size = fetch_size;
        self
    }

    /// Run all database stages in one transaction
    pub fn with_single_transaction(mut self, single_transaction: bool) -> Self {
        self.warehouse.single_transaction = single_transaction;
        self
    }

    /// Enable dropping every table before loading
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Check if a specific stage should run
    pub fn should_run_stage(&self, stage: PipelineStage) -> bool {
        match stage {
            PipelineStage::Reset => self.reset,
            _ => true,
        }
    }

    /// Validated namespace for the configured schema
    pub fn namespace(&self) -> Result<Namespace, String> {
        Namespace::new(self.warehouse.schema.as_str()).map_err(|e| e.to_string())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.archive.as_os_str().is_empty() {
            return Err("Archive path is required".to_string());
        }
        self.connection.validate().map_err(|e| e.to_string())?;
        self.warehouse.validate().map_err(|e| e.to_string())?;
        self.namespace()?;
        Ok(())
    }
}

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Stage 1: Unpack the archive and resolve source files
    Extract,
    /// Stage 2: Drop target and staging tables (optional)
    Reset,
    /// Stage 3: Create schema and staging tables
    EnsureStaging,
    /// Stage 4: Create dimension and fact tables
    EnsureTargets,
    /// Stage 5: Truncate staging, fact and dimension tables
    Truncate,
    /// Stage 6: Bulk-copy the source files into staging
    LoadStaging,
    /// Stage 7: Populate the article dimension
    DimArticle,
    /// Stage 8: Populate the customer dimension
    DimCustomer,
    /// Stage 9: Populate the date dimension
    DimDate,
    /// Stage 10: Populate the sales fact table
    FactSales,
    /// Stage 11: Log row counts
    Validate,
}

impl PipelineStage {
    /// Get all stages in execution order
    pub fn all() -> Vec<Self> {
        std::iter::once(Self::Extract)
            .chain(DatabaseStage::ALL.map(DatabaseStage::stage))
            .collect()
    }

    /// Get stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Reset => "reset",
            Self::EnsureStaging => "ensure_staging",
            Self::EnsureTargets => "ensure_targets",
            Self::Truncate => "truncate",
            Self::LoadStaging => "load_staging",
            Self::DimArticle => "dim_article",
            Self::DimCustomer => "dim_customer",
            Self::DimDate => "dim_date",
            Self::FactSales => "fact_sales",
            Self::Validate => "validate",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stages that run inside a database transaction, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStage {
    Reset,
    EnsureStaging,
    EnsureTargets,
    Truncate,
    LoadStaging,
    DimArticle,
    DimCustomer,
    DimDate,
    FactSales,
    Validate,
}

impl DatabaseStage {
    pub const ALL: [DatabaseStage; 10] = [
        Self::Reset,
        Self::EnsureStaging,
        Self::EnsureTargets,
        Self::Truncate,
        Self::LoadStaging,
        Self::DimArticle,
        Self::DimCustomer,
        Self::DimDate,
        Self::FactSales,
        Self::Validate,
    ];

    /// The reported pipeline stage
    pub fn stage(self) -> PipelineStage {
        match self {
            Self::Reset => PipelineStage::Reset,
            Self::EnsureStaging => PipelineStage::EnsureStaging,
            Self::EnsureTargets => PipelineStage::EnsureTargets,
            Self::Truncate => PipelineStage::Truncate,
            Self::LoadStaging => PipelineStage::LoadStaging,
            Self::DimArticle => PipelineStage::DimArticle,
            Self::DimCustomer => PipelineStage::DimCustomer,
            Self::DimDate => PipelineStage::DimDate,
            Self::FactSales => PipelineStage::FactSales,
            Self::Validate => PipelineStage::Validate,
        }
    }
}
