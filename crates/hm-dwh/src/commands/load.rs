//! The load command: layer settings, run the pipeline, report

use std::path::PathBuf;

use tracing::info;

use crate::error::CliError;
use hm_dwh_core::config::LoaderConfig;
use hm_dwh_core::pipeline::{PipelineConfig, PipelineExecutor};

/// Arguments for a load run
///
/// `None` leaves the value from the config file, environment or defaults.
#[derive(Debug, Default)]
pub struct LoadArgs {
    /// Input zip archive
    pub archive: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    /// Drop and recreate every table first
    pub reset: bool,
    /// Commit every database stage together
    pub single_transaction: bool,
    /// Calendar year for the date dimension
    pub year: Option<i32>,
    /// Customer cursor batch size
    pub fetch_size: Option<i32>,
    /// Configuration file
    pub config_file: Option<PathBuf>,
    /// Where to write the JSON run report
    pub report: Option<PathBuf>,
}

impl LoadArgs {
    /// Apply command-line values over the layered configuration
    fn apply_to(&self, config: &mut LoaderConfig) {
        let connection = &mut config.connection;
        if let Some(host) = &self.host {
            connection.host = host.clone();
        }
        if let Some(port) = self.port {
            connection.port = port;
        }
        if let Some(database) = &self.database {
            connection.database = Some(database.clone());
        }
        if let Some(user) = &self.user {
            connection.user = Some(user.clone());
        }
        if let Some(password) = &self.password {
            connection.password = Some(password.clone());
        }

        let warehouse = &mut config.warehouse;
        if let Some(schema) = &self.schema {
            warehouse.schema = schema.clone();
        }
        if let Some(year) = self.year {
            warehouse.covered_year = year;
        }
        if let Some(fetch_size) = self.fetch_size {
            warehouse.customer_fetch_size = fetch_size;
        }
        if self.single_transaction {
            warehouse.single_transaction = true;
        }
    }

    /// Build the pipeline configuration from every settings layer
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        let mut loader = LoaderConfig::load(self.config_file.as_deref())
            .map_err(|e| CliError::ConfigError(e.to_string()))?;
        self.apply_to(&mut loader);
        Ok(PipelineConfig::from_loader(&self.archive, loader).with_reset(self.reset))
    }
}

/// Handle a load run
pub fn handle_load(args: &LoadArgs) -> Result<(), CliError> {
    if !args.archive.is_file() {
        return Err(CliError::FileNotFound(args.archive.clone()));
    }

    let config = args.pipeline_config()?;
    let mut executor =
        PipelineExecutor::new(config).map_err(|e| CliError::ConfigError(e.user_message()))?;

    eprintln!("Starting load run: {}", executor.report().run_id);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::IoError(format!("Failed to start runtime: {}", e)))?;
    let result = runtime.block_on(executor.run());

    let report = executor.report();
    let written = match &args.report {
        Some(path) => report.write_json(path).map(|()| {
            info!(path = %path.display(), "Run report written");
        }),
        None => Ok(()),
    };

    report.print_summary();

    result.map_err(|e| CliError::PipelineError(e.user_message()))?;
    written.map_err(|e| CliError::IoError(e.to_string()))?;

    eprintln!();
    eprintln!("ETL completed successfully.");
    Ok(())
}
