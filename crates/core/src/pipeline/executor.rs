//! Pipeline executor for running the full load

use std::time::Instant;

use serde_json::json;
use tokio_postgres::Transaction;
use tracing::{Instrument, debug, error, info, info_span};

use super::config::{DatabaseStage, PipelineConfig, PipelineStage};
use super::error::{PipelineError, PipelineResult};
use super::report::{PipelineReport, StageOutput};
use crate::archive::{ExtractedArchive, SourceFile, SourcePaths};
use crate::warehouse::{
    Namespace, Warehouse, WarehouseResult, load_staging, populate, schema, validate,
};

/// Pipeline executor that runs all stages
#[derive(Debug)]
pub struct PipelineExecutor {
    config: PipelineConfig,
    namespace: Namespace,
    report: PipelineReport,
}

impl PipelineExecutor {
    /// Create a new pipeline executor
    ///
    /// Fails on configuration errors before anything is touched.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::ConfigError)?;
        let namespace = config.namespace().map_err(PipelineError::ConfigError)?;
        let report = PipelineReport::new(namespace.as_str(), config.connection.masked());
        Ok(Self {
            config,
            namespace,
            report,
        })
    }

    /// Report for the current or last run
    pub fn report(&self) -> &PipelineReport {
        &self.report
    }

    /// Run the pipeline
    pub async fn run(&mut self) -> PipelineResult<PipelineReport> {
        let span = info_span!(
            "pipeline_run",
            run_id = %self.report.run_id,
            schema = %self.namespace
        );

        let start = Instant::now();
        let result = self.run_stages().instrument(span).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                self.report.complete(duration_ms);
                info!(
                    run_id = %self.report.run_id,
                    duration_ms,
                    stages_completed = self.report.stages_completed.len(),
                    "Pipeline completed"
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                error!(run_id = %self.report.run_id, error = %e, "Pipeline failed");
                self.report.fail(e.to_string(), duration_ms);
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self) -> PipelineResult<()> {
        let stages = PipelineStage::all();
        info!(
            archive = %self.config.archive.display(),
            target = %self.report.target,
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            single_transaction = self.config.warehouse.single_transaction,
            "Starting pipeline"
        );

        // Input errors must surface before a connection is opened
        let archive = self.run_extract()?;

        let mut db_stages = Vec::new();
        for stage in DatabaseStage::ALL {
            if let Some(reason) = self.should_skip_stage(stage.stage()) {
                debug!(stage = stage.stage().name(), reason = %reason, "Skipping stage");
                self.report.skip_stage(stage.stage(), reason);
            } else {
                db_stages.push(stage);
            }
        }

        let mut warehouse = Warehouse::connect(&self.config.connection)
            .await
            .map_err(|e| PipelineError::Connect {
                target: self.config.connection.masked(),
                source: e,
            })?;

        let result = self
            .run_database_stages(&mut warehouse, archive.paths(), &db_stages)
            .await;
        warehouse.close().await;
        drop(archive);
        result
    }

    /// Run the extract stage
    fn run_extract(&mut self) -> PipelineResult<ExtractedArchive> {
        let stage = PipelineStage::Extract;
        info!(stage = stage.name(), "Starting stage");
        let start = Instant::now();

        let archive = ExtractedArchive::extract(&self.config.archive).inspect_err(|e| {
            error!(stage = stage.name(), error = %e, "Stage failed");
        })?;

        let mut output = StageOutput::success()
            .with_metadata("archive", json!(self.config.archive.display().to_string()))
            .with_metadata("directory", json!(archive.dir().display().to_string()));
        for file in SourceFile::ALL {
            output = output.with_metadata(
                file.name(),
                json!(archive.path(file).display().to_string()),
            );
        }
        self.record_stage(stage, output, start);
        Ok(archive)
    }

    /// Run database stages, committing per stage or once at the end
    async fn run_database_stages(
        &mut self,
        warehouse: &mut Warehouse,
        paths: &SourcePaths,
        stages: &[DatabaseStage],
    ) -> PipelineResult<()> {
        let client = warehouse.client_mut();
        if self.config.warehouse.single_transaction {
            let tx = client
                .transaction()
                .await
                .map_err(|e| PipelineError::transaction("begin", e))?;
            for stage in stages {
                self.run_stage(&tx, *stage, paths).await?;
            }
            tx.commit()
                .await
                .map_err(|e| PipelineError::transaction("commit", e))?;
            info!("Single transaction committed");
        } else {
            for stage in stages {
                let tx = client
                    .transaction()
                    .await
                    .map_err(|e| PipelineError::transaction("begin", e))?;
                self.run_stage(&tx, *stage, paths).await?;
                tx.commit()
                    .await
                    .map_err(|e| PipelineError::transaction("commit", e))?;
            }
        }
        Ok(())
    }

    /// Run a single database stage
    async fn run_stage(
        &mut self,
        tx: &Transaction<'_>,
        database_stage: DatabaseStage,
        paths: &SourcePaths,
    ) -> PipelineResult<()> {
        let stage = database_stage.stage();
        info!(stage = stage.name(), "Starting stage");
        let start = Instant::now();

        match self.execute_stage(tx, database_stage, paths).await {
            Ok(output) => {
                self.record_stage(stage, output, start);
                Ok(())
            }
            Err(e) => {
                error!(stage = stage.name(), error = %e, "Stage failed");
                Err(PipelineError::stage_failure(stage, e))
            }
        }
    }

    async fn execute_stage(
        &mut self,
        tx: &Transaction<'_>,
        stage: DatabaseStage,
        paths: &SourcePaths,
    ) -> WarehouseResult<StageOutput> {
        let ns = &self.namespace;
        let warehouse = &self.config.warehouse;

        let output = match stage {
            DatabaseStage::Reset => {
                schema::reset(tx, ns).await?;
                StageOutput::success()
            }
            DatabaseStage::EnsureStaging => {
                schema::ensure_schema_and_staging(tx, ns).await?;
                StageOutput::success()
            }
            DatabaseStage::EnsureTargets => {
                schema::ensure_target_tables(tx, ns).await?;
                StageOutput::success()
            }
            DatabaseStage::Truncate => {
                schema::truncate_for_reload(tx, ns).await?;
                StageOutput::success()
            }
            DatabaseStage::LoadStaging => {
                let loaded = load_staging(tx, ns, paths).await?;
                let total = loaded.iter().map(|(_, rows)| rows).sum();
                loaded
                    .into_iter()
                    .fold(StageOutput::success().with_rows(total), |out, (table, rows)| {
                        out.with_metadata(table.name(), json!(rows))
                    })
            }
            DatabaseStage::DimArticle => {
                StageOutput::success().with_rows(populate::populate_dim_article(tx, ns).await?)
            }
            DatabaseStage::DimCustomer => {
                let stats =
                    populate::populate_dim_customer(tx, ns, warehouse.customer_fetch_size).await?;
                StageOutput::success()
                    .with_rows(stats.loaded)
                    .with_metadata("processed", json!(stats.processed))
            }
            DatabaseStage::DimDate => {
                let rows = populate::populate_dim_date(tx, ns, warehouse.covered_year).await?;
                StageOutput::success()
                    .with_rows(rows)
                    .with_metadata("year", json!(warehouse.covered_year))
            }
            DatabaseStage::FactSales => {
                StageOutput::success().with_rows(populate::populate_fact_sales(tx, ns).await?)
            }
            DatabaseStage::Validate => {
                let counters = validate::validate(tx, ns).await?;
                self.report.validation = Some(counters);
                StageOutput::success()
                    .with_metadata("dropped_transactions", json!(counters.dropped_transactions))
            }
        };

        Ok(output)
    }

    fn record_stage(&mut self, stage: PipelineStage, output: StageOutput, start: Instant) {
        let output = output.with_duration(start.elapsed().as_millis() as u64);
        info!(
            stage = stage.name(),
            duration_ms = output.duration_ms,
            rows = output.rows,
            "Stage completed"
        );
        self.report.complete_stage(stage, output);
    }

    /// Check if a stage should be skipped
    fn should_skip_stage(&self, stage: PipelineStage) -> Option<String> {
        if self.config.should_run_stage(stage) {
            None
        } else {
            Some(format!("{} not requested", stage.name()))
        }
    }
}
