//! Run report collected while the pipeline executes

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::PipelineStage;
use super::error::{PipelineError, PipelineResult};
use crate::progress::{format_count, format_duration_ms, format_number};
use crate::warehouse::ValidationReport;

/// Pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Pipeline is running
    Running,
    /// Pipeline completed successfully
    Completed,
    /// Pipeline failed
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Output from a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    /// Whether the stage was skipped
    pub skipped: bool,
    /// Reason for skipping (if applicable)
    pub skip_reason: Option<String>,
    /// Rows copied, inserted or generated by the stage
    pub rows: Option<u64>,
    /// Stage-specific metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl StageOutput {
    /// Create a successful stage output
    pub fn success() -> Self {
        Self {
            skipped: false,
            skip_reason: None,
            rows: None,
            metadata: HashMap::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Create a skipped stage output
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::success()
        }
    }

    /// Set the affected row count
    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set duration
    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Report from a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Run ID
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Final status
    pub status: PipelineStatus,
    /// Warehouse schema
    pub schema: String,
    /// Connection target without credentials
    pub target: String,
    /// Completed stages
    pub stages_completed: Vec<PipelineStage>,
    /// Stage outputs keyed by stage name
    pub outputs: HashMap<String, StageOutput>,
    /// Counters from the validation stage
    pub validation: Option<ValidationReport>,
    /// Error message if failed
    pub error: Option<String>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Create a report for a new run
    pub fn new(schema: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: PipelineStatus::Running,
            schema: schema.into(),
            target: target.into(),
            stages_completed: Vec::new(),
            outputs: HashMap::new(),
            validation: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Mark a stage as completed
    pub fn complete_stage(&mut self, stage: PipelineStage, output: StageOutput) {
        self.stages_completed.push(stage);
        self.outputs.insert(stage.name().to_string(), output);
    }

    /// Mark a stage as skipped
    pub fn skip_stage(&mut self, stage: PipelineStage, reason: impl Into<String>) {
        self.outputs
            .insert(stage.name().to_string(), StageOutput::skipped(reason));
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self, duration_ms: u64) {
        self.status = PipelineStatus::Completed;
        self.finish(duration_ms);
    }

    /// Mark pipeline as failed
    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) {
        self.status = PipelineStatus::Failed;
        self.error = Some(error.into());
        self.finish(duration_ms);
    }

    fn finish(&mut self, duration_ms: u64) {
        self.finished_at = Some(Utc::now());
        self.duration_ms = duration_ms;
    }

    /// Check if a stage has been completed
    pub fn is_stage_completed(&self, stage: PipelineStage) -> bool {
        self.stages_completed.contains(&stage)
    }

    /// Get output from a stage
    pub fn stage_output(&self, stage: PipelineStage) -> Option<&StageOutput> {
        self.outputs.get(stage.name())
    }

    /// Check if pipeline was successful
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    /// Get formatted duration
    pub fn duration_formatted(&self) -> String {
        format_duration_ms(self.duration_ms)
    }

    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as JSON
    pub fn write_json(&self, path: &Path) -> PipelineResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| PipelineError::ReportWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Run {} - {}", self.run_id, self.status);
        eprintln!("Target: {} (schema {})", self.target, self.schema);
        eprintln!("Duration: {}", self.duration_formatted());
        eprintln!("Stages completed: {}", self.stages_completed.len());

        for stage in PipelineStage::all() {
            let Some(output) = self.outputs.get(stage.name()) else {
                continue;
            };
            if output.skipped {
                eprintln!(
                    "  - {}: skipped ({})",
                    stage.name(),
                    output.skip_reason.as_deref().unwrap_or("")
                );
                continue;
            }
            match output.rows {
                Some(rows) => eprintln!(
                    "  - {}: ok, {} rows ({}ms)",
                    stage.name(),
                    format_number(rows),
                    output.duration_ms
                ),
                None => eprintln!("  - {}: ok ({}ms)", stage.name(), output.duration_ms),
            }
        }

        if let Some(validation) = &self.validation {
            eprintln!("Validation:");
            for (label, value) in validation.entries() {
                eprintln!("  {}: {}", label, format_count(value));
            }
        }

        if let Some(error) = &self.error {
            eprintln!("Error: {}", error);
        }
    }
}
