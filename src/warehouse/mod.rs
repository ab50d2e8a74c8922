//! Warehouse job model and trait seam.
//!
//! The pipeline only ever talks to the warehouse through [`Warehouse`]:
//! submit a job (load, query, copy), then poll it to a terminal state and
//! fail with the full diagnostic payload if any execution errors were
//! reported. That submit-and-poll pattern is one reusable function,
//! [`wait_for_job`], applied identically to every job kind.
//!
//! [`memory::MemoryWarehouse`] backs tests and local runs; a remote client
//! plugs in behind the same trait.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{JobError, JobFailedSnafu};
use crate::schema::SchemaField;
use snafu::prelude::*;

/// Interval between job status polls.
const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Fully qualified reference to a warehouse table.
///
/// `project = None` means the pipeline's own project; enrichment
/// destinations may live in a different project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: None,
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn with_project(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: Some(project.into()),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}.{}.{}", project, self.dataset, self.table),
            None => write!(f, "{}.{}", self.dataset, self.table),
        }
    }
}

/// Generate a uniquely-named temporary table for a task.
///
/// Collisions are avoided across concurrent and retried runs by suffixing
/// the current wall-clock millisecond timestamp; each retry attempt gets a
/// fresh name, so partial failures never touch an earlier attempt's table.
pub fn temp_table_name(task: &str) -> String {
    format!("{}_{}", task, chrono::Utc::now().timestamp_millis())
}

/// Definition of a table (or view) to create.
#[derive(Debug, Clone, Serialize)]
pub struct TableSpec {
    /// Explicit column schema (table mode).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema: Vec<SchemaField>,
    /// View definition (view mode); the view has no separate population step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_query: Option<String>,
    /// Time-partitioning column, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_field: Option<String>,
    /// Human-readable table description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableSpec {
    /// Spec for a regular table with an explicit schema.
    pub fn table(
        schema: Vec<SchemaField>,
        partition_field: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            schema,
            view_query: None,
            partition_field,
            description,
        }
    }

    /// Spec for a view defined by a query.
    pub fn view(view_query: String, description: Option<String>) -> Self {
        Self {
            schema: Vec::new(),
            view_query: Some(view_query),
            partition_field: None,
            description,
        }
    }

    pub fn is_view(&self) -> bool {
        self.view_query.is_some()
    }
}

/// Overwrite semantics for load and copy jobs.
///
/// The pipeline only ever uses truncate-and-replace; the enum exists so the
/// disposition is explicit at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteDisposition {
    /// Replace the destination's prior contents entirely.
    Truncate,
}

/// Source file format for load jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Comma-separated values with one leading header row.
    Csv,
    /// Newline-delimited JSON records.
    NewlineDelimitedJson,
}

impl SourceFormat {
    /// File extension used in export paths.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::NewlineDelimitedJson => "json",
        }
    }
}

/// Configuration for a load job.
#[derive(Debug, Clone, Serialize)]
pub struct LoadJobConfig {
    pub schema: Vec<SchemaField>,
    pub source_format: SourceFormat,
    pub write_disposition: WriteDisposition,
    /// Number of leading rows to skip (1 for CSV headers).
    pub skip_leading_rows: u32,
    /// Tolerate newlines inside quoted CSV sections.
    pub allow_quoted_newlines: bool,
    /// Ignore extra fields not present in the schema.
    pub ignore_unknown_values: bool,
}

impl LoadJobConfig {
    pub fn new(schema: Vec<SchemaField>, source_format: SourceFormat) -> Self {
        Self {
            schema,
            source_format,
            write_disposition: WriteDisposition::Truncate,
            skip_leading_rows: if source_format == SourceFormat::Csv {
                1
            } else {
                0
            },
            allow_quoted_newlines: false,
            ignore_unknown_values: true,
        }
    }
}

/// Query priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPriority {
    /// Finishes faster; subject to the concurrent interactive query limit.
    Interactive,
    Batch,
}

/// Configuration for a query job.
#[derive(Debug, Clone, Serialize)]
pub struct QueryJobConfig {
    /// Destination table for the result; `None` for assertion queries.
    pub destination: Option<TableRef>,
    pub priority: QueryPriority,
}

/// Configuration for a table copy job.
#[derive(Debug, Clone, Serialize)]
pub struct CopyJobConfig {
    pub write_disposition: WriteDisposition,
}

impl Default for CopyJobConfig {
    fn default() -> Self {
        Self {
            write_disposition: WriteDisposition::Truncate,
        }
    }
}

/// Kind of warehouse job, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Load,
    Query,
    Copy,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Query => write!(f, "query"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: String,
    pub kind: JobKind,
}

/// Terminal and non-terminal job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Status snapshot of a job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    /// Execution errors reported by the warehouse, if any.
    pub errors: Vec<String>,
}

impl JobStatus {
    pub fn done() -> Self {
        Self {
            state: JobState::Done,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: JobState::Error,
            errors: vec![message.into()],
        }
    }
}

/// Interface to the columnar warehouse.
///
/// Implementations submit jobs asynchronously; callers drive them to
/// completion with [`wait_for_job`].
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create a table or view. Returns the identifier of the created table,
    /// which callers must check against the requested name.
    async fn create_table(&self, table: &TableRef, spec: &TableSpec) -> Result<String, JobError>;

    /// Delete a table.
    async fn delete_table(&self, table: &TableRef) -> Result<(), JobError>;

    /// Submit a load job importing all files matching `source_uri`.
    async fn submit_load(
        &self,
        source_uri: &str,
        destination: &TableRef,
        config: &LoadJobConfig,
    ) -> Result<JobHandle, JobError>;

    /// Submit a query job.
    async fn submit_query(&self, sql: &str, config: &QueryJobConfig)
        -> Result<JobHandle, JobError>;

    /// Submit a table copy job.
    async fn submit_copy(
        &self,
        source: &TableRef,
        destination: &TableRef,
        config: &CopyJobConfig,
    ) -> Result<JobHandle, JobError>;

    /// Current status of a previously submitted job.
    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus, JobError>;
}

/// Poll a job to a terminal state and check for execution errors.
///
/// Raises [`JobError::JobFailed`] carrying the warehouse's diagnostic
/// payload when the job reports errors or ends in the error state.
pub async fn wait_for_job(warehouse: &dyn Warehouse, job: &JobHandle) -> Result<(), JobError> {
    loop {
        let status = warehouse.job_status(job).await?;
        if !status.state.is_terminal() {
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
            continue;
        }

        if status.state == JobState::Error || !status.errors.is_empty() {
            let errors = if status.errors.is_empty() {
                "no diagnostic payload reported".to_string()
            } else {
                status.errors.join("; ")
            };
            error!(job_id = %job.id, kind = %job.kind, errors = %errors, "Warehouse job failed");
            return JobFailedSnafu {
                job_id: job.id.clone(),
                kind: job.kind.to_string(),
                errors,
            }
            .fail();
        }

        info!(job_id = %job.id, kind = %job.kind, "Warehouse job completed");
        return Ok(());
    }
}

/// Serialize a job configuration for logging, mirroring the warehouse API
/// representation.
pub fn log_job_config<C: Serialize>(kind: JobKind, config: &C) {
    match serde_json::to_string(config) {
        Ok(repr) => info!(kind = %kind, config = %repr, "Submitting job"),
        Err(_) => info!(kind = %kind, "Submitting job"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_display() {
        let plain = TableRef::new("bitcoin_blockchain_raw", "blocks");
        assert_eq!(plain.to_string(), "bitcoin_blockchain_raw.blocks");

        let qualified =
            TableRef::with_project("warehouse-prod", "bitcoin_blockchain", "transactions");
        assert_eq!(
            qualified.to_string(),
            "warehouse-prod.bitcoin_blockchain.transactions"
        );
    }

    #[test]
    fn test_temp_table_name_embeds_task() {
        let name = temp_table_name("transactions");
        assert!(name.starts_with("transactions_"));
        let suffix = name.strip_prefix("transactions_").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[test]
    fn test_load_config_csv_skips_header() {
        let csv = LoadJobConfig::new(Vec::new(), SourceFormat::Csv);
        assert_eq!(csv.skip_leading_rows, 1);

        let json = LoadJobConfig::new(Vec::new(), SourceFormat::NewlineDelimitedJson);
        assert_eq!(json.skip_leading_rows, 0);
        assert!(json.ignore_unknown_values);
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_table_spec_modes() {
        let view = TableSpec::view("SELECT 1".to_string(), None);
        assert!(view.is_view());

        let table = TableSpec::table(Vec::new(), Some("timestamp_month".to_string()), None);
        assert!(!table.is_view());
        assert_eq!(table.partition_field.as_deref(), Some("timestamp_month"));
    }
}
