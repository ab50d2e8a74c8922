//! Error types for permafrost.
//!
//! Each concern gets its own snafu enum: configuration, schema parsing,
//! object storage, the export wait sensor, warehouse jobs, and task
//! execution. Errors propagate by raising; recovery is the graph
//! executor's retry policy.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Config Errors ============

/// Errors that can occur while loading and validating pipeline configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[snafu(display("Failed to read config file {}: {source}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Chain name is empty.
    #[snafu(display("Chain name cannot be empty"))]
    EmptyChain,

    /// Output bucket is empty.
    #[snafu(display("Output bucket cannot be empty"))]
    EmptyBucket,

    /// Destination project is empty.
    #[snafu(display("Destination project cannot be empty"))]
    EmptyProject,
}

// ============ Schema Errors ============

/// Errors that can occur while parsing a table schema description.
///
/// All of these are fatal configuration errors: they surface before any
/// warehouse operation is attempted and will fail identically on retry.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// Failed to read the schema file.
    #[snafu(display("Failed to read schema file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Schema file is not valid JSON.
    #[snafu(display("Failed to parse schema JSON: {source}"))]
    Parse { source: serde_json::Error },

    /// Top-level (or nested) schema value is not an array of field objects.
    #[snafu(display("Schema must be an array of field objects"))]
    NotAnArray,

    /// A field entry is not a JSON object.
    #[snafu(display("Schema field at index {index} is not an object"))]
    NotAnObject { index: usize },

    /// A field entry has no name.
    #[snafu(display("Schema field at index {index} has no name"))]
    MissingName { index: usize },

    /// Unrecognized field type.
    #[snafu(display("Field '{name}' has unknown type '{value}'"))]
    UnknownType { name: String, value: String },

    /// Unrecognized field mode.
    #[snafu(display("Field '{name}' has unknown mode '{value}'"))]
    UnknownMode { name: String, value: String },

    /// A RECORD field must carry at least one nested field.
    #[snafu(display("RECORD field '{name}' has no nested fields"))]
    EmptyRecord { name: String },

    /// Only RECORD fields may carry nested fields.
    #[snafu(display("Non-RECORD field '{name}' has nested fields"))]
    UnexpectedNestedFields { name: String },
}

// ============ Template Errors ============

/// Errors that can occur while loading a parameterized query or description.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TemplateError {
    /// Failed to read the template file.
    #[snafu(display("Failed to read file {}: {source}", path.display()))]
    ReadTemplate {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Storage Errors ============

/// Errors that can occur during object storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },

    /// Local filesystem configuration error.
    #[snafu(display("Local storage configuration error: {source}"))]
    LocalConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Sensor Errors ============

/// Errors that can occur while waiting for an export signal object.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SensorError {
    /// The expected object never appeared within the timeout window.
    #[snafu(display("Timed out after {waited_secs}s waiting for object '{object}'"))]
    Timeout { object: String, waited_secs: u64 },

    /// Storage error while polling for the object.
    #[snafu(display("Failed to poll for object '{object}': {source}"))]
    Poll {
        object: String,
        source: StorageError,
    },

    /// Shutdown was requested while waiting.
    #[snafu(display("Wait for object '{object}' cancelled by shutdown"))]
    Cancelled { object: String },
}

// ============ Warehouse Job Errors ============

/// Errors that can occur during warehouse job execution.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    /// A job reached a terminal state with execution errors.
    #[snafu(display("{kind} job '{job_id}' failed: {errors}"))]
    JobFailed {
        job_id: String,
        kind: String,
        errors: String,
    },

    /// Table already exists (creation is only ever of fresh temp names).
    #[snafu(display("Table '{table}' already exists"))]
    TableExists { table: String },

    /// Table does not exist.
    #[snafu(display("Table '{table}' not found"))]
    TableNotFound { table: String },

    /// The warehouse created a table with an unexpected identifier.
    ///
    /// This is an invariant violation: either the warehouse created
    /// something else or failed silently.
    #[snafu(display("Created table id '{actual}' does not match requested '{expected}'"))]
    TableIdMismatch { expected: String, actual: String },

    /// Status was requested for a job the warehouse does not know.
    #[snafu(display("Unknown job '{job_id}'"))]
    UnknownJob { job_id: String },
}

// ============ Graph Errors ============

/// Errors detected while validating the task graph.
///
/// The graph is built from static per-chain rules, so any of these is a
/// programming error caught before execution starts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GraphError {
    /// Two nodes share an identifier.
    #[snafu(display("Duplicate task id '{id}'"))]
    DuplicateTask { id: String },

    /// A node depends on an identifier that names no node.
    #[snafu(display("Task '{id}' depends on unknown task '{dependency}'"))]
    UnknownDependency { id: String, dependency: String },

    /// The dependency relation contains a cycle.
    #[snafu(display("Dependency cycle involving task '{id}'"))]
    Cycle { id: String },
}

// ============ Task Errors ============

/// Errors raised by task bodies during graph execution.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TaskError {
    /// Schema file was malformed or unreadable.
    #[snafu(display("Schema error: {source}"))]
    Schema { source: SchemaError },

    /// Query or description file was unreadable.
    #[snafu(display("Resource error: {source}"))]
    Resource { source: TemplateError },

    /// The export wait sensor failed or timed out.
    #[snafu(display("Sensor error: {source}"))]
    Sensor { source: SensorError },

    /// A warehouse job failed.
    #[snafu(display("Job error: {source}"))]
    Job { source: JobError },

    /// Object storage failure outside the sensor.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Task was cancelled via shutdown signal.
    #[snafu(display("Task cancelled"))]
    TaskCancelled,
}
