//! Export wait and raw-table load tasks.
//!
//! The exporter signals completion for a day by landing
//! `export/<entity>/block_date=<date>/<entity>.<ext>` in the output bucket.
//! Waiting and loading are separate graph nodes so a timed-out wait fails
//! without ever submitting the load job.

use snafu::prelude::*;
use tracing::info;

use super::TaskContext;
use crate::error::{JobSnafu, SchemaSnafu, SensorSnafu, TaskError};
use crate::schema::read_schema_from_file;
use crate::sensor::wait_for_object;
use crate::warehouse::{log_job_config, wait_for_job, JobKind, LoadJobConfig, SourceFormat, TableRef};

/// Relative path of the export signal object for one entity and date.
pub fn signal_path(entity: &str, date: chrono::NaiveDate, format: SourceFormat) -> String {
    format!(
        "export/{entity}/block_date={date}/{entity}.{ext}",
        ext = format.extension()
    )
}

/// Wildcard URI covering every export file for one entity.
fn export_uri(bucket: &str, entity: &str, format: SourceFormat) -> String {
    format!(
        "{}/export/{entity}/*.{ext}",
        bucket.trim_end_matches('/'),
        ext = format.extension()
    )
}

/// Block until the day's export signal for `entity` is present.
pub async fn wait_for_export(
    ctx: &TaskContext,
    entity: &str,
    format: SourceFormat,
) -> Result<(), TaskError> {
    let object = signal_path(entity, ctx.date, format);
    wait_for_object(
        &ctx.storage,
        &object,
        ctx.config.poke_interval(),
        ctx.config.wait_timeout(),
        &ctx.shutdown,
    )
    .await
    .context(SensorSnafu)
}

/// Bulk-load an entity's export files into the raw dataset, replacing prior
/// contents.
pub async fn run(
    ctx: &TaskContext,
    entity: &str,
    format: SourceFormat,
    allow_quoted_newlines: bool,
) -> Result<(), TaskError> {
    let schema_path = ctx.config.raw_schema_path(entity);
    let schema = read_schema_from_file(&schema_path).context(SchemaSnafu)?;

    let mut config = LoadJobConfig::new(schema, format);
    config.allow_quoted_newlines = allow_quoted_newlines;

    let uri = export_uri(&ctx.config.output_bucket, entity, format);
    let destination = TableRef::new(ctx.config.dataset_name_raw(), entity);

    info!(entity, %destination, %uri, "Loading raw table");
    log_job_config(JobKind::Load, &config);

    let job = ctx
        .warehouse
        .submit_load(&uri, &destination, &config)
        .await
        .context(JobSnafu)?;
    wait_for_job(ctx.warehouse.as_ref(), &job)
        .await
        .context(JobSnafu)?;

    info!(entity, %destination, "Raw table loaded");
    Ok(())
}
