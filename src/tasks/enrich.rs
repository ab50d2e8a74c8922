//! Enriched table and view materialization.
//!
//! Destinations are never rebuilt in place. Each run stages the full result
//! under a uniquely-named temporary in the scratch dataset, then copies it
//! over the destination with truncate semantics and deletes the temporary.
//! The copy is the only operation that touches the destination, so readers
//! observe either the old contents or the new, never a partial or missing
//! state; a failure before the copy leaves the destination untouched.
//!
//! Views go through the same staged flow; they just have no population
//! step, since the definition itself is the content.

use snafu::prelude::*;
use tracing::info;

use super::TaskContext;
use crate::error::{JobSnafu, ResourceSnafu, SchemaSnafu, TaskError};
use crate::error::TableIdMismatchSnafu;
use crate::schema::read_schema_from_file;
use crate::template;
use crate::warehouse::{
    log_job_config, temp_table_name, wait_for_job, CopyJobConfig, JobKind, QueryJobConfig,
    QueryPriority, TableRef, TableSpec,
};

/// Destination of an enriched table: the public dataset, possibly in a
/// different project.
fn destination(ctx: &TaskContext, entity: &str) -> TableRef {
    TableRef::with_project(
        &ctx.config.destination_project,
        ctx.config.dataset_name(),
        entity,
    )
}

/// Materialize an enriched table via the staged temp-table flow.
pub async fn run_table(
    ctx: &TaskContext,
    entity: &str,
    partition_field: Option<&str>,
) -> Result<(), TaskError> {
    let schema = read_schema_from_file(&ctx.config.enrich_schema_path(entity))
        .context(SchemaSnafu)?;
    let description =
        template::read_file(&ctx.config.enrich_description_path(entity)).context(ResourceSnafu)?;
    let sql = template::read_rendered(&ctx.config.enrich_sql_path(entity), &ctx.env)
        .context(ResourceSnafu)?;

    let temp_name = temp_table_name(entity);
    let temp = TableRef::new(ctx.config.dataset_name_temp(), &temp_name);
    let spec = TableSpec::table(
        schema,
        partition_field.map(str::to_string),
        Some(description),
    );

    info!(entity, temp_table = %temp, "Creating staging table");
    let created = ctx
        .warehouse
        .create_table(&temp, &spec)
        .await
        .context(JobSnafu)?;
    check_created_id(&temp_name, created)?;

    let query_config = QueryJobConfig {
        destination: Some(temp.clone()),
        priority: QueryPriority::Interactive,
    };
    log_job_config(JobKind::Query, &query_config);
    let job = ctx
        .warehouse
        .submit_query(&sql, &query_config)
        .await
        .context(JobSnafu)?;
    wait_for_job(ctx.warehouse.as_ref(), &job)
        .await
        .context(JobSnafu)?;

    let dest = destination(ctx, entity);
    let copy_config = CopyJobConfig::default();
    log_job_config(JobKind::Copy, &copy_config);
    let job = ctx
        .warehouse
        .submit_copy(&temp, &dest, &copy_config)
        .await
        .context(JobSnafu)?;
    wait_for_job(ctx.warehouse.as_ref(), &job)
        .await
        .context(JobSnafu)?;

    ctx.warehouse.delete_table(&temp).await.context(JobSnafu)?;

    info!(entity, %dest, "Enriched table materialized");
    Ok(())
}

/// Materialize an enriched view through the same staged flow as tables:
/// the definition is created under a fresh temp name and copied over the
/// destination, which is never deleted or written directly.
pub async fn run_view(ctx: &TaskContext, entity: &str) -> Result<(), TaskError> {
    let description =
        template::read_file(&ctx.config.enrich_description_path(entity)).context(ResourceSnafu)?;
    let view_query = template::read_rendered(&ctx.config.enrich_sql_path(entity), &ctx.env)
        .context(ResourceSnafu)?;

    let temp_name = temp_table_name(entity);
    let temp = TableRef::new(ctx.config.dataset_name_temp(), &temp_name);
    let spec = TableSpec::view(view_query, Some(description));

    info!(entity, temp_table = %temp, "Creating staging view");
    let created = ctx
        .warehouse
        .create_table(&temp, &spec)
        .await
        .context(JobSnafu)?;
    check_created_id(&temp_name, created)?;

    let dest = destination(ctx, entity);
    let copy_config = CopyJobConfig::default();
    log_job_config(JobKind::Copy, &copy_config);
    let job = ctx
        .warehouse
        .submit_copy(&temp, &dest, &copy_config)
        .await
        .context(JobSnafu)?;
    wait_for_job(ctx.warehouse.as_ref(), &job)
        .await
        .context(JobSnafu)?;

    ctx.warehouse.delete_table(&temp).await.context(JobSnafu)?;

    info!(entity, %dest, "Enriched view materialized");
    Ok(())
}

fn check_created_id(expected: &str, actual: String) -> Result<(), TaskError> {
    if actual != expected {
        return TableIdMismatchSnafu { expected, actual }
            .fail()
            .context(JobSnafu);
    }
    Ok(())
}
