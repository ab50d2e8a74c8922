//! Verification tasks.
//!
//! Each rule is a standalone SQL assertion over the enriched dataset; the
//! query is written to error when the assertion does not hold, so a failed
//! query job is the verification failure. No result rows are fetched and no
//! destination table is written.

use snafu::prelude::*;
use tracing::info;

use super::TaskContext;
use crate::error::{JobSnafu, ResourceSnafu, TaskError};
use crate::template;
use crate::warehouse::{log_job_config, wait_for_job, JobKind, QueryJobConfig, QueryPriority};

/// Run one verification rule's assertion query.
pub async fn run(ctx: &TaskContext, rule: &str) -> Result<(), TaskError> {
    let sql = template::read_rendered(&ctx.config.verify_sql_path(rule), &ctx.env)
        .context(ResourceSnafu)?;

    let config = QueryJobConfig {
        destination: None,
        priority: QueryPriority::Interactive,
    };
    log_job_config(JobKind::Query, &config);

    let job = ctx
        .warehouse
        .submit_query(&sql, &config)
        .await
        .context(JobSnafu)?;
    wait_for_job(ctx.warehouse.as_ref(), &job)
        .await
        .context(JobSnafu)?;

    info!(rule, "Verification passed");
    Ok(())
}
