//! Graph execution.
//!
//! Tasks are spawned as soon as every dependency has succeeded, so
//! independent chains of the graph make progress concurrently. A failed
//! task (after exhausting its retries) poisons its transitive dependents:
//! they are marked skipped and never spawned, while unrelated tasks keep
//! running. Cancellation via the shutdown token stops retry waits and
//! in-flight sensors promptly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::TaskError;
use crate::tasks::{enrich, load, verify, TaskContext};

use super::{TaskGraph, TaskKind};

/// Retry behavior applied uniformly to every task.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retries: config.retries,
            delay: config.retry_delay(),
        }
    }
}

/// Outcome of one graph run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    /// Failed task ids with their final error, in completion order.
    pub failed: Vec<(String, String)>,
    /// Tasks never attempted because a dependency failed.
    pub skipped: Vec<String>,
}

impl RunReport {
    /// True when every task in the graph ran and succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

async fn execute(ctx: &TaskContext, kind: &TaskKind) -> Result<(), TaskError> {
    match kind {
        TaskKind::WaitExport { entity, format } => {
            load::wait_for_export(ctx, entity, *format).await
        }
        TaskKind::Load {
            entity,
            format,
            allow_quoted_newlines,
        } => load::run(ctx, entity, *format, *allow_quoted_newlines).await,
        TaskKind::EnrichTable {
            entity,
            partition_field,
        } => enrich::run_table(ctx, entity, partition_field.as_deref()).await,
        TaskKind::EnrichView { entity } => enrich::run_view(ctx, entity).await,
        TaskKind::Verify { rule } => verify::run(ctx, rule.name()).await,
    }
}

/// Run a task to success, retrying per policy. Cancellation short-circuits
/// both the task body and the inter-attempt delay.
async fn run_with_retry(
    ctx: TaskContext,
    id: String,
    kind: TaskKind,
    policy: RetryPolicy,
) -> (String, Result<(), TaskError>) {
    let mut attempt: u32 = 0;
    loop {
        let result = tokio::select! {
            biased;

            _ = ctx.shutdown.cancelled() => Err(TaskError::TaskCancelled),

            result = execute(&ctx, &kind) => result,
        };

        match result {
            Ok(()) => {
                info!(task = %id, "Task succeeded");
                return (id, Ok(()));
            }
            Err(TaskError::TaskCancelled) => return (id, Err(TaskError::TaskCancelled)),
            Err(err) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    task = %id,
                    attempt,
                    max_attempts = policy.retries + 1,
                    error = %err,
                    "Task failed, will retry"
                );
                tokio::select! {
                    biased;

                    _ = ctx.shutdown.cancelled() => {
                        return (id, Err(TaskError::TaskCancelled));
                    }

                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
            Err(err) => {
                error!(task = %id, error = %err, "Task failed, retries exhausted");
                return (id, Err(err));
            }
        }
    }
}

/// Execute the whole graph against the given context.
pub async fn run_graph(graph: &TaskGraph, ctx: &TaskContext, policy: RetryPolicy) -> RunReport {
    let mut report = RunReport::default();
    let mut join_set: JoinSet<(String, Result<(), TaskError>)> = JoinSet::new();

    let mut pending_deps: HashMap<&str, usize> = graph
        .nodes()
        .map(|node| (node.id.as_str(), node.deps.len()))
        .collect();
    let mut skipped: HashMap<&str, bool> = HashMap::new();
    let mut spawned: HashSet<String> = HashSet::new();

    let spawn = |join_set: &mut JoinSet<(String, Result<(), TaskError>)>,
                 spawned: &mut HashSet<String>,
                 id: &str| {
        // Validated at graph construction, so the node always exists.
        if let Some(node) = graph.get(id) {
            info!(task = %node.id, "Spawning task");
            spawned.insert(node.id.clone());
            join_set.spawn(run_with_retry(
                ctx.clone(),
                node.id.clone(),
                node.kind.clone(),
                policy,
            ));
        }
    };

    for node in graph.nodes() {
        if node.deps.is_empty() {
            spawn(&mut join_set, &mut spawned, &node.id);
        }
    }

    while let Some(joined) = join_set.join_next().await {
        let (id, result) = match joined {
            Ok(outcome) => outcome,
            Err(join_error) => {
                // The sweep after the set drains records the aborted task
                // as failed and its starved dependents as skipped.
                error!(error = %join_error, "Task aborted abnormally");
                continue;
            }
        };

        match result {
            Ok(()) => {
                report.succeeded.push(id.clone());
                for dependent in graph.dependents(&id) {
                    let remaining = pending_deps.entry(dependent).or_insert(0);
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 && !skipped.get(dependent).copied().unwrap_or(false) {
                        spawn(&mut join_set, &mut spawned, dependent);
                    }
                }
            }
            Err(err) => {
                report.failed.push((id.clone(), err.to_string()));

                // Transitively poison everything downstream of the failure.
                let mut queue: VecDeque<&str> = graph.dependents(&id).into();
                while let Some(next) = queue.pop_front() {
                    let seen = skipped.entry(next).or_insert(false);
                    if *seen {
                        continue;
                    }
                    *seen = true;
                    warn!(task = %next, failed_dependency = %id, "Skipping task");
                    report.skipped.push(next.to_string());
                    queue.extend(graph.dependents(next));
                }
            }
        }
    }

    // A task that aborted abnormally (panicked) resolved neither way and
    // starved its dependents; account for every node before reporting.
    for node in graph.nodes() {
        let id = node.id.as_str();
        let resolved = report.succeeded.iter().any(|s| s == id)
            || report.failed.iter().any(|(f, _)| f == id)
            || report.skipped.iter().any(|s| s == id);
        if resolved {
            continue;
        }
        if spawned.contains(id) {
            report
                .failed
                .push((id.to_string(), "task aborted abnormally".to_string()));
        } else {
            warn!(task = %id, "Skipping task whose dependencies never completed");
            report.skipped.push(id.to_string());
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "Graph run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::dag::{TaskGraph, TaskNode};
    use crate::storage::StorageClient;
    use crate::tasks::TaskContext;
    use crate::warehouse::memory::MemoryWarehouse;
    use crate::warehouse::SourceFormat;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const DATE: &str = "2024-01-15";

    fn wait_node(id: &str, entity: &str, deps: &[&str]) -> TaskNode {
        TaskNode::new(
            id,
            TaskKind::WaitExport {
                entity: entity.to_string(),
                format: SourceFormat::NewlineDelimitedJson,
            },
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    fn write_signal(bucket: &TempDir, entity: &str) {
        let dir = bucket
            .path()
            .join(format!("export/{entity}/block_date={DATE}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{entity}.json")), b"{}").unwrap();
    }

    fn context(bucket: &TempDir, retries: u32) -> TaskContext {
        let config: PipelineConfig = serde_yaml::from_str(&format!(
            "chain: bitcoin\n\
             output_bucket: {}\n\
             destination_project: warehouse-prod\n\
             start_date: 2018-01-01\n\
             retries: {retries}\n\
             retry_delay_secs: 1\n\
             wait_timeout_secs: 120\n\
             poke_interval_secs: 60\n",
            bucket.path().display()
        ))
        .unwrap();

        let storage = Arc::new(StorageClient::for_url(bucket.path().to_str().unwrap()).unwrap());
        TaskContext::new(
            Arc::new(config),
            Arc::new(MemoryWarehouse::new()),
            storage,
            NaiveDate::parse_from_str(DATE, "%Y-%m-%d").unwrap(),
            CancellationToken::new(),
        )
    }

    fn policy(ctx: &TaskContext) -> RetryPolicy {
        RetryPolicy::from_config(&ctx.config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_graph_all_succeed() {
        let bucket = TempDir::new().unwrap();
        write_signal(&bucket, "blocks");
        write_signal(&bucket, "transactions");

        let graph = TaskGraph::new(vec![
            wait_node("wait_blocks", "blocks", &[]),
            wait_node("wait_transactions", "transactions", &[]),
            wait_node("wait_again", "blocks", &["wait_blocks", "wait_transactions"]),
        ])
        .unwrap();

        let ctx = context(&bucket, 0);
        let report = run_graph(&graph, &ctx, policy(&ctx)).await;

        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 3);
        // Dependency completes before its dependent.
        assert_eq!(report.succeeded.last().unwrap(), "wait_again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_skips_transitive_dependents() {
        let bucket = TempDir::new().unwrap();
        write_signal(&bucket, "blocks");
        // No transactions signal: that wait times out.

        let graph = TaskGraph::new(vec![
            wait_node("wait_blocks", "blocks", &[]),
            wait_node("wait_transactions", "transactions", &[]),
            wait_node("child", "blocks", &["wait_transactions"]),
            wait_node("grandchild", "blocks", &["child"]),
        ])
        .unwrap();

        let ctx = context(&bucket, 0);
        let report = run_graph(&graph, &ctx, policy(&ctx)).await;

        assert_eq!(report.succeeded, vec!["wait_blocks"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "wait_transactions");
        assert_eq!(report.skipped, vec!["child", "grandchild"]);
        assert!(!report.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_with_one_failed_dep_is_skipped_even_if_other_succeeds() {
        let bucket = TempDir::new().unwrap();
        write_signal(&bucket, "blocks");

        let graph = TaskGraph::new(vec![
            wait_node("ok", "blocks", &[]),
            wait_node("bad", "transactions", &[]),
            wait_node("joint", "blocks", &["ok", "bad"]),
        ])
        .unwrap();

        let ctx = context(&bucket, 0);
        let report = run_graph(&graph, &ctx, policy(&ctx)).await;

        assert_eq!(report.succeeded, vec!["ok"]);
        assert_eq!(report.skipped, vec!["joint"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventually_succeeds() {
        let bucket = TempDir::new().unwrap();
        // Wait times out on the first attempt, then the signal lands and the
        // retry observes it.
        let graph = TaskGraph::new(vec![wait_node("wait_blocks", "blocks", &[])]).unwrap();

        let ctx = context(&bucket, 2);
        let run = run_graph(&graph, &ctx, policy(&ctx));

        let writer = async {
            // Past the first attempt's 120s timeout, within the retry window.
            tokio::time::sleep(Duration::from_secs(121)).await;
            write_signal(&bucket, "blocks");
        };

        let (report, ()) = tokio::join!(run, writer);
        assert!(report.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_fails_pending_tasks() {
        let bucket = TempDir::new().unwrap();
        let graph = TaskGraph::new(vec![
            wait_node("wait_blocks", "blocks", &[]),
            wait_node("child", "blocks", &["wait_blocks"]),
        ])
        .unwrap();

        let ctx = context(&bucket, 5);
        ctx.shutdown.cancel();
        let report = run_graph(&graph, &ctx, policy(&ctx)).await;

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("cancelled"));
        assert_eq!(report.skipped, vec!["child"]);
    }
}
