//! Permafrost CLI: run one chain's load pipeline for one execution date.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use permafrost::{
    build_load_graph, init_tracing, run_graph, LogNotifier, MemoryWarehouse, Notifier,
    PipelineConfig, RetryPolicy, StorageClient, TaskContext,
};

#[derive(Debug, Parser)]
#[command(name = "permafrost", about = "Blockchain export load pipeline")]
struct Cli {
    /// Path to the chain's pipeline configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Execution date (YYYY-MM-DD). Defaults to today, UTC.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Print the task graph and exit without executing anything.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = Cli::parse();

    let config = match PipelineConfig::from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let graph = match build_load_graph(&config) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Failed to build task graph: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.dry_run {
        println!("Task graph for chain '{}':", config.chain);
        for node in graph.nodes() {
            if node.deps.is_empty() {
                println!("  {}", node.id);
            } else {
                println!("  {} <- {}", node.id, node.deps.join(", "));
            }
        }
        return ExitCode::SUCCESS;
    }

    let date = args.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    info!(chain = %config.chain, %date, tasks = graph.len(), "Starting pipeline run");

    let storage = match StorageClient::for_url(&config.output_bucket) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            eprintln!("Failed to open output bucket: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    warn!(
        "No remote warehouse backend is configured; executing against the \
         in-memory warehouse. No external tables will be written."
    );

    let config = Arc::new(config);
    let policy = RetryPolicy::from_config(&config);
    let notifier = LogNotifier::new(config.notification_emails.clone());
    let ctx = TaskContext::new(
        config.clone(),
        Arc::new(MemoryWarehouse::new()),
        storage,
        date,
        shutdown,
    );

    let report = run_graph(&graph, &ctx, policy).await;
    notifier.notify(&config.chain, &report);

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
