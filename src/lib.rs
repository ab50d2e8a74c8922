//! Permafrost: a chain-agnostic warehouse load pipeline for blockchain
//! export data.
//!
//! One run covers one chain and one execution date: wait for the exporter's
//! signal files in object storage, bulk-load the raw tables, materialize
//! the enriched tables through staged temp-table copies, then verify the
//! result with per-chain assertion queries. The stages form a task graph
//! executed with per-task retries and failure-poisoned dependents.

pub mod config;
pub mod dag;
pub mod error;
pub mod notify;
pub mod schema;
pub mod sensor;
pub mod storage;
pub mod tasks;
pub mod template;
pub mod tracing;
pub mod warehouse;

pub use config::PipelineConfig;
pub use dag::build::build_load_graph;
pub use dag::executor::{run_graph, RetryPolicy, RunReport};
pub use dag::TaskGraph;
pub use notify::{LogNotifier, Notifier};
pub use storage::{StorageClient, StorageClientRef};
pub use tasks::TaskContext;
pub use crate::tracing::init_tracing;
pub use warehouse::memory::MemoryWarehouse;
pub use warehouse::Warehouse;
