//! Task bodies for the load pipeline.
//!
//! Each stage of the graph is a free async function taking a shared
//! [`TaskContext`]: wait for the export signal, bulk-load a raw table,
//! materialize an enriched table, or run a verification query. The graph
//! executor decides ordering, retries and cancellation; task bodies only
//! perform their one operation and raise on failure.

pub mod enrich;
pub mod load;
pub mod verify;

use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::storage::StorageClientRef;
use crate::template::Environment;
use crate::warehouse::Warehouse;

/// Shared state handed to every task in a run.
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<PipelineConfig>,
    /// Substitution environment, derived once from the config.
    pub env: Environment,
    pub warehouse: Arc<dyn Warehouse>,
    pub storage: StorageClientRef,
    /// The execution date this run covers.
    pub date: NaiveDate,
    pub shutdown: CancellationToken,
}

impl TaskContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        warehouse: Arc<dyn Warehouse>,
        storage: StorageClientRef,
        date: NaiveDate,
        shutdown: CancellationToken,
    ) -> Self {
        let env = config.environment();
        Self {
            config,
            env,
            warehouse,
            storage,
            date,
            shutdown,
        }
    }
}
