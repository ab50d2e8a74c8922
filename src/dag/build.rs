//! Construction of the per-chain load graph.
//!
//! The graph shape is fixed across chains except for the verification rules
//! excluded for a particular chain:
//!
//! ```text
//! wait_latest_blocks ─▶ load_blocks ─▶ enrich_blocks ──▶ verify_* ...
//! wait_latest_transactions ─▶ load_transactions ─▶ enrich_transactions ─┬▶ enrich_inputs
//!                                                                      └▶ enrich_outputs
//! ```
//!
//! Verification nodes hang off the enrichment tasks their queries read.

use crate::config::PipelineConfig;
use crate::error::GraphError;
use crate::warehouse::SourceFormat;

use super::{excluded_rules, TaskGraph, TaskKind, TaskNode};

const FORMAT: SourceFormat = SourceFormat::NewlineDelimitedJson;

fn deps(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Build the load graph for the configured chain.
pub fn build_load_graph(config: &PipelineConfig) -> Result<TaskGraph, GraphError> {
    let mut nodes = Vec::new();

    for entity in ["blocks", "transactions"] {
        nodes.push(TaskNode::new(
            format!("wait_latest_{entity}"),
            TaskKind::WaitExport {
                entity: entity.to_string(),
                format: FORMAT,
            },
            Vec::new(),
        ));
        nodes.push(TaskNode::new(
            format!("load_{entity}"),
            TaskKind::Load {
                entity: entity.to_string(),
                format: FORMAT,
                allow_quoted_newlines: false,
            },
            vec![format!("wait_latest_{entity}")],
        ));
    }

    nodes.push(TaskNode::new(
        "enrich_blocks",
        TaskKind::EnrichTable {
            entity: "blocks".to_string(),
            partition_field: Some("timestamp_month".to_string()),
        },
        deps(&["load_blocks"]),
    ));
    nodes.push(TaskNode::new(
        "enrich_transactions",
        TaskKind::EnrichTable {
            entity: "transactions".to_string(),
            partition_field: Some("block_timestamp_month".to_string()),
        },
        deps(&["load_transactions"]),
    ));

    // Inputs and outputs are views over the enriched transactions table.
    for entity in ["inputs", "outputs"] {
        nodes.push(TaskNode::new(
            format!("enrich_{entity}"),
            TaskKind::EnrichView {
                entity: entity.to_string(),
            },
            deps(&["enrich_transactions"]),
        ));
    }

    let excluded = excluded_rules(&config.chain);
    for rule in super::VerifyRule::ALL {
        if excluded.contains(&rule) {
            continue;
        }
        nodes.push(TaskNode::new(
            format!("verify_{}", rule.name()),
            TaskKind::Verify { rule },
            rule.dependencies()
                .iter()
                .map(|dep| dep.to_string())
                .collect(),
        ));
    }

    TaskGraph::new(nodes)
}
