//! The task graph.
//!
//! A pipeline run is a directed acyclic graph of named tasks. Nodes carry a
//! [`TaskKind`] describing the operation and the list of task ids they
//! depend on; [`TaskGraph::new`] validates the shape (unique ids, known
//! dependencies, no cycles) before anything executes.

pub mod build;
pub mod executor;

use indexmap::IndexMap;
use snafu::prelude::*;

use crate::error::{CycleSnafu, DuplicateTaskSnafu, GraphError, UnknownDependencySnafu};
use crate::warehouse::SourceFormat;

/// Per-chain verification rule.
///
/// Each rule maps to one assertion query file; its dependencies are the
/// enriched tables the query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyRule {
    BlocksCount,
    BlocksHaveLatest,
    TransactionsCount,
    TransactionsHaveLatest,
    TransactionsFees,
    CoinbaseTransactionsCount,
    TransactionInputsCount,
    TransactionOutputsCount,
    TransactionInputsCountEmpty,
    TransactionOutputsCountEmpty,
}

impl VerifyRule {
    pub const ALL: [VerifyRule; 10] = [
        VerifyRule::BlocksCount,
        VerifyRule::BlocksHaveLatest,
        VerifyRule::TransactionsCount,
        VerifyRule::TransactionsHaveLatest,
        VerifyRule::TransactionsFees,
        VerifyRule::CoinbaseTransactionsCount,
        VerifyRule::TransactionInputsCount,
        VerifyRule::TransactionOutputsCount,
        VerifyRule::TransactionInputsCountEmpty,
        VerifyRule::TransactionOutputsCountEmpty,
    ];

    /// Rule name; also the assertion query's file stem.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlocksCount => "blocks_count",
            Self::BlocksHaveLatest => "blocks_have_latest",
            Self::TransactionsCount => "transactions_count",
            Self::TransactionsHaveLatest => "transactions_have_latest",
            Self::TransactionsFees => "transactions_fees",
            Self::CoinbaseTransactionsCount => "coinbase_transactions_count",
            Self::TransactionInputsCount => "transaction_inputs_count",
            Self::TransactionOutputsCount => "transaction_outputs_count",
            Self::TransactionInputsCountEmpty => "transaction_inputs_count_empty",
            Self::TransactionOutputsCountEmpty => "transaction_outputs_count_empty",
        }
    }

    /// Enrichment tasks this rule's query reads from.
    pub fn dependencies(&self) -> &'static [&'static str] {
        match self {
            Self::BlocksCount | Self::BlocksHaveLatest => &["enrich_blocks"],
            Self::TransactionsCount | Self::CoinbaseTransactionsCount => {
                &["enrich_blocks", "enrich_transactions"]
            }
            Self::TransactionsHaveLatest
            | Self::TransactionsFees
            | Self::TransactionInputsCount
            | Self::TransactionOutputsCount
            | Self::TransactionInputsCountEmpty
            | Self::TransactionOutputsCountEmpty => &["enrich_transactions"],
        }
    }
}

/// Rules that do not hold on a given chain and are left out of its graph.
///
/// Dogecoin block rewards are inconsistent with the fee arithmetic the fees
/// rule asserts; shielded Zcash transactions legitimately have no
/// transparent inputs or outputs.
pub fn excluded_rules(chain: &str) -> &'static [VerifyRule] {
    match chain {
        "dogecoin" => &[VerifyRule::TransactionsFees],
        "zcash" => &[
            VerifyRule::TransactionInputsCountEmpty,
            VerifyRule::TransactionOutputsCountEmpty,
        ],
        _ => &[],
    }
}

/// The operation a graph node performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Poll object storage for the day's export signal.
    WaitExport { entity: String, format: SourceFormat },
    /// Bulk-load export files into the raw dataset.
    Load {
        entity: String,
        format: SourceFormat,
        allow_quoted_newlines: bool,
    },
    /// Materialize an enriched table via the staged flow.
    EnrichTable {
        entity: String,
        partition_field: Option<String>,
    },
    /// Replace an enriched view definition.
    EnrichView { entity: String },
    /// Run one verification rule.
    Verify { rule: VerifyRule },
}

/// One node of the task graph.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: String,
    pub kind: TaskKind,
    /// Ids of tasks that must succeed before this one runs.
    pub deps: Vec<String>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, kind: TaskKind, deps: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            deps,
        }
    }
}

/// A validated, immutable task graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: IndexMap<String, TaskNode>,
}

impl TaskGraph {
    /// Build a graph, validating ids, dependency references and acyclicity.
    pub fn new(nodes: Vec<TaskNode>) -> Result<Self, GraphError> {
        let mut map = IndexMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone();
            ensure!(
                map.insert(id.clone(), node).is_none(),
                DuplicateTaskSnafu { id }
            );
        }

        for node in map.values() {
            for dep in &node.deps {
                ensure!(
                    map.contains_key(dep),
                    UnknownDependencySnafu {
                        id: node.id.clone(),
                        dependency: dep.clone(),
                    }
                );
            }
        }

        let graph = Self { nodes: map };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            graph: &TaskGraph,
            id: &str,
            marks: &mut IndexMap<String, Mark>,
        ) -> Result<(), GraphError> {
            match marks.get(id).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InProgress => return CycleSnafu { id }.fail(),
                Mark::Unvisited => {}
            }
            marks.insert(id.to_string(), Mark::InProgress);
            if let Some(node) = graph.nodes.get(id) {
                for dep in &node.deps {
                    visit(graph, dep, marks)?;
                }
            }
            marks.insert(id.to_string(), Mark::Done);
            Ok(())
        }

        let mut marks = IndexMap::new();
        for id in self.nodes.keys() {
            visit(self, id, &mut marks)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of nodes that directly depend on `id`.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|node| node.deps.iter().any(|dep| dep == id))
            .map(|node| node.id.as_str())
            .collect()
    }
}
