//! In-memory warehouse backend.
//!
//! Models table state and job lifecycles without executing any SQL: query
//! jobs record their statement and materialize a marker row, load and copy
//! jobs replace destination contents wholesale. Every visible mutation of a
//! table bumps its version counter exactly once, which is what the
//! materialization tests assert against.
//!
//! Backs the test suite and CLI runs until a remote client is wired in
//! behind the same trait. Failure injection lets tests exercise the error
//! paths (`fail_queries_matching`, `mangle_created_ids`).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    CopyJobConfig, JobHandle, JobKind, JobStatus, LoadJobConfig, QueryJobConfig, TableRef,
    TableSpec, Warehouse,
};
use crate::error::{JobError, TableExistsSnafu, TableNotFoundSnafu, UnknownJobSnafu};
use snafu::prelude::*;

#[derive(Debug, Clone)]
struct TableState {
    spec: TableSpec,
    rows: Vec<Value>,
    version: u64,
}

/// Point-in-time view of a table, for assertions.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub spec: TableSpec,
    pub rows: Vec<Value>,
    /// Number of visible mutations this table has undergone.
    pub version: u64,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, TableState>,
    jobs: HashMap<String, JobStatus>,
    next_job_id: u64,
    fail_patterns: Vec<String>,
    panic_patterns: Vec<String>,
    mangle_created_ids: bool,
    query_log: Vec<String>,
}

impl Inner {
    fn new_job(&mut self, kind: JobKind, status: JobStatus) -> JobHandle {
        self.next_job_id += 1;
        let id = format!("{}-{}", kind, self.next_job_id);
        self.jobs.insert(id.clone(), status);
        JobHandle { id, kind }
    }

    fn failing_pattern(&self, sql: &str) -> Option<&str> {
        self.fail_patterns
            .iter()
            .map(String::as_str)
            .find(|pattern| sql.contains(*pattern))
    }
}

/// In-memory [`Warehouse`] implementation.
#[derive(Default)]
pub struct MemoryWarehouse {
    inner: Mutex<Inner>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicked test thread must not wedge every other accessor.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make every subsequent query job whose SQL contains `pattern` fail.
    pub fn fail_queries_matching(&self, pattern: impl Into<String>) {
        self.lock().fail_patterns.push(pattern.into());
    }

    /// Make every subsequent query job whose SQL contains `pattern` panic,
    /// to exercise abnormal task termination.
    pub fn panic_queries_matching(&self, pattern: impl Into<String>) {
        self.lock().panic_patterns.push(pattern.into());
    }

    /// Make `create_table` return an identifier that does not match the
    /// requested name, to exercise the invariant-violation path.
    pub fn mangle_created_ids(&self) {
        self.lock().mangle_created_ids = true;
    }

    /// Snapshot a table's current state, if it exists.
    pub fn snapshot(&self, table: &TableRef) -> Option<TableSnapshot> {
        let inner = self.lock();
        inner.tables.get(&table.to_string()).map(|state| TableSnapshot {
            spec: state.spec.clone(),
            rows: state.rows.clone(),
            version: state.version,
        })
    }

    /// Names of all existing tables (fully qualified).
    pub fn table_names(&self) -> Vec<String> {
        let inner = self.lock();
        let mut names: Vec<String> = inner.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// All SQL statements submitted as query jobs, in order.
    pub fn submitted_queries(&self) -> Vec<String> {
        self.lock().query_log.clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn create_table(&self, table: &TableRef, spec: &TableSpec) -> Result<String, JobError> {
        let mut inner = self.lock();
        let key = table.to_string();
        ensure!(
            !inner.tables.contains_key(&key),
            TableExistsSnafu { table: key }
        );

        inner.tables.insert(
            key,
            TableState {
                spec: spec.clone(),
                rows: Vec::new(),
                version: 0,
            },
        );

        if inner.mangle_created_ids {
            Ok(format!("{}_mangled", table.table))
        } else {
            Ok(table.table.clone())
        }
    }

    async fn delete_table(&self, table: &TableRef) -> Result<(), JobError> {
        let mut inner = self.lock();
        let key = table.to_string();
        inner
            .tables
            .remove(&key)
            .context(TableNotFoundSnafu { table: key })?;
        Ok(())
    }

    async fn submit_load(
        &self,
        source_uri: &str,
        destination: &TableRef,
        config: &LoadJobConfig,
    ) -> Result<JobHandle, JobError> {
        let mut inner = self.lock();
        let key = destination.to_string();
        let version = inner.tables.get(&key).map(|t| t.version).unwrap_or(0);

        // Truncate semantics: prior contents replaced entirely.
        inner.tables.insert(
            key,
            TableState {
                spec: TableSpec::table(config.schema.clone(), None, None),
                rows: vec![json!({ "loaded_from": source_uri })],
                version: version + 1,
            },
        );

        Ok(inner.new_job(JobKind::Load, JobStatus::done()))
    }

    async fn submit_query(
        &self,
        sql: &str,
        config: &QueryJobConfig,
    ) -> Result<JobHandle, JobError> {
        let mut inner = self.lock();
        inner.query_log.push(sql.to_string());

        if let Some(pattern) = inner
            .panic_patterns
            .iter()
            .find(|pattern| sql.contains(pattern.as_str()))
        {
            panic!("query matched abort pattern '{pattern}'");
        }

        if let Some(pattern) = inner.failing_pattern(sql) {
            let status = JobStatus::failed(format!("query matched failure pattern '{pattern}'"));
            return Ok(inner.new_job(JobKind::Query, status));
        }

        if let Some(destination) = &config.destination {
            let key = destination.to_string();
            let marker = json!({ "query": sql });
            match inner.tables.get_mut(&key) {
                Some(state) => {
                    state.rows = vec![marker];
                    state.version += 1;
                }
                None => {
                    inner.tables.insert(
                        key,
                        TableState {
                            spec: TableSpec::table(Vec::new(), None, None),
                            rows: vec![marker],
                            version: 1,
                        },
                    );
                }
            }
        }

        Ok(inner.new_job(JobKind::Query, JobStatus::done()))
    }

    async fn submit_copy(
        &self,
        source: &TableRef,
        destination: &TableRef,
        _config: &CopyJobConfig,
    ) -> Result<JobHandle, JobError> {
        let mut inner = self.lock();
        let source_key = source.to_string();
        let dest_key = destination.to_string();

        let Some(source_state) = inner.tables.get(&source_key).cloned() else {
            let status = JobStatus::failed(format!("copy source '{source_key}' not found"));
            return Ok(inner.new_job(JobKind::Copy, status));
        };

        // The single externally visible mutation: destination replaced
        // wholesale, one version bump, under one lock acquisition.
        let version = inner.tables.get(&dest_key).map(|t| t.version).unwrap_or(0);
        inner.tables.insert(
            dest_key,
            TableState {
                spec: source_state.spec,
                rows: source_state.rows,
                version: version + 1,
            },
        );

        Ok(inner.new_job(JobKind::Copy, JobStatus::done()))
    }

    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus, JobError> {
        let inner = self.lock();
        inner
            .jobs
            .get(&job.id)
            .cloned()
            .context(UnknownJobSnafu {
                job_id: job.id.clone(),
            })
    }
}
