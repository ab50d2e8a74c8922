//! Pipeline configuration.
//!
//! One YAML file per chain instantiates the whole pipeline: the chain name
//! drives dataset naming, resource file locations, and per-chain
//! verification exclusions. Unknown keys are rejected so a typo in a config
//! file fails loudly instead of silently falling back to a default.

use chrono::NaiveDate;
use serde::Deserialize;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyBucketSnafu, EmptyChainSnafu, EmptyProjectSnafu, ReadConfigSnafu,
    YamlParseSnafu,
};
use crate::template::Environment;

fn default_retries() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    300
}

fn default_wait_timeout_secs() -> u64 {
    3600
}

fn default_poke_interval_secs() -> u64 {
    60
}

fn default_schedule() -> String {
    "0 4 * * *".to_string()
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from("resources")
}

/// Configuration for one chain's load pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Chain name, e.g. `bitcoin` or `dogecoin`. Drives dataset naming and
    /// verification rule exclusions.
    pub chain: String,

    /// Bucket (or local directory, in tests) holding the exporter's output.
    pub output_bucket: String,

    /// Project that owns the public enriched dataset.
    pub destination_project: String,

    /// Directory holding schemas, queries and descriptions.
    #[serde(default = "default_resources_dir")]
    pub resources_dir: PathBuf,

    /// Cron schedule the pipeline is meant to run on. Recorded for the
    /// scheduler that invokes the binary; the run itself takes `--date`.
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// First date the chain has export data for.
    pub start_date: NaiveDate,

    /// Task retry attempts after the first failure.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay between retry attempts, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Overall export wait timeout, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Interval between export signal polls, in seconds.
    #[serde(default = "default_poke_interval_secs")]
    pub poke_interval_secs: u64,

    /// Recipients for failure notifications. Empty disables notification.
    #[serde(default)]
    pub notification_emails: Vec<String>,
}

impl PipelineConfig {
    /// Load and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        let config: Self = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.chain.trim().is_empty(), EmptyChainSnafu);
        ensure!(!self.output_bucket.trim().is_empty(), EmptyBucketSnafu);
        ensure!(
            !self.destination_project.trim().is_empty(),
            EmptyProjectSnafu
        );
        Ok(())
    }

    /// Enriched dataset, e.g. `bitcoin_blockchain`.
    pub fn dataset_name(&self) -> String {
        format!("{}_blockchain", self.chain)
    }

    /// Raw dataset holding as-exported tables.
    pub fn dataset_name_raw(&self) -> String {
        format!("{}_blockchain_raw", self.chain)
    }

    /// Scratch dataset for temporary materialization tables.
    pub fn dataset_name_temp(&self) -> String {
        format!("{}_blockchain_temp", self.chain)
    }

    /// Substitution environment handed to every parameterized query.
    pub fn environment(&self) -> Environment {
        Environment::new()
            .with("chain", &self.chain)
            .with("dataset_name", self.dataset_name())
            .with("dataset_name_raw", self.dataset_name_raw())
            .with("dataset_name_temp", self.dataset_name_temp())
            .with("destination_dataset_project_id", &self.destination_project)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poke_interval(&self) -> Duration {
        Duration::from_secs(self.poke_interval_secs)
    }

    /// Schema file for a raw (as-exported) table.
    pub fn raw_schema_path(&self, entity: &str) -> PathBuf {
        self.resources_dir
            .join("stages/raw/schemas")
            .join(format!("{entity}.json"))
    }

    /// Schema file for an enriched table.
    pub fn enrich_schema_path(&self, entity: &str) -> PathBuf {
        self.resources_dir
            .join("stages/enrich/schemas")
            .join(format!("{entity}.json"))
    }

    /// Materialization (or view definition) query for an enriched table.
    pub fn enrich_sql_path(&self, entity: &str) -> PathBuf {
        self.resources_dir
            .join("stages/enrich/sqls")
            .join(format!("{entity}.sql"))
    }

    /// Human-readable description attached to an enriched table.
    pub fn enrich_description_path(&self, entity: &str) -> PathBuf {
        self.resources_dir
            .join("stages/enrich/descriptions")
            .join(format!("{entity}.txt"))
    }

    /// Assertion query for a verification rule.
    pub fn verify_sql_path(&self, rule: &str) -> PathBuf {
        self.resources_dir
            .join("stages/verify/sqls")
            .join(format!("{rule}.sql"))
    }
}
