//! Run outcome notification.
//!
//! Failure notification is a pluggable seam: the default implementation
//! only logs, carrying the configured recipient list so an email or
//! webhook notifier can slot in without touching the executor.

use tracing::{error, info};

use crate::dag::executor::RunReport;

/// Receives the outcome of a finished graph run.
pub trait Notifier: Send + Sync {
    fn notify(&self, chain: &str, report: &RunReport);
}

/// Notifier that records outcomes in the log stream.
#[derive(Debug, Default)]
pub struct LogNotifier {
    recipients: Vec<String>,
}

impl LogNotifier {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, chain: &str, report: &RunReport) {
        if report.is_success() {
            info!(chain, succeeded = report.succeeded.len(), "Pipeline run succeeded");
            return;
        }

        for (task, error) in &report.failed {
            error!(chain, task = %task, error = %error, "Pipeline task failed");
        }
        if !self.recipients.is_empty() {
            info!(
                chain,
                recipients = %self.recipients.join(","),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "Failure notification recorded"
            );
        }
    }
}
