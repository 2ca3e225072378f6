//! In-memory reporter for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use nbgrade_core::traits::{ResultReporter, StatusReport, SubmissionStatus};

/// Records every status update instead of sending it anywhere.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<StatusReport>>,
    /// Fail when asked to report this status.
    fail_on: Option<SubmissionStatus>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter whose `report` fails for `status`.
    pub fn failing_on(status: SubmissionStatus) -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            fail_on: Some(status),
        }
    }

    /// All reports received so far.
    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Statuses received so far, in order.
    pub fn statuses(&self) -> Vec<SubmissionStatus> {
        self.reports().iter().map(|r| r.status).collect()
    }
}

#[async_trait]
impl ResultReporter for RecordingReporter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn report(&self, report: &StatusReport) -> anyhow::Result<()> {
        if self.fail_on == Some(report.status) {
            anyhow::bail!("refusing to record {} status", report.status);
        }
        self.reports
            .lock()
            .map_err(|_| anyhow::anyhow!("recording reporter poisoned"))?
            .push(report.clone());
        Ok(())
    }
}
