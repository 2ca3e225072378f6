//! Collaborator traits for notebook execution and status reporting.
//!
//! Implemented by the `nbgrade-runner` and `nbgrade-portal` crates
//! respectively.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::model::Notebook;

// ---------------------------------------------------------------------------
// Notebook executor trait
// ---------------------------------------------------------------------------

/// Runs every code cell of a notebook and returns the executed copy.
#[async_trait]
pub trait NotebookExecutor: Send + Sync {
    /// Human-readable executor name (e.g. "jupyter").
    fn name(&self) -> &str;

    /// Execute the notebook. Must return within `request.timeout`.
    async fn execute(&self, request: &ExecuteRequest) -> Result<Notebook, ExecutionError>;
}

/// Request to execute a notebook.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub notebook: Notebook,
    /// Budget for the whole run. `None` lets the executor pick its default.
    pub timeout: Option<Duration>,
    /// Keep executing after a cell raises.
    pub allow_errors: bool,
    /// Directory the kernel starts in, so relative data files resolve.
    pub working_dir: Option<PathBuf>,
}

impl ExecuteRequest {
    pub fn new(notebook: Notebook) -> Self {
        Self {
            notebook,
            timeout: None,
            allow_errors: true,
            working_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Result reporter trait
// ---------------------------------------------------------------------------

/// Grading lifecycle state published to a reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    Grading,
    ChecksumFailed,
    Graded,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Grading => "grading",
            SubmissionStatus::ChecksumFailed => "checksum-failed",
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status update for a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: SubmissionStatus,
    pub score: Option<f64>,
    /// The executed notebook; only attached to `graded`.
    pub notebook: Option<Notebook>,
    pub message: String,
}

impl StatusReport {
    pub fn grading() -> Self {
        Self {
            status: SubmissionStatus::Grading,
            score: None,
            notebook: None,
            message: String::new(),
        }
    }

    pub fn checksum_failed() -> Self {
        Self {
            status: SubmissionStatus::ChecksumFailed,
            score: None,
            notebook: None,
            message: String::new(),
        }
    }

    pub fn graded(score: f64, notebook: Notebook) -> Self {
        Self {
            status: SubmissionStatus::Graded,
            score: Some(score),
            notebook: Some(notebook),
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SubmissionStatus::Failed,
            score: None,
            notebook: None,
            message: message.into(),
        }
    }
}

/// Publishes grading status somewhere (a portal, a log, a test buffer).
#[async_trait]
pub trait ResultReporter: Send + Sync {
    fn name(&self) -> &str;

    async fn report(&self, report: &StatusReport) -> anyhow::Result<()>;
}

/// Reporter that drops every update.
pub struct NoopReporter;

#[async_trait]
impl ResultReporter for NoopReporter {
    fn name(&self) -> &str {
        "noop"
    }

    async fn report(&self, _: &StatusReport) -> anyhow::Result<()> {
        Ok(())
    }
}
