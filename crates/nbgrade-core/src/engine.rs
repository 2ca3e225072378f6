//! Grading pipeline orchestrator.
//!
//! Sequences policy check, validation, execution and grading for one
//! submission, and grades batches of submissions with bounded parallelism.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::checksum::Baseline;
use crate::error::GradingError;
use crate::grade::{check_full_score, check_max_score, grade_cells, CellScore, GradeResult, ManualScores};
use crate::model::Notebook;
use crate::policy::{forbid_hidden_tests, HiddenTestPolicy};
use crate::traits::{ExecuteRequest, NotebookExecutor, ResultReporter, StatusReport};
use crate::validate::{validate, ValidationOutcome};

/// Where in the pipeline a validation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeExecution,
    AfterExecution,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::BeforeExecution => f.write_str("before execution"),
            Checkpoint::AfterExecution => f.write_str("after execution"),
        }
    }
}

/// Configuration for the grading pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validate the submission against its baseline before execution.
    pub validate_before: bool,
    /// Validate again on the executed notebook.
    pub validate_after: bool,
    /// Execute the notebook; when false the submitted outputs are graded.
    pub execute: bool,
    /// Execution budget per notebook.
    pub timeout: Option<Duration>,
    /// Keep executing after a cell raises.
    pub allow_errors: bool,
    /// Require the summed max score to equal this total.
    pub expected_total: Option<f64>,
    /// Require full marks (reference solution check).
    pub require_full_score: bool,
    /// Reject notebooks containing hidden test delimiters.
    pub hidden_tests: Option<HiddenTestPolicy>,
    /// Scores for manually graded cells.
    pub manual_scores: ManualScores,
    /// Maximum concurrent submissions in [`GradingPipeline::run_batch`].
    pub parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validate_before: true,
            validate_after: true,
            execute: true,
            timeout: None,
            allow_errors: true,
            expected_total: None,
            require_full_score: false,
            hidden_tests: None,
            manual_scores: ManualScores::new(),
            parallelism: 4,
        }
    }
}

/// A notebook to grade.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Identifier used in logs and batch results.
    pub id: String,
    pub notebook: Notebook,
    /// Published checksums; validation is skipped without one.
    pub baseline: Option<Baseline>,
    pub working_dir: Option<PathBuf>,
}

impl Submission {
    pub fn new(id: impl Into<String>, notebook: Notebook) -> Self {
        Self {
            id: id.into(),
            notebook,
            baseline: None,
            working_dir: None,
        }
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// A successfully graded submission.
#[derive(Debug, Clone)]
pub struct GradeOutcome {
    /// The notebook that was graded (the executed copy when executing).
    pub notebook: Notebook,
    pub result: GradeResult,
    pub cells: Vec<CellScore>,
    pub duration: Duration,
}

/// The grading pipeline.
pub struct GradingPipeline {
    executor: Arc<dyn NotebookExecutor>,
    config: PipelineConfig,
}

impl GradingPipeline {
    pub fn new(executor: Arc<dyn NotebookExecutor>, config: PipelineConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Grade one submission, publishing its lifecycle to `reporter`.
    ///
    /// A mismatch is reported as `checksum-failed`; every other failure as
    /// `failed`. Failures never produce a partial grade.
    #[tracing::instrument(skip_all, fields(submission = %submission.id))]
    pub async fn run(
        &self,
        submission: Submission,
        reporter: &dyn ResultReporter,
    ) -> Result<GradeOutcome, GradingError> {
        reporter
            .report(&StatusReport::grading())
            .await
            .map_err(GradingError::Report)?;

        match self.grade_submission(submission).await {
            Ok(outcome) => {
                tracing::info!(
                    total = outcome.result.total_score,
                    max = outcome.result.max_score,
                    "graded"
                );
                reporter
                    .report(&StatusReport::graded(
                        outcome.result.total_score,
                        outcome.notebook.clone(),
                    ))
                    .await
                    .map_err(GradingError::Report)?;
                Ok(outcome)
            }
            Err(err) => {
                let status = match &err {
                    GradingError::Mismatch { .. } => StatusReport::checksum_failed(),
                    other => StatusReport::failed(format!("Unhandled exception {other}")),
                };
                tracing::warn!("grading failed: {err}");
                if let Err(e) = reporter.report(&status).await {
                    tracing::error!("failed to report {} status: {e:#}", status.status);
                }
                Err(err)
            }
        }
    }

    /// Grade many submissions, at most `parallelism` at a time.
    ///
    /// Results are returned in input order, keyed by submission id.
    pub async fn run_batch(
        &self,
        submissions: Vec<Submission>,
        reporter: &dyn ResultReporter,
    ) -> Vec<(String, Result<GradeOutcome, GradingError>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, submission) in submissions.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let id = submission.id.clone();
                let _permit = semaphore.acquire_owned().await.ok();
                (index, id, self.run(submission, reporter).await)
            });
        }

        let mut results = Vec::with_capacity(futures.len());
        while let Some(result) = futures.next().await {
            results.push(result);
        }
        results.sort_by_key(|(index, _, _)| *index);

        let failed = results.iter().filter(|(_, _, r)| r.is_err()).count();
        tracing::info!(total = results.len(), failed, "batch complete");

        results.into_iter().map(|(_, id, r)| (id, r)).collect()
    }

    async fn grade_submission(&self, submission: Submission) -> Result<GradeOutcome, GradingError> {
        let start = Instant::now();
        let config = &self.config;

        if let Some(policy) = &config.hidden_tests {
            forbid_hidden_tests(&submission.notebook, policy)?;
        }

        let baseline = submission.baseline.as_ref();
        if config.validate_before {
            check_baseline(&submission.notebook, baseline, Checkpoint::BeforeExecution)?;
        }

        let notebook = if config.execute {
            tracing::debug!(executor = self.executor.name(), "executing notebook");
            let request = ExecuteRequest {
                notebook: submission.notebook,
                timeout: config.timeout,
                allow_errors: config.allow_errors,
                working_dir: submission.working_dir,
            };
            let executed = self.executor.execute(&request).await?;
            if config.validate_after {
                check_baseline(&executed, baseline, Checkpoint::AfterExecution)?;
            }
            executed
        } else {
            submission.notebook
        };

        let cells = grade_cells(&notebook, &config.manual_scores)?;
        let result = GradeResult::from_cells(&cells);

        if let Some(expected) = config.expected_total {
            check_max_score(&result, expected)?;
        }
        if config.require_full_score {
            check_full_score(&result)?;
        }

        Ok(GradeOutcome {
            notebook,
            result,
            cells,
            duration: start.elapsed(),
        })
    }
}

fn check_baseline(
    notebook: &Notebook,
    baseline: Option<&Baseline>,
    checkpoint: Checkpoint,
) -> Result<(), GradingError> {
    let Some(baseline) = baseline else {
        tracing::debug!(%checkpoint, "no baseline, skipping validation");
        return Ok(());
    };
    match validate(notebook, baseline)? {
        ValidationOutcome::Valid => Ok(()),
        ValidationOutcome::Mismatch { changed } => Err(GradingError::Mismatch { checkpoint, changed }),
    }
}
