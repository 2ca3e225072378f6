//! Error taxonomy of the grading engine.
//!
//! Structural errors, execution failures and score-check failures are kept as
//! distinct types so callers can branch on the category (and CLI callers can
//! map each one to its own exit code) without string matching. A checksum
//! mismatch is not an error at this level: the validator returns it as a value.

use std::time::Duration;

use thiserror::Error;

use crate::engine::Checkpoint;

/// The notebook's grading structure is unusable. Fatal, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    /// A grading block is present but cannot be interpreted.
    #[error("malformed grading metadata{}: {reason}", cell_suffix(.cell))]
    MalformedMetadata { cell: Option<usize>, reason: String },

    /// Two graded cells share a `grade_id`.
    #[error("duplicate grade_id `{0}`")]
    DuplicateGradeId(String),

    /// A graded cell declares a missing, negative or non-numeric point value.
    #[error("invalid points for grade cell `{grade_id}`: {value}")]
    InvalidPoints { grade_id: String, value: String },

    /// The baseline names a graded cell the notebook does not have.
    #[error("graded cell `{0}` from the baseline is missing from the notebook")]
    MissingGradedCell(String),

    /// The notebook has a graded cell the baseline does not know.
    #[error("unknown grade_id `{0}` found in the notebook")]
    UnknownGradedCell(String),

    /// A manual score was supplied for a cell that is not manually graded.
    #[error("manual score supplied for `{0}`, which is not a manually graded cell")]
    UnknownManualScore(String),

    /// A manual score is not a finite number.
    #[error("invalid manual score for `{grade_id}`: {value}")]
    InvalidManualScore { grade_id: String, value: f64 },
}

impl StructuralError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        StructuralError::MalformedMetadata {
            cell: None,
            reason: reason.into(),
        }
    }

    /// Attach the index of the offending cell, if the error concerns one.
    pub(crate) fn at_cell(self, index: usize) -> Self {
        match self {
            StructuralError::MalformedMetadata { cell: None, reason } => {
                StructuralError::MalformedMetadata {
                    cell: Some(index),
                    reason,
                }
            }
            other => other,
        }
    }
}

fn cell_suffix(cell: &Option<usize>) -> String {
    cell.map(|i| format!(" in cell {i}")).unwrap_or_default()
}

/// The external execution step did not produce a usable notebook.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Execution exceeded its time budget and was aborted.
    #[error("notebook execution timed out after {0:?}")]
    Timeout(Duration),

    /// A cell raised and errors were not allowed.
    #[error("cell raised an error during execution: {0}")]
    CellError(String),

    /// The execution backend could not be started or exited abnormally.
    #[error("failed to run notebook: {0}")]
    Launch(String),

    /// The backend finished but returned something that is not a notebook.
    #[error("execution returned an invalid notebook: {0}")]
    InvalidOutput(String),
}

/// A grade was computed but does not meet the exercise's acceptance checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreCheckError {
    #[error("max score {actual} doesn't add to the expected total {expected}")]
    MaxScore { expected: f64, actual: f64 },

    #[error("total score {total} is lower than max score {max}")]
    Incomplete { total: f64, max: f64 },
}

/// Cell source violates a content policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyViolation {
    #[error("encountered hidden test region in cell {cell}, line {line}")]
    HiddenTestRegion { cell: usize, line: usize },
}

/// Failure to produce the learner version of a notebook.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClearError {
    #[error("cell {cell}: solution region is never closed")]
    UnterminatedSolution { cell: usize },

    #[error("cell {cell}: nested solution region")]
    NestedSolution { cell: usize },

    #[error("cell {cell}: solution region found in a cell that is not a solution cell")]
    SolutionOutsideSolutionCell { cell: usize },

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Any failure of a grading pipeline run.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("checksum mismatch ({checkpoint})")]
    Mismatch {
        checkpoint: Checkpoint,
        /// Grade ids whose digest changed; empty for aggregate baselines.
        changed: Vec<String>,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    ScoreCheck(#[from] ScoreCheckError),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("failed to report status: {0:#}")]
    Report(anyhow::Error),
}

impl GradingError {
    /// Process exit code for this category of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            GradingError::Mismatch { .. } => 1,
            GradingError::Structural(_) => 2,
            GradingError::Execution(_) => 3,
            GradingError::ScoreCheck(_) => 4,
            GradingError::Policy(_) => 5,
            GradingError::Report(_) => 6,
        }
    }
}
