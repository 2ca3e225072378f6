//! nbgrade-core: Checksum and grading engine for exercise notebooks.
//!
//! This crate defines the notebook model, the cell classifier, the checksum
//! engine, the validator and the grader, plus the pipeline that sequences
//! them around a pluggable notebook executor and status reporter.

pub mod checksum;
pub mod classify;
pub mod clear;
pub mod engine;
pub mod error;
pub mod grade;
pub mod model;
pub mod parser;
pub mod policy;
pub mod report;
pub mod traits;
pub mod validate;

pub use checksum::{notebook_digest, Baseline, Checksum, ChecksumMode};
pub use engine::{Checkpoint, GradeOutcome, GradingPipeline, PipelineConfig, Submission};
pub use error::{
    ClearError, ExecutionError, GradingError, PolicyViolation, ScoreCheckError, StructuralError,
};
pub use grade::{grade, grade_with, GradeResult};
pub use model::{Cell, CellType, GradingRecord, Notebook, Output};
pub use validate::{validate, ValidationOutcome};
