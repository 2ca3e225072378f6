//! The `nbgrade checksum` commands.

use std::path::PathBuf;

use anyhow::Result;

use nbgrade_core::checksum::{notebook_digest, Baseline, ChecksumMode};
use nbgrade_core::engine::Checkpoint;
use nbgrade_core::error::GradingError;
use nbgrade_core::parser;
use nbgrade_core::validate::{validate as validate_notebook, ValidationOutcome};

pub fn digest(notebook_path: PathBuf, per_cell: bool) -> Result<()> {
    let notebook = parser::read_notebook(&notebook_path)?;
    let mode = if per_cell {
        ChecksumMode::PerCell
    } else {
        ChecksumMode::Aggregate
    };

    match notebook_digest(&notebook, mode)? {
        Baseline::Aggregate(checksum) => println!("{checksum}"),
        baseline @ Baseline::PerCell(_) => {
            println!("{}", serde_json::to_string_pretty(&baseline)?)
        }
    }
    Ok(())
}

pub fn validate(notebook_path: PathBuf, checksum: String) -> Result<()> {
    let notebook = parser::read_notebook(&notebook_path)?;
    let baseline = parser::read_baseline(&checksum)?;

    match validate_notebook(&notebook, &baseline)? {
        ValidationOutcome::Valid => {
            println!("Match");
            Ok(())
        }
        ValidationOutcome::Mismatch { changed } => {
            println!("Checksum mismatch!");
            for grade_id in &changed {
                println!("  changed: {grade_id}");
            }
            Err(GradingError::Mismatch {
                checkpoint: Checkpoint::BeforeExecution,
                changed,
            }
            .into())
        }
    }
}
