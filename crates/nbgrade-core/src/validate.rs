//! Validation of a notebook against a published checksum baseline.
//!
//! Stateless: the same call serves the pre-execution and post-execution
//! checkpoints.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::checksum::{aggregate_digest, digest_with_record, Baseline};
use crate::classify::graded_cells;
use crate::error::StructuralError;
use crate::model::Notebook;

/// Result of comparing a well-formed notebook to its baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    /// At least one graded cell changed.
    Mismatch {
        /// Changed grade ids in document order. Always empty for aggregate
        /// baselines, which cannot tell which cell changed.
        changed: Vec<String>,
    },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

/// Compare the notebook's graded cells to `baseline`.
///
/// A disagreement between the graded id sets is a [`StructuralError`], not a
/// mismatch: it means the notebook and the baseline describe different
/// exercises, which is a different failure from a learner editing a cell.
pub fn validate(notebook: &Notebook, baseline: &Baseline) -> Result<ValidationOutcome, StructuralError> {
    match baseline {
        Baseline::Aggregate(expected) => {
            let actual = aggregate_digest(notebook)?;
            if actual == *expected {
                Ok(ValidationOutcome::Valid)
            } else {
                tracing::debug!(%expected, %actual, "aggregate checksum differs");
                Ok(ValidationOutcome::Mismatch { changed: vec![] })
            }
        }
        Baseline::PerCell(expected) => {
            let graded = graded_cells(notebook)?;

            if let Some(unknown) = graded
                .iter()
                .find(|g| !expected.contains_key(&g.record.grade_id))
            {
                return Err(StructuralError::UnknownGradedCell(
                    unknown.record.grade_id.clone(),
                ));
            }

            let present: HashSet<&str> = graded.iter().map(|g| g.record.grade_id.as_str()).collect();
            if let Some(missing) = expected.keys().find(|id| !present.contains(id.as_str())) {
                return Err(StructuralError::MissingGradedCell(missing.clone()));
            }

            let changed: Vec<String> = graded
                .iter()
                .filter(|g| {
                    expected.get(&g.record.grade_id) != Some(&digest_with_record(g.cell, &g.record))
                })
                .map(|g| g.record.grade_id.clone())
                .collect();

            if changed.is_empty() {
                Ok(ValidationOutcome::Valid)
            } else {
                tracing::debug!(?changed, "per-cell checksums differ");
                Ok(ValidationOutcome::Mismatch { changed })
            }
        }
    }
}

/// Shorthand for `validate(..)?.is_valid()`.
pub fn is_valid(notebook: &Notebook, baseline: &Baseline) -> Result<bool, StructuralError> {
    Ok(validate(notebook, baseline)?.is_valid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{notebook_digest, ChecksumMode};
    use crate::model::{Cell, GradingRecord};

    fn exercise() -> Notebook {
        Notebook::new(vec![
            Cell::markdown("Intro"),
            Cell::code("assert square(3) == 9").with_grading(GradingRecord::autograded("q1", 10.0)),
            Cell::markdown("Why?").with_grading(GradingRecord::manual("q2", 10.0)),
        ])
    }

    fn baselines(nb: &Notebook) -> [Baseline; 2] {
        [
            notebook_digest(nb, ChecksumMode::Aggregate).unwrap(),
            notebook_digest(nb, ChecksumMode::PerCell).unwrap(),
        ]
    }

    #[test]
    fn unmodified_notebook_is_valid_in_both_modes() {
        let nb = exercise();
        for baseline in baselines(&nb) {
            assert_eq!(validate(&nb, &baseline).unwrap(), ValidationOutcome::Valid);
        }
    }

    #[test]
    fn edited_graded_cell_mismatches_in_both_modes() {
        let nb = exercise();
        let [aggregate, per_cell] = baselines(&nb);

        let mut edited = nb.clone();
        edited.cells[1].source = "assert True".into();

        assert_eq!(
            validate(&edited, &aggregate).unwrap(),
            ValidationOutcome::Mismatch { changed: vec![] }
        );
        assert_eq!(
            validate(&edited, &per_cell).unwrap(),
            ValidationOutcome::Mismatch {
                changed: vec!["q1".into()]
            }
        );
    }

    #[test]
    fn edited_plain_cell_stays_valid() {
        let nb = exercise();
        let mut edited = nb.clone();
        edited.cells[0].source = "Intro, rewritten".into();
        for baseline in baselines(&nb) {
            assert!(is_valid(&edited, &baseline).unwrap());
        }
    }

    #[test]
    fn unknown_grade_id_is_structural() {
        let nb = exercise();
        let [_, per_cell] = baselines(&nb);

        let mut extended = nb.clone();
        extended
            .cells
            .push(Cell::code("assert 1").with_grading(GradingRecord::autograded("q3", 1.0)));

        assert_eq!(
            validate(&extended, &per_cell).unwrap_err(),
            StructuralError::UnknownGradedCell("q3".into())
        );
    }

    #[test]
    fn missing_grade_id_is_structural() {
        let nb = exercise();
        let [_, per_cell] = baselines(&nb);

        let mut trimmed = nb.clone();
        trimmed.cells.remove(2);

        assert_eq!(
            validate(&trimmed, &per_cell).unwrap_err(),
            StructuralError::MissingGradedCell("q2".into())
        );
    }

    #[test]
    fn removed_cell_is_a_mismatch_in_aggregate_mode() {
        let nb = exercise();
        let [aggregate, _] = baselines(&nb);

        let mut trimmed = nb.clone();
        trimmed.cells.remove(2);

        assert!(!is_valid(&trimmed, &aggregate).unwrap());
    }

    #[test]
    fn reordering_only_detected_in_aggregate_mode() {
        let nb = exercise();
        let [aggregate, per_cell] = baselines(&nb);

        let mut reordered = nb.clone();
        reordered.cells.swap(1, 2);

        assert!(!is_valid(&reordered, &aggregate).unwrap());
        assert!(is_valid(&reordered, &per_cell).unwrap());
    }

    #[test]
    fn duplicate_ids_are_structural_not_mismatch() {
        let nb = exercise();
        let mut duplicated = nb.clone();
        duplicated.cells.push(duplicated.cells[1].clone());
        for baseline in baselines(&nb) {
            assert_eq!(
                validate(&duplicated, &baseline).unwrap_err(),
                StructuralError::DuplicateGradeId("q1".into())
            );
        }
    }
}
