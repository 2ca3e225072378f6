//! Score aggregation over graded cells.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::graded_cells;
use crate::error::{ScoreCheckError, StructuralError};
use crate::model::{Cell, CellType, Notebook, Output};

/// Externally supplied scores for manually graded cells, by `grade_id`.
pub type ManualScores = BTreeMap<String, f64>;

/// `(total_score, max_score)` of one grading pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeResult {
    pub total_score: f64,
    pub max_score: f64,
}

impl GradeResult {
    pub fn from_cells(cells: &[CellScore]) -> Self {
        cells.iter().fold(Self::default(), |acc, cell| Self {
            total_score: acc.total_score + cell.score,
            max_score: acc.max_score + cell.max_score,
        })
    }
}

/// How a graded cell earns its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Scored from execution output.
    Autograded,
    /// Scored by a human.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Passed,
    PartialCredit,
    Failed,
    NotExecuted,
    AwaitingManualGrade,
    ManuallyGraded,
}

/// Score of a single graded cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellScore {
    pub grade_id: String,
    pub kind: CellKind,
    pub score: f64,
    pub max_score: f64,
    pub status: CellStatus,
}

/// Grade a notebook with no manual scores supplied.
pub fn grade(notebook: &Notebook) -> Result<GradeResult, StructuralError> {
    grade_with(notebook, &ManualScores::new())
}

/// Grade a notebook, crediting manual cells from `manual_scores`.
pub fn grade_with(notebook: &Notebook, manual_scores: &ManualScores) -> Result<GradeResult, StructuralError> {
    Ok(GradeResult::from_cells(&grade_cells(notebook, manual_scores)?))
}

/// Per-cell breakdown, in document order.
///
/// `max_score` of every cell is its declared points regardless of outcome, so
/// the summed max depends on the exercise definition alone.
pub fn grade_cells(notebook: &Notebook, manual_scores: &ManualScores) -> Result<Vec<CellScore>, StructuralError> {
    let graded = graded_cells(notebook)?;
    let mut scores = Vec::with_capacity(graded.len());

    for g in &graded {
        let points = g.record.points;
        let kind = if g.record.solution || g.cell.cell_type != CellType::Code {
            CellKind::Manual
        } else {
            CellKind::Autograded
        };

        let (score, status) = match kind {
            CellKind::Autograded => autograde(g.cell, points),
            CellKind::Manual => match manual_scores.get(&g.record.grade_id) {
                Some(&awarded) if awarded.is_finite() => {
                    (awarded.clamp(0.0, points), CellStatus::ManuallyGraded)
                }
                Some(&awarded) => {
                    return Err(StructuralError::InvalidManualScore {
                        grade_id: g.record.grade_id.clone(),
                        value: awarded,
                    })
                }
                None => (0.0, CellStatus::AwaitingManualGrade),
            },
        };

        scores.push(CellScore {
            grade_id: g.record.grade_id.clone(),
            kind,
            score,
            max_score: points,
            status,
        });
    }

    if let Some(stray) = manual_scores
        .keys()
        .find(|id| !scores.iter().any(|s| &s.grade_id == *id && s.kind == CellKind::Manual))
    {
        return Err(StructuralError::UnknownManualScore(stray.clone()));
    }

    Ok(scores)
}

/// Score an autograded cell from its outputs.
///
/// The first error (or stderr stream) zeroes the cell. The first execute
/// result that reads as a number is partial credit, capped to `[0, points]`;
/// any other execute result is full credit. A cell that ran cleanly gets full
/// credit and a cell that never ran gets nothing.
fn autograde(cell: &Cell, points: f64) -> (f64, CellStatus) {
    for output in &cell.outputs {
        match output {
            Output::Error { .. } => return (0.0, CellStatus::Failed),
            Output::Stream { name, .. } if name == "stderr" => return (0.0, CellStatus::Failed),
            Output::ExecuteResult { .. } => {
                let partial = output.plain_text().and_then(|t| t.trim().parse::<f64>().ok());
                return match partial {
                    None => (points, CellStatus::Passed),
                    Some(p) if !p.is_finite() => (0.0, CellStatus::Failed),
                    Some(p) => {
                        let score = p.clamp(0.0, points);
                        let status = if score >= points {
                            CellStatus::Passed
                        } else if score <= 0.0 {
                            CellStatus::Failed
                        } else {
                            CellStatus::PartialCredit
                        };
                        (score, status)
                    }
                };
            }
            _ => {}
        }
    }

    if cell.execution_count.is_none() && cell.outputs.is_empty() {
        (0.0, CellStatus::NotExecuted)
    } else {
        (points, CellStatus::Passed)
    }
}

/// Require the exercise's max score to equal its declared total.
///
/// Compared after rounding to 5 decimals so fractional points that sum to the
/// total are not rejected for float noise.
pub fn check_max_score(result: &GradeResult, expected_total: f64) -> Result<(), ScoreCheckError> {
    if round5(result.max_score) == round5(expected_total) {
        Ok(())
    } else {
        Err(ScoreCheckError::MaxScore {
            expected: expected_total,
            actual: result.max_score,
        })
    }
}

/// Require full marks, as a reference solution must earn.
pub fn check_full_score(result: &GradeResult) -> Result<(), ScoreCheckError> {
    if round5(result.total_score) < round5(result.max_score) {
        Err(ScoreCheckError::Incomplete {
            total: result.total_score,
            max: result.max_score,
        })
    } else {
        Ok(())
    }
}

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}
