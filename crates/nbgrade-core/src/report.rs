//! Grade report with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grade::{CellScore, CellStatus, GradeResult};

/// The outcome of grading one notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    /// Unique run identifier.
    pub id: Uuid,
    /// When the notebook was graded.
    pub created_at: DateTime<Utc>,
    /// Notebook name (usually the file name).
    pub notebook: String,
    /// Per-cell scores in document order.
    pub cells: Vec<CellScore>,
    pub total_score: f64,
    pub max_score: f64,
}

impl GradeReport {
    pub fn new(notebook: impl Into<String>, cells: Vec<CellScore>) -> Self {
        let result = GradeResult::from_cells(&cells);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            notebook: notebook.into(),
            cells,
            total_score: result.total_score,
            max_score: result.max_score,
        }
    }

    pub fn result(&self) -> GradeResult {
        GradeResult {
            total_score: self.total_score,
            max_score: self.max_score,
        }
    }

    /// Cells still waiting for a human score.
    pub fn pending_manual(&self) -> impl Iterator<Item = &CellScore> {
        self.cells
            .iter()
            .filter(|c| c.status == CellStatus::AwaitingManualGrade)
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: GradeReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}
