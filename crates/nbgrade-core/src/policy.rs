//! Content policy checks over raw cell source.
//!
//! Hidden test regions must be stripped before an exercise is released; a
//! submission that still contains a delimiter would leak or spoof them.

use serde::{Deserialize, Serialize};

use crate::error::PolicyViolation;
use crate::model::Notebook;

/// Delimiters that must not appear in any cell of a released notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenTestPolicy {
    #[serde(default = "default_begin")]
    pub begin_delimiter: String,
    #[serde(default = "default_end")]
    pub end_delimiter: String,
}

fn default_begin() -> String {
    "BEGIN HIDDEN TESTS".to_string()
}

fn default_end() -> String {
    "END HIDDEN TESTS".to_string()
}

impl Default for HiddenTestPolicy {
    fn default() -> Self {
        Self {
            begin_delimiter: default_begin(),
            end_delimiter: default_end(),
        }
    }
}

/// Reject the notebook if any line of any cell contains a delimiter.
pub fn forbid_hidden_tests(notebook: &Notebook, policy: &HiddenTestPolicy) -> Result<(), PolicyViolation> {
    for (cell_index, cell) in notebook.cells.iter().enumerate() {
        for (line_index, line) in cell.source.lines().enumerate() {
            if line.contains(&policy.begin_delimiter) || line.contains(&policy.end_delimiter) {
                return Err(PolicyViolation::HiddenTestRegion {
                    cell: cell_index,
                    line: line_index + 1,
                });
            }
        }
    }
    Ok(())
}
