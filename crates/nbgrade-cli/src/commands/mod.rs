pub mod checksum;
pub mod notebook;
pub mod portal;

use std::path::{Path, PathBuf};

use nbgrade_core::grade::{CellKind, CellScore, CellStatus, GradeResult};
use nbgrade_portal::config::GradingConfig;
use nbgrade_runner::JupyterExecutor;

/// The Jupyter executor configured by `[grading]`.
pub(crate) fn jupyter_executor(config: &GradingConfig) -> JupyterExecutor {
    let executor = JupyterExecutor::new();
    match &config.kernel {
        Some(kernel) => executor.with_kernel(kernel.clone()),
        None => executor,
    }
}

/// Directory a notebook executes in: the one containing it.
pub(crate) fn notebook_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) fn notebook_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn format_score(result: &GradeResult) -> String {
    format!("Score: {}/{}", result.total_score, result.max_score)
}

pub(crate) fn print_cell_scores(cells: &[CellScore]) {
    use comfy_table::{Cell, Table};

    if cells.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Cell", "Kind", "Score", "Max", "Status"]);

    for cell in cells {
        let kind = match cell.kind {
            CellKind::Autograded => "auto",
            CellKind::Manual => "manual",
        };
        table.add_row(vec![
            Cell::new(&cell.grade_id),
            Cell::new(kind),
            Cell::new(cell.score),
            Cell::new(cell.max_score),
            Cell::new(status_label(cell.status)),
        ]);
    }

    println!("{table}");
}

fn status_label(status: CellStatus) -> &'static str {
    match status {
        CellStatus::Passed => "passed",
        CellStatus::PartialCredit => "partial",
        CellStatus::Failed => "failed",
        CellStatus::NotExecuted => "not executed",
        CellStatus::AwaitingManualGrade => "awaiting manual grade",
        CellStatus::ManuallyGraded => "manually graded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_runs_in_current_dir() {
        assert_eq!(notebook_dir(Path::new("ex.ipynb")), PathBuf::from("."));
        assert_eq!(
            notebook_dir(Path::new("exercises/ex.ipynb")),
            PathBuf::from("exercises")
        );
    }

    #[test]
    fn name_is_file_name() {
        assert_eq!(notebook_name(Path::new("a/b/ex01.ipynb")), "ex01.ipynb");
    }
}
