//! Produce the learner version of an exercise notebook.
//!
//! Solution regions are replaced by stubs and every code cell loses its
//! outputs. Baselines should be computed over the cleared notebook, since
//! manually graded cells are answer cells and get stubbed here.

use crate::classify::grading_record;
use crate::error::ClearError;
use crate::model::{CellType, Notebook};

/// Markers and stubs used when clearing solutions.
#[derive(Debug, Clone)]
pub struct ClearOptions {
    pub begin_solution: String,
    pub end_solution: String,
    pub code_stub: String,
    pub text_stub: String,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            begin_solution: "### BEGIN SOLUTION".into(),
            end_solution: "### END SOLUTION".into(),
            code_stub: "# YOUR CODE HERE\nraise NotImplementedError()".into(),
            text_stub: "YOUR ANSWER HERE".into(),
        }
    }
}

/// Clear solutions and outputs, returning a new notebook.
pub fn clear_notebook(notebook: &Notebook, options: &ClearOptions) -> Result<Notebook, ClearError> {
    let mut cleared = notebook.clone();

    for (index, cell) in cleared.cells.iter_mut().enumerate() {
        let is_solution = grading_record(cell)
            .map_err(|e| e.at_cell(index))?
            .is_some_and(|r| r.solution);
        let stub = match cell.cell_type {
            CellType::Code => &options.code_stub,
            _ => &options.text_stub,
        };

        match replace_solution_region(&cell.source, index, stub, options)? {
            Some(replaced) if is_solution => cell.source = replaced,
            Some(_) => return Err(ClearError::SolutionOutsideSolutionCell { cell: index }),
            None if is_solution => cell.source = stub.clone(),
            None => {}
        }

        if cell.cell_type == CellType::Code {
            cell.outputs.clear();
            cell.execution_count = None;
        }
    }

    Ok(cleared)
}

/// Returns `None` if the source has no solution region.
fn replace_solution_region(
    source: &str,
    cell: usize,
    stub: &str,
    options: &ClearOptions,
) -> Result<Option<String>, ClearError> {
    let mut lines = Vec::new();
    let mut in_solution = false;
    let mut replaced = false;

    for line in source.split('\n') {
        if line.contains(&options.begin_solution) {
            if in_solution {
                return Err(ClearError::NestedSolution { cell });
            }
            in_solution = true;
            replaced = true;
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            lines.extend(stub.split('\n').map(|stub_line| format!("{indent}{stub_line}")));
        } else if line.contains(&options.end_solution) {
            in_solution = false;
        } else if !in_solution {
            lines.push(line.to_string());
        }
    }

    if in_solution {
        return Err(ClearError::UnterminatedSolution { cell });
    }
    Ok(replaced.then(|| lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::aggregate_digest;
    use crate::model::{Cell, GradingRecord, Output};

    fn exercise() -> Notebook {
        Notebook::new(vec![
            Cell::markdown("Implement `square`."),
            Cell::code("def square(x):\n    ### BEGIN SOLUTION\n    return x * x\n    ### END SOLUTION")
                .with_grading(GradingRecord::solution("square"))
                .with_outputs(1, vec![]),
            Cell::code("assert square(3) == 9")
                .with_grading(GradingRecord::autograded("q1", 10.0))
                .with_outputs(2, vec![Output::stdout("ok")]),
            Cell::markdown("It multiplies.").with_grading(GradingRecord::manual("q2", 10.0)),
        ])
    }

    #[test]
    fn solution_region_is_stubbed_with_indent() {
        let cleared = clear_notebook(&exercise(), &ClearOptions::default()).unwrap();
        assert_eq!(
            cleared.cells[1].source,
            "def square(x):\n    # YOUR CODE HERE\n    raise NotImplementedError()"
        );
    }

    #[test]
    fn solution_cell_without_region_is_replaced_whole() {
        let cleared = clear_notebook(&exercise(), &ClearOptions::default()).unwrap();
        assert_eq!(cleared.cells[3].source, "YOUR ANSWER HERE");
    }

    #[test]
    fn outputs_are_cleared() {
        let cleared = clear_notebook(&exercise(), &ClearOptions::default()).unwrap();
        for cell in &cleared.cells {
            assert!(cell.outputs.is_empty());
            assert!(cell.execution_count.is_none());
        }
    }

    #[test]
    fn locked_test_cells_are_untouched() {
        let original = exercise();
        let cleared = clear_notebook(&original, &ClearOptions::default()).unwrap();
        assert_eq!(cleared.cells[2].source, original.cells[2].source);
        assert_eq!(cleared.cells[0].source, original.cells[0].source);
    }

    #[test]
    fn clearing_is_idempotent_for_checksums() {
        let once = clear_notebook(&exercise(), &ClearOptions::default()).unwrap();
        let twice = clear_notebook(&once, &ClearOptions::default()).unwrap();
        assert_eq!(aggregate_digest(&once).unwrap(), aggregate_digest(&twice).unwrap());
    }

    #[test]
    fn unterminated_region_fails() {
        let nb = Notebook::new(vec![Cell::code("### BEGIN SOLUTION\nx = 1")
            .with_grading(GradingRecord::solution("a"))]);
        assert_eq!(
            clear_notebook(&nb, &ClearOptions::default()).unwrap_err(),
            ClearError::UnterminatedSolution { cell: 0 }
        );
    }

    #[test]
    fn nested_region_fails() {
        let nb = Notebook::new(vec![Cell::code(
            "### BEGIN SOLUTION\n### BEGIN SOLUTION\n### END SOLUTION",
        )
        .with_grading(GradingRecord::solution("a"))]);
        assert!(matches!(
            clear_notebook(&nb, &ClearOptions::default()),
            Err(ClearError::NestedSolution { cell: 0 })
        ));
    }

    #[test]
    fn region_outside_solution_cell_fails() {
        let nb = Notebook::new(vec![Cell::code("### BEGIN SOLUTION\nx = 1\n### END SOLUTION")]);
        assert_eq!(
            clear_notebook(&nb, &ClearOptions::default()).unwrap_err(),
            ClearError::SolutionOutsideSolutionCell { cell: 0 }
        );
    }
}
