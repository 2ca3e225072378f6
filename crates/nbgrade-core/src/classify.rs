//! Cell classification: which cells are graded, and what they declare.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::StructuralError;
use crate::model::{Cell, GradingRecord, Notebook, GRADING_METADATA_KEY};

/// A graded cell together with its position and parsed record.
#[derive(Debug, Clone)]
pub struct GradedCell<'a> {
    /// Index of the cell in the notebook.
    pub index: usize,
    pub cell: &'a Cell,
    pub record: GradingRecord,
}

/// Extract the grading record of a cell.
///
/// Returns `Ok(None)` for cells without a grading block. A block that is
/// present but unusable is an error, never a silent skip: skipping it would
/// drop the cell from both the checksum and the score.
pub fn grading_record(cell: &Cell) -> Result<Option<GradingRecord>, StructuralError> {
    let Some(block) = cell.metadata.get(GRADING_METADATA_KEY) else {
        return Ok(None);
    };
    let Some(block) = block.as_object() else {
        return Err(StructuralError::malformed("grading metadata is not an object"));
    };

    let grade_id = match block.get("grade_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::String(_)) => return Err(StructuralError::malformed("empty grade_id")),
        Some(_) => return Err(StructuralError::malformed("grade_id is not a string")),
        None => return Err(StructuralError::malformed("missing grade_id")),
    };

    let grade = flag(block, "grade")?;
    let solution = flag(block, "solution")?;
    let locked = flag(block, "locked")?;

    // Points only carry meaning for cells that contribute a score.
    let points = if grade {
        parse_points(&grade_id, block.get("points"))?
    } else {
        0.0
    };

    Ok(Some(GradingRecord {
        grade_id,
        points,
        grade,
        solution,
        locked,
    }))
}

/// Whether a cell takes part in checksumming and grading.
pub fn is_graded_cell(cell: &Cell) -> Result<bool, StructuralError> {
    Ok(grading_record(cell)?.is_some_and(|record| record.grade))
}

/// All graded cells of a notebook, in document order.
///
/// Fails on the first malformed cell and on duplicate `grade_id`s.
pub fn graded_cells(notebook: &Notebook) -> Result<Vec<GradedCell<'_>>, StructuralError> {
    let mut seen = HashSet::new();
    let mut graded = Vec::new();

    for (index, cell) in notebook.cells.iter().enumerate() {
        let record = grading_record(cell).map_err(|e| e.at_cell(index))?;
        let Some(record) = record.filter(|r| r.grade) else {
            continue;
        };
        if !seen.insert(record.grade_id.clone()) {
            return Err(StructuralError::DuplicateGradeId(record.grade_id));
        }
        graded.push(GradedCell {
            index,
            cell,
            record,
        });
    }

    Ok(graded)
}

fn flag(block: &Map<String, Value>, key: &str) -> Result<bool, StructuralError> {
    match block.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(StructuralError::malformed(format!(
            "`{key}` must be a boolean, got {other}"
        ))),
    }
}

fn parse_points(grade_id: &str, value: Option<&Value>) -> Result<f64, StructuralError> {
    let invalid = |value: String| StructuralError::InvalidPoints {
        grade_id: grade_id.to_string(),
        value,
    };

    let points = match value {
        None | Some(Value::Null) => return Err(invalid("missing".into())),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };

    match points {
        Some(p) if p.is_finite() && p >= 0.0 => Ok(p),
        _ => Err(invalid(value.map(Value::to_string).unwrap_or_default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cell_with(block: Value) -> Cell {
        let mut cell = Cell::code("x = 1");
        cell.metadata.insert(GRADING_METADATA_KEY.into(), block);
        cell
    }

    #[test]
    fn plain_cell_has_no_record() {
        let cell = Cell::code("print('hi')");
        assert_eq!(grading_record(&cell).unwrap(), None);
        assert!(!is_graded_cell(&cell).unwrap());
    }

    #[test]
    fn autograded_cell_is_graded() {
        let cell = cell_with(json!({"grade_id": "q1", "points": 10, "grade": true, "solution": false, "locked": true}));
        let record = grading_record(&cell).unwrap().unwrap();
        assert_eq!(record.grade_id, "q1");
        assert_eq!(record.points, 10.0);
        assert!(is_graded_cell(&cell).unwrap());
    }

    #[test]
    fn answer_cell_is_not_graded() {
        let cell = cell_with(json!({"grade_id": "a1", "grade": false, "solution": true}));
        assert!(grading_record(&cell).unwrap().is_some());
        assert!(!is_graded_cell(&cell).unwrap());
    }

    #[test]
    fn missing_grade_id_fails_loudly() {
        let cell = cell_with(json!({"grade": true, "points": 1}));
        let err = grading_record(&cell).unwrap_err();
        assert!(matches!(err, StructuralError::MalformedMetadata { .. }));

        let cell = cell_with(json!({"grade_id": "  ", "grade": true, "points": 1}));
        assert!(grading_record(&cell).is_err());
    }

    #[test]
    fn non_object_block_is_malformed() {
        let cell = cell_with(json!("q1"));
        assert!(matches!(
            grading_record(&cell),
            Err(StructuralError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn non_boolean_flag_is_malformed() {
        let cell = cell_with(json!({"grade_id": "q1", "grade": "yes", "points": 1}));
        assert!(grading_record(&cell).is_err());
    }

    #[test]
    fn invalid_points_are_structural() {
        for points in [json!(-1), json!("ten"), json!(null), json!([1])] {
            let cell = cell_with(json!({"grade_id": "q1", "grade": true, "points": points.clone()}));
            assert!(
                matches!(
                    grading_record(&cell),
                    Err(StructuralError::InvalidPoints { .. })
                ),
                "points {points} should be rejected"
            );
        }
    }

    #[test]
    fn numeric_string_points_are_not_coerced() {
        let cell = cell_with(json!({"grade_id": "q1", "grade": true, "points": "2.5"}));
        match grading_record(&cell) {
            Err(StructuralError::InvalidPoints { grade_id, value }) => {
                assert_eq!(grade_id, "q1");
                assert_eq!(value, "\"2.5\"");
            }
            other => panic!("expected InvalidPoints, got {other:?}"),
        }
    }

    #[test]
    fn graded_cells_keep_document_order() {
        let notebook = Notebook::new(vec![
            Cell::markdown("# Exercise"),
            Cell::code("answer = 42").with_grading(GradingRecord::solution("a1")),
            Cell::code("assert answer == 42").with_grading(GradingRecord::autograded("t1", 5.0)),
            Cell::markdown("Explain.").with_grading(GradingRecord::manual("m1", 3.0)),
        ]);
        let graded = graded_cells(&notebook).unwrap();
        let ids: Vec<_> = graded.iter().map(|g| g.record.grade_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "m1"]);
        assert_eq!(graded[0].index, 2);
    }

    #[test]
    fn duplicate_grade_ids_are_fatal() {
        let notebook = Notebook::new(vec![
            Cell::code("assert True").with_grading(GradingRecord::autograded("q1", 1.0)),
            Cell::code("assert 1").with_grading(GradingRecord::autograded("q1", 1.0)),
        ]);
        assert_eq!(
            graded_cells(&notebook).unwrap_err(),
            StructuralError::DuplicateGradeId("q1".into())
        );
    }

    #[test]
    fn malformed_cell_index_is_reported() {
        let notebook = Notebook::new(vec![
            Cell::code("x"),
            cell_with(json!({"grade": true, "points": 1})),
        ]);
        match graded_cells(&notebook).unwrap_err() {
            StructuralError::MalformedMetadata { cell, .. } => assert_eq!(cell, Some(1)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
