//! Notebook and baseline loading.
//!
//! Reads nbformat v4 JSON from disk and parses checksum baselines in either
//! of their persisted shapes.

use std::path::Path;

use anyhow::{Context, Result};

use crate::checksum::{Baseline, Checksum};
use crate::model::Notebook;

/// Read a notebook file.
pub fn read_notebook(path: &Path) -> Result<Notebook> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read notebook: {}", path.display()))?;

    parse_notebook_str(&content, path)
}

/// Parse notebook JSON (useful for testing).
pub fn parse_notebook_str(content: &str, source_path: &Path) -> Result<Notebook> {
    let notebook: Notebook = serde_json::from_str(content)
        .with_context(|| format!("failed to parse notebook JSON: {}", source_path.display()))?;

    if notebook.nbformat != 4 {
        anyhow::bail!(
            "unsupported nbformat {} in {} (expected 4)",
            notebook.nbformat,
            source_path.display()
        );
    }

    Ok(notebook)
}

/// Serialize a notebook the way Jupyter writes it: one-space indent and a
/// trailing newline.
pub fn to_json_string(notebook: &Notebook) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(notebook, &mut serializer).context("failed to serialize notebook")?;
    let mut json = String::from_utf8(buf).context("notebook JSON is not UTF-8")?;
    json.push('\n');
    Ok(json)
}

/// Write a notebook, creating parent directories as needed.
pub fn write_notebook(notebook: &Notebook, path: &Path) -> Result<()> {
    let json = to_json_string(notebook)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("failed to write notebook to {}", path.display()))?;
    Ok(())
}

/// Parse a baseline from its JSON form.
///
/// A JSON string is an aggregate baseline and a JSON object is a per-cell
/// baseline. A bare hex digest (no quotes) is accepted as aggregate too.
pub fn parse_baseline(content: &str) -> Result<Baseline> {
    let trimmed = content.trim();
    if !trimmed.starts_with('"') && !trimmed.starts_with('{') {
        let checksum: Checksum = trimmed.parse().context("failed to parse checksum")?;
        return Ok(Baseline::Aggregate(checksum));
    }
    serde_json::from_str(trimmed).context("failed to parse checksum baseline JSON")
}

/// Resolve a baseline argument: a path to a baseline file, or the baseline
/// itself.
pub fn read_baseline(arg: &str) -> Result<Baseline> {
    let path = Path::new(arg);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read baseline: {}", path.display()))?;
        return parse_baseline(&content);
    }
    parse_baseline(arg)
}

/// Load every `.ipynb` file directly inside `dir`, sorted by path.
///
/// Unreadable notebooks are skipped with a warning.
pub fn load_notebook_directory(dir: &Path) -> Result<Vec<(std::path::PathBuf, Notebook)>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut notebooks = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if !path.extension().is_some_and(|ext| ext == "ipynb") {
            continue;
        }
        match read_notebook(&path) {
            Ok(notebook) => notebooks.push((path, notebook)),
            Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
        }
    }
    notebooks.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(notebooks)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::checksum::{notebook_digest, ChecksumMode};
    use crate::model::{Cell, CellType, GradingRecord};

    const NOTEBOOK: &str = r##"{
 "cells": [
  {
   "cell_type": "markdown",
   "metadata": {},
   "source": ["# Exercise 1\n", "Square a number."]
  },
  {
   "cell_type": "code",
   "execution_count": null,
   "metadata": {
    "nbgrader": {"grade": true, "grade_id": "q1", "locked": true, "points": 10, "solution": false}
   },
   "outputs": [],
   "source": ["assert square(3) == 9"]
  }
 ],
 "metadata": {"kernelspec": {"name": "python3"}},
 "nbformat": 4,
 "nbformat_minor": 5
}"##;

    #[test]
    fn parse_valid_notebook() {
        let nb = parse_notebook_str(NOTEBOOK, &PathBuf::from("ex.ipynb")).unwrap();
        assert_eq!(nb.cells.len(), 2);
        assert_eq!(nb.cells[0].cell_type, CellType::Markdown);
        assert_eq!(nb.cells[0].source, "# Exercise 1\nSquare a number.");
        assert_eq!(nb.nbformat_minor, 5);
        assert!(nb.metadata.contains_key("kernelspec"));
    }

    #[test]
    fn reject_old_nbformat() {
        let old = r#"{"cells": [], "metadata": {}, "nbformat": 3, "nbformat_minor": 0}"#;
        let err = parse_notebook_str(old, &PathBuf::from("old.ipynb")).unwrap_err();
        assert!(err.to_string().contains("unsupported nbformat 3"));
    }

    #[test]
    fn parse_malformed_json() {
        assert!(parse_notebook_str("{ not json", &PathBuf::from("bad.ipynb")).is_err());
    }

    #[test]
    fn write_then_read_preserves_digest() {
        let nb = parse_notebook_str(NOTEBOOK, &PathBuf::from("ex.ipynb")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("ex.ipynb");

        write_notebook(&nb, &path).unwrap();
        let reread = read_notebook(&path).unwrap();

        assert_eq!(
            notebook_digest(&nb, ChecksumMode::Aggregate).unwrap(),
            notebook_digest(&reread, ChecksumMode::Aggregate).unwrap()
        );
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn baseline_shapes() {
        let nb = Notebook::new(vec![
            Cell::code("assert 1").with_grading(GradingRecord::autograded("q1", 1.0))
        ]);
        let aggregate = notebook_digest(&nb, ChecksumMode::Aggregate).unwrap();
        let per_cell = notebook_digest(&nb, ChecksumMode::PerCell).unwrap();

        let aggregate_json = serde_json::to_string(&aggregate).unwrap();
        let per_cell_json = serde_json::to_string(&per_cell).unwrap();

        assert_eq!(parse_baseline(&aggregate_json).unwrap(), aggregate);
        assert_eq!(parse_baseline(&per_cell_json).unwrap(), per_cell);
        assert_eq!(
            parse_baseline(aggregate_json.trim_matches('"')).unwrap(),
            aggregate
        );
        assert!(parse_baseline("not-a-digest").is_err());
    }

    #[test]
    fn read_baseline_from_file_or_literal() {
        let nb = Notebook::new(vec![
            Cell::code("assert 1").with_grading(GradingRecord::autograded("q1", 1.0))
        ]);
        let baseline = notebook_digest(&nb, ChecksumMode::PerCell).unwrap();
        let json = serde_json::to_string(&baseline).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, &json).unwrap();

        assert_eq!(read_baseline(path.to_str().unwrap()).unwrap(), baseline);
        assert_eq!(read_baseline(&json).unwrap(), baseline);
    }

    #[test]
    fn load_directory_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ipynb"), NOTEBOOK).unwrap();
        std::fs::write(dir.path().join("a.ipynb"), NOTEBOOK).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("broken.ipynb"), "{").unwrap();

        let loaded = load_notebook_directory(dir.path()).unwrap();
        let names: Vec<_> = loaded
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.ipynb", "b.ipynb"]);
    }
}
