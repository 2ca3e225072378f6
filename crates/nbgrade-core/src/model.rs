//! Notebook document model.
//!
//! A minimal nbformat v4 representation: only the structure the checksum and
//! grading engine reads is typed, and every other key is preserved so a
//! notebook survives a read/write round trip.

use std::fmt;
use std::str::FromStr;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the grading record of a cell.
pub const GRADING_METADATA_KEY: &str = "nbgrader";

/// An exercise notebook: an ordered sequence of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Cells in document order. Order is significant for aggregate digests.
    pub cells: Vec<Cell>,
    /// Notebook-level metadata (kernelspec, language info, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Major format version.
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    /// Minor format version.
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
}

fn default_nbformat() -> u32 {
    4
}

fn default_nbformat_minor() -> u32 {
    2
}

impl Notebook {
    /// Create a notebook with the given cells and empty metadata.
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: default_nbformat(),
            nbformat_minor: default_nbformat_minor(),
        }
    }
}

/// The kind of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(CellType::Code),
            "markdown" | "md" => Ok(CellType::Markdown),
            "raw" => Ok(CellType::Raw),
            other => Err(format!("unknown cell type: {other}")),
        }
    }
}

/// A single notebook cell.
///
/// `outputs` and `execution_count` are only meaningful for code cells and are
/// only written back for them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,
    /// Cell source. Stored on disk as a string or a list of lines.
    #[serde(default, deserialize_with = "multiline")]
    pub source: String,
    /// Arbitrary metadata bag; may carry a grading record.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub execution_count: Option<u64>,
    /// Keys this model does not interpret (cell ids, attachments, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("cell_type", &self.cell_type)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("metadata", &self.metadata)?;
        map.serialize_entry("source", &self.source)?;
        if self.cell_type == CellType::Code {
            map.serialize_entry("execution_count", &self.execution_count)?;
            map.serialize_entry("outputs", &self.outputs)?;
        }
        map.end()
    }
}

impl Cell {
    pub fn new(cell_type: CellType, source: impl Into<String>) -> Self {
        Self {
            cell_type,
            source: source.into(),
            metadata: Map::new(),
            outputs: Vec::new(),
            execution_count: None,
            extra: Map::new(),
        }
    }

    pub fn code(source: impl Into<String>) -> Self {
        Self::new(CellType::Code, source)
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new(CellType::Markdown, source)
    }

    /// Attach a grading record to this cell's metadata.
    pub fn with_grading(mut self, record: GradingRecord) -> Self {
        let value = serde_json::to_value(&record).unwrap_or(Value::Null);
        self.metadata.insert(GRADING_METADATA_KEY.to_string(), value);
        self
    }

    /// Replace outputs and mark the cell as executed.
    pub fn with_outputs(mut self, execution_count: u64, outputs: Vec<Output>) -> Self {
        self.execution_count = Some(execution_count);
        self.outputs = outputs;
        self
    }
}

/// A cell output, tagged by `output_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        name: String,
        #[serde(default, deserialize_with = "multiline")]
        text: String,
    },
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<u64>,
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    DisplayData {
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

impl Output {
    pub fn stdout(text: impl Into<String>) -> Self {
        Output::Stream {
            name: "stdout".into(),
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Output::Stream {
            name: "stderr".into(),
            text: text.into(),
        }
    }

    /// An `execute_result` carrying only a `text/plain` representation.
    pub fn result(text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("text/plain".into(), Value::String(text.into()));
        Output::ExecuteResult {
            execution_count: None,
            data,
            metadata: Map::new(),
        }
    }

    pub fn error(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Output::Error {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: Vec::new(),
        }
    }

    /// The `text/plain` payload of an execute result, if any.
    pub fn plain_text(&self) -> Option<String> {
        let Output::ExecuteResult { data, .. } = self else {
            return None;
        };
        match data.get("text/plain")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(lines) => Some(
                lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .concat(),
            ),
            _ => None,
        }
    }
}

/// Grading metadata of a cell, as declared by the exercise author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingRecord {
    /// Identifier, unique among graded cells of a notebook.
    pub grade_id: String,
    /// Maximum score of the cell.
    pub points: f64,
    /// Whether the cell contributes a score.
    pub grade: bool,
    /// Whether the cell holds a learner answer.
    pub solution: bool,
    /// Declared lock flag; see [`GradingRecord::is_locked`].
    pub locked: bool,
}

impl GradingRecord {
    /// A test cell scored from its execution output.
    pub fn autograded(grade_id: impl Into<String>, points: f64) -> Self {
        Self {
            grade_id: grade_id.into(),
            points,
            grade: true,
            solution: false,
            locked: true,
        }
    }

    /// A written-answer cell scored by a human.
    pub fn manual(grade_id: impl Into<String>, points: f64) -> Self {
        Self {
            grade_id: grade_id.into(),
            points,
            grade: true,
            solution: true,
            locked: false,
        }
    }

    /// An answer cell checked by other (autograded) cells.
    pub fn solution(grade_id: impl Into<String>) -> Self {
        Self {
            grade_id: grade_id.into(),
            points: 0.0,
            grade: false,
            solution: true,
            locked: false,
        }
    }

    /// Effective lock state: answer cells are editable, grade cells never are.
    pub fn is_locked(&self) -> bool {
        if self.solution {
            false
        } else if self.grade {
            true
        } else {
            self.locked
        }
    }
}

fn multiline<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Multiline {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Multiline::deserialize(deserializer)? {
        Multiline::One(s) => s,
        Multiline::Many(lines) => lines.concat(),
    })
}
