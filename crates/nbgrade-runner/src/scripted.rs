//! Deterministic executor for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use nbgrade_core::classify::grading_record;
use nbgrade_core::error::ExecutionError;
use nbgrade_core::model::{CellType, Notebook, Output};
use nbgrade_core::traits::{ExecuteRequest, NotebookExecutor};

/// What a scripted cell "prints" when executed.
#[derive(Debug, Clone, PartialEq)]
pub enum CellScript {
    /// Runs cleanly with no output.
    Pass,
    /// Raises the named exception.
    Raise(String),
    /// Writes to stderr.
    Stderr(String),
    /// Evaluates to a value with this `text/plain` repr.
    Result(String),
}

impl CellScript {
    fn outputs(&self) -> Vec<Output> {
        match self {
            CellScript::Pass => vec![],
            CellScript::Raise(ename) => vec![Output::error(ename.clone(), "")],
            CellScript::Stderr(text) => vec![Output::stderr(text.clone())],
            CellScript::Result(text) => vec![Output::result(text.clone())],
        }
    }
}

static PASS: CellScript = CellScript::Pass;

/// Fills outputs by `grade_id` instead of running a kernel.
///
/// Every code cell gets an execution count; cells without a script behave as
/// [`CellScript::Pass`].
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, CellScript>,
    rewrites: HashMap<String, String>,
    fail_with: Option<ExecutionError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell(mut self, grade_id: impl Into<String>, script: CellScript) -> Self {
        self.scripts.insert(grade_id.into(), script);
        self
    }

    /// Replace a cell's source during execution, as a notebook that rewrites
    /// itself would.
    pub fn with_rewrite(mut self, grade_id: impl Into<String>, source: impl Into<String>) -> Self {
        self.rewrites.insert(grade_id.into(), source.into());
        self
    }

    /// Fail every run with `error`.
    pub fn failing(mut self, error: ExecutionError) -> Self {
        self.fail_with = Some(error);
        self
    }

    /// Take `delay` per run; runs longer than the request timeout time out.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `execute` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotebookExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<Notebook, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            match request.timeout {
                Some(timeout) if delay > timeout => {
                    tokio::time::sleep(timeout).await;
                    return Err(ExecutionError::Timeout(timeout));
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        let mut notebook = request.notebook.clone();
        let mut execution_count = 0;

        for cell in notebook.cells.iter_mut() {
            let grade_id = grading_record(cell)
                .map_err(|e| ExecutionError::InvalidOutput(e.to_string()))?
                .map(|r| r.grade_id);

            if let Some(source) = grade_id.as_ref().and_then(|id| self.rewrites.get(id)) {
                cell.source = source.clone();
            }
            if cell.cell_type != CellType::Code {
                continue;
            }

            execution_count += 1;
            let script = grade_id
                .as_ref()
                .and_then(|id| self.scripts.get(id))
                .unwrap_or(&PASS);

            if let CellScript::Raise(ename) = script {
                if !request.allow_errors {
                    return Err(ExecutionError::CellError(format!(
                        "{ename} in cell {}",
                        grade_id.unwrap_or_default()
                    )));
                }
            }

            cell.execution_count = Some(execution_count);
            cell.outputs = script.outputs();
        }

        Ok(notebook)
    }
}
