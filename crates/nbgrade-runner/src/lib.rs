//! nbgrade-runner: Notebook execution backends.
//!
//! Runs notebooks through `jupyter nbconvert` in a scrubbed environment with
//! a hard timeout, and provides a scripted executor for tests.

pub mod nbconvert;
pub mod sandbox;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;

use nbgrade_core::error::ExecutionError;
use nbgrade_core::model::Notebook;
use nbgrade_core::traits::{ExecuteRequest, NotebookExecutor};

pub use scripted::ScriptedExecutor;

/// Executor backed by a local Jupyter installation.
pub struct JupyterExecutor {
    command: nbconvert::NbconvertCommand,
    /// Used when a request carries no timeout.
    default_timeout: Duration,
}

impl JupyterExecutor {
    pub fn new() -> Self {
        Self {
            command: nbconvert::NbconvertCommand::default(),
            default_timeout: Duration::from_secs(600),
        }
    }

    /// Run a different program, e.g. `python3 -m jupyter`.
    pub fn with_program(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.command.program = program.into();
        self.command.leading_args = leading_args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_kernel(mut self, kernel_name: impl Into<String>) -> Self {
        self.command.kernel_name = Some(kernel_name.into());
        self
    }
}

impl Default for JupyterExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotebookExecutor for JupyterExecutor {
    fn name(&self) -> &str {
        "jupyter"
    }

    #[tracing::instrument(skip_all, fields(cells = request.notebook.cells.len()))]
    async fn execute(&self, request: &ExecuteRequest) -> Result<Notebook, ExecutionError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let sandbox = sandbox::Sandbox::new(request.working_dir.as_deref(), timeout)
            .map_err(|e| ExecutionError::Launch(format!("{e:#}")))?;

        tracing::info!(
            dir = %sandbox.work_dir().display(),
            timeout_secs = timeout.as_secs(),
            allow_errors = request.allow_errors,
            "executing notebook"
        );
        nbconvert::run(&self.command, &sandbox, &request.notebook, request.allow_errors).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use nbgrade_core::model::Cell;

    use super::*;

    /// An executor whose "jupyter" is `sh <script>`; the script ignores the
    /// nbconvert arguments.
    fn scripted_shell(dir: &Path, body: &str) -> JupyterExecutor {
        let script = dir.join("fake-jupyter.sh");
        std::fs::write(&script, body).unwrap();
        JupyterExecutor::new().with_program("sh", vec![script.to_string_lossy().to_string()])
    }

    fn request(dir: &Path, timeout: Duration) -> ExecuteRequest {
        ExecuteRequest {
            notebook: Notebook::new(vec![Cell::code("print('hi')")]),
            timeout: Some(timeout),
            allow_errors: true,
            working_dir: Some(dir.to_path_buf()),
        }
    }

    #[tokio::test]
    async fn echoed_notebook_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let executor = scripted_shell(dir.path(), "cat\n");

        let executed = executor
            .execute(&request(dir.path(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(executed.cells[0].source, "print('hi')");
    }

    #[tokio::test]
    async fn slow_run_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let executor = scripted_shell(dir.path(), "sleep 10\n");

        let err = executor
            .execute(&request(dir.path(), Duration::from_millis(300)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(_)));
    }

    #[tokio::test]
    async fn timeout_kills_background_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let executor = scripted_shell(
            dir.path(),
            "(sleep 1; touch kernel-alive; sleep 30) &\nwait\n",
        );

        let err = executor
            .execute(&request(dir.path(), Duration::from_millis(300)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!dir.path().join("kernel-alive").exists());
    }

    #[tokio::test]
    async fn cell_error_exit() {
        let dir = tempfile::tempdir().unwrap();
        let executor = scripted_shell(
            dir.path(),
            "cat > /dev/null\necho 'CellExecutionError: boom' >&2\nexit 1\n",
        );

        let err = executor
            .execute(&request(dir.path(), Duration::from_secs(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::CellError(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn non_notebook_output_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let executor = scripted_shell(dir.path(), "cat > /dev/null\necho hello\n");

        let err = executor
            .execute(&request(dir.path(), Duration::from_secs(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let executor = scripted_shell(dir.path(), "cat\ntouch ran-here\n");

        executor
            .execute(&request(dir.path(), Duration::from_secs(10)))
            .await
            .unwrap();

        assert!(dir.path().join("ran-here").exists());
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let executor = JupyterExecutor::new().with_program("nbgrade-no-such-program", vec![]);
        let err = executor
            .execute(&ExecuteRequest::new(Notebook::new(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Launch(_)));
    }
}
