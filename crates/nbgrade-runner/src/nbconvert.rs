//! Notebook execution through `jupyter nbconvert`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use nbgrade_core::error::ExecutionError;
use nbgrade_core::model::Notebook;

use crate::sandbox::Sandbox;

/// Marker nbconvert prints when a cell raised and errors were not allowed.
const CELL_ERROR_MARKER: &str = "CellExecutionError";

/// How to invoke nbconvert.
#[derive(Debug, Clone)]
pub struct NbconvertCommand {
    /// Executable, `jupyter` by default.
    pub program: String,
    /// Arguments placed before `nbconvert` (e.g. `["-m", "jupyter"]` for a
    /// `python` program).
    pub leading_args: Vec<String>,
    /// Kernel to execute with; the notebook's own kernelspec when unset.
    pub kernel_name: Option<String>,
}

impl Default for NbconvertCommand {
    fn default() -> Self {
        Self {
            program: "jupyter".into(),
            leading_args: Vec::new(),
            kernel_name: None,
        }
    }
}

impl NbconvertCommand {
    /// Full argument list for one run.
    pub fn args(&self, timeout: Duration, allow_errors: bool) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(
            [
                "nbconvert",
                "--to",
                "notebook",
                "--execute",
                "--stdin",
                "--stdout",
            ]
            .map(String::from),
        );
        args.push(format!(
            "--ExecutePreprocessor.timeout={}",
            timeout.as_secs().max(1)
        ));
        if allow_errors {
            args.push("--allow-errors".into());
        }
        if let Some(kernel) = &self.kernel_name {
            args.push(format!("--ExecutePreprocessor.kernel_name={kernel}"));
        }
        args
    }
}

/// Execute `notebook` inside `sandbox` and parse the executed copy.
pub async fn run(
    command: &NbconvertCommand,
    sandbox: &Sandbox,
    notebook: &Notebook,
    allow_errors: bool,
) -> Result<Notebook, ExecutionError> {
    let start = Instant::now();
    let input = serde_json::to_vec(notebook)
        .map_err(|e| ExecutionError::Launch(format!("failed to serialize notebook: {e}")))?;

    let mut cmd = Command::new(&command.program);
    cmd.args(command.args(sandbox.timeout(), allow_errors))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // The kernel inherits this group; a timeout kills the whole group.
    #[cfg(unix)]
    cmd.process_group(0);
    sandbox.apply(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| {
        ExecutionError::Launch(format!("failed to start `{}`: {e}", command.program))
    })?;
    let pid = child.id();

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                tracing::debug!("kernel process closed stdin early: {e}");
            }
        });
    }

    let output = match tokio::time::timeout(sandbox.timeout(), child.wait_with_output()).await {
        Ok(result) => result
            .map_err(|e| ExecutionError::Launch(format!("failed to wait for nbconvert: {e}")))?,
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            tracing::warn!(
                timeout_ms = sandbox.timeout().as_millis() as u64,
                "notebook execution timed out"
            );
            return Err(ExecutionError::Timeout(sandbox.timeout()));
        }
    };

    tracing::debug!(
        status = %output.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "nbconvert finished"
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify_failure(&output.status.to_string(), &stderr));
    }

    parse_output(&output.stdout)
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        tracing::debug!(pgid, "process group already gone: {e}");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Map a failed run to an error category from its stderr.
fn classify_failure(status: &str, stderr: &str) -> ExecutionError {
    let tail = stderr_tail(stderr, 20);
    if stderr.contains(CELL_ERROR_MARKER) {
        ExecutionError::CellError(tail)
    } else {
        ExecutionError::Launch(format!("nbconvert {status}: {tail}"))
    }
}

fn parse_output(stdout: &[u8]) -> Result<Notebook, ExecutionError> {
    let notebook: Notebook = serde_json::from_slice(stdout)
        .map_err(|e| ExecutionError::InvalidOutput(e.to_string()))?;
    if notebook.nbformat != 4 {
        return Err(ExecutionError::InvalidOutput(format!(
            "unexpected nbformat {}",
            notebook.nbformat
        )));
    }
    Ok(notebook)
}

/// Last `max_lines` non-empty lines of stderr.
fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(max_lines);
    lines[skip..].join("\n")
}
