//! The `nbgrade notebook` commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use nbgrade_core::checksum::Baseline;
use nbgrade_core::clear::{clear_notebook, ClearOptions};
use nbgrade_core::engine::{GradingPipeline, Submission};
use nbgrade_core::grade::grade as grade_notebook;
use nbgrade_core::parser;
use nbgrade_core::report::GradeReport;
use nbgrade_core::traits::{ExecuteRequest, NoopReporter, NotebookExecutor};
use nbgrade_portal::config::{load_config_from, NbgradeConfig};

use super::{format_score, jupyter_executor, notebook_dir, notebook_name, print_cell_scores};

pub async fn validate(
    notebook_path: PathBuf,
    checksum: Option<String>,
    timeout: Option<u64>,
    expected_total: Option<f64>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let baseline = checksum.as_deref().map(parser::read_baseline).transpose()?;
    check_instructor_notebook(&notebook_path, baseline, timeout, expected_total, &config).await
}

/// Instructor check: the notebook must match its baseline (if any), execute
/// without errors, add up to the expected total, earn full marks and clear
/// cleanly.
pub(crate) async fn check_instructor_notebook(
    notebook_path: &Path,
    baseline: Option<Baseline>,
    timeout: Option<u64>,
    expected_total: Option<f64>,
    config: &NbgradeConfig,
) -> Result<()> {
    let notebook = parser::read_notebook(notebook_path)?;

    let mut pipeline_config = config.grading.instructor_pipeline_config();
    if let Some(secs) = timeout {
        pipeline_config.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(total) = expected_total {
        pipeline_config.expected_total = Some(total);
    }

    let mut submission = Submission::new(notebook_name(notebook_path), notebook.clone())
        .with_working_dir(notebook_dir(notebook_path));
    if let Some(baseline) = baseline {
        println!("Validating notebook...");
        submission = submission.with_baseline(baseline);
    }

    println!("Executing notebook...");
    let executor = Arc::new(jupyter_executor(&config.grading));
    let pipeline = GradingPipeline::new(executor, pipeline_config);
    let outcome = pipeline.run(submission, &NoopReporter).await?;
    println!("{}", format_score(&outcome.result));

    println!("Clearing notebook...");
    clear_notebook(&notebook, &ClearOptions::default())?;

    println!("Notebook OK");
    Ok(())
}

pub async fn grade(
    notebook_path: PathBuf,
    checksum: String,
    timeout: Option<u64>,
    no_execute: bool,
    report_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let notebook = parser::read_notebook(&notebook_path)?;
    let baseline = parser::read_baseline(&checksum)?;

    let mut pipeline_config = config.grading.pipeline_config();
    if let Some(secs) = timeout {
        pipeline_config.timeout = Some(Duration::from_secs(secs));
    }
    pipeline_config.execute = !no_execute;

    let name = notebook_name(&notebook_path);
    let submission = Submission::new(name.clone(), notebook)
        .with_baseline(baseline)
        .with_working_dir(notebook_dir(&notebook_path));

    if no_execute {
        println!("Grading notebook...");
    } else {
        println!("Executing notebook...");
    }
    let executor = Arc::new(jupyter_executor(&config.grading));
    let pipeline = GradingPipeline::new(executor, pipeline_config);
    let outcome = pipeline.run(submission, &NoopReporter).await?;

    print_cell_scores(&outcome.cells);
    println!("{}", format_score(&outcome.result));

    if let Some(path) = report_path {
        let report = GradeReport::new(name, outcome.cells);
        report.save_json(&path)?;
        let pending = report.pending_manual().count();
        if pending > 0 {
            println!("{pending} cell(s) awaiting manual grading");
        }
        println!("Report written to {}", path.display());
    }
    Ok(())
}

pub async fn grade_batch(
    dir: PathBuf,
    checksum: String,
    timeout: Option<u64>,
    no_execute: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    use comfy_table::Table;

    let config = load_config_from(config_path.as_deref())?;
    let baseline = parser::read_baseline(&checksum)?;
    let notebooks = parser::load_notebook_directory(&dir)?;
    if notebooks.is_empty() {
        anyhow::bail!("no notebooks found in {}", dir.display());
    }

    let mut pipeline_config = config.grading.pipeline_config();
    if let Some(secs) = timeout {
        pipeline_config.timeout = Some(Duration::from_secs(secs));
    }
    pipeline_config.execute = !no_execute;

    let submissions: Vec<_> = notebooks
        .into_iter()
        .map(|(path, notebook)| {
            Submission::new(notebook_name(&path), notebook)
                .with_baseline(baseline.clone())
                .with_working_dir(notebook_dir(&path))
        })
        .collect();

    println!("Grading {} notebook(s)...", submissions.len());
    let executor = Arc::new(jupyter_executor(&config.grading));
    let pipeline = GradingPipeline::new(executor, pipeline_config);
    let results = pipeline.run_batch(submissions, &NoopReporter).await;

    let mut table = Table::new();
    table.set_header(vec!["Notebook", "Score", "Max", "Status"]);
    let mut failed = 0;
    for (id, result) in &results {
        match result {
            Ok(outcome) => {
                table.add_row(vec![
                    id.clone(),
                    outcome.result.total_score.to_string(),
                    outcome.result.max_score.to_string(),
                    "graded".to_string(),
                ]);
            }
            Err(e) => {
                failed += 1;
                table.add_row(vec![id.clone(), "-".into(), "-".into(), e.to_string()]);
            }
        }
    }
    println!("{table}");

    if failed > 0 {
        anyhow::bail!("{failed} of {} submission(s) failed", results.len());
    }
    Ok(())
}

pub async fn execute(
    notebook_path: PathBuf,
    timeout: Option<u64>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let notebook = parser::read_notebook(&notebook_path)?;

    let request = ExecuteRequest {
        notebook,
        timeout: timeout
            .or(config.grading.timeout_secs)
            .map(Duration::from_secs),
        allow_errors: config.grading.allow_errors,
        working_dir: Some(notebook_dir(&notebook_path)),
    };

    println!("Executing notebook...");
    let executed = jupyter_executor(&config.grading).execute(&request).await?;

    println!("Grading notebook...");
    println!("{}", format_score(&grade_notebook(&executed)?));

    let output = output.unwrap_or(notebook_path);
    parser::write_notebook(&executed, &output)?;
    println!("Wrote {}", output.display());
    Ok(())
}

pub fn clear(notebook_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let notebook = parser::read_notebook(&notebook_path)?;

    println!("Clearing notebook...");
    let cleared = clear_notebook(&notebook, &ClearOptions::default())?;

    let output = output.unwrap_or(notebook_path);
    parser::write_notebook(&cleared, &output)?;
    println!("Wrote {}", output.display());
    Ok(())
}
