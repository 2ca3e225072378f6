//! The `nbgrade portal` commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use nbgrade_core::checksum::{notebook_digest, ChecksumMode};
use nbgrade_core::engine::{GradingPipeline, Submission};
use nbgrade_core::parser;
use nbgrade_core::traits::{ResultReporter, StatusReport};
use nbgrade_portal::config::{load_config_from, NbgradeConfig};
use nbgrade_portal::{PortalClient, PortalReporter, Target};

use super::notebook::check_instructor_notebook;
use super::{format_score, jupyter_executor, notebook_dir, notebook_name};

/// Options shared by the portal commands.
#[derive(Args)]
pub struct PortalArgs {
    /// Notebook path
    #[arg(long)]
    pub notebook_path: PathBuf,

    /// Exercise code name (fills `{codename}` in portal URLs)
    #[arg(long)]
    pub codename: String,

    /// Submission status endpoint (overrides config)
    #[arg(long)]
    pub grading_url: Option<String>,

    /// Exercise checksum endpoint (overrides config)
    #[arg(long)]
    pub checksum_url: Option<String>,

    /// Portal API token (overrides config)
    #[arg(long)]
    pub token: Option<String>,
}

impl PortalArgs {
    /// Load config and layer the command-line overrides on top.
    fn load_config(&self, config_path: Option<PathBuf>) -> Result<NbgradeConfig> {
        let mut config = load_config_from(config_path.as_deref())?;
        if let Some(url) = &self.grading_url {
            config.portal.grading_url = Some(url.clone());
        }
        if let Some(url) = &self.checksum_url {
            config.portal.checksum_url = Some(url.clone());
        }
        if let Some(token) = &self.token {
            config.portal.token = Some(token.clone());
        }
        Ok(config)
    }
}

pub async fn grade(
    args: PortalArgs,
    username: String,
    timeout: Option<u64>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = args.load_config(config_path)?;
    let target = Target::new(&args.codename, username);
    let reporter = PortalReporter::new(PortalClient::new(&config.portal, &target)?);

    let notebook = match parser::read_notebook(&args.notebook_path) {
        Ok(notebook) => notebook,
        Err(e) => return Err(report_failure(&reporter, e).await),
    };

    println!("Fetching checksum...");
    let baseline = match reporter.client().fetch_baseline().await {
        Ok(baseline) => baseline,
        Err(e) => return Err(report_failure(&reporter, e.into()).await),
    };

    let mut pipeline_config = config.grading.pipeline_config();
    if let Some(secs) = timeout {
        pipeline_config.timeout = Some(Duration::from_secs(secs));
    }
    let submission = Submission::new(notebook_name(&args.notebook_path), notebook)
        .with_baseline(baseline)
        .with_working_dir(notebook_dir(&args.notebook_path));

    println!("Grading notebook...");
    let executor = Arc::new(jupyter_executor(&config.grading));
    let pipeline = GradingPipeline::new(executor, pipeline_config);
    let outcome = pipeline.run(submission, &reporter).await?;

    println!("{}", format_score(&outcome.result));
    Ok(())
}

/// Publish a `failed` status for an error raised outside the pipeline, then
/// hand the error back.
async fn report_failure(reporter: &dyn ResultReporter, err: anyhow::Error) -> anyhow::Error {
    let status = StatusReport::failed(format!("Unhandled exception {err:#}"));
    if let Err(e) = reporter.report(&status).await {
        tracing::error!("failed to report failed status: {e:#}");
    }
    err
}

pub async fn update(
    args: PortalArgs,
    per_cell: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = args.load_config(config_path)?;
    let client = PortalClient::new(&config.portal, &Target::new(&args.codename, ""))?;
    let notebook = parser::read_notebook(&args.notebook_path)?;

    let mode = if per_cell {
        ChecksumMode::PerCell
    } else {
        ChecksumMode::Aggregate
    };
    let baseline = notebook_digest(&notebook, mode)?;

    println!("Posting checksums...");
    client.publish_baseline(&baseline).await?;
    println!("Published checksum for {}", args.codename);
    Ok(())
}

pub async fn validate(
    args: PortalArgs,
    timeout: Option<u64>,
    checksum: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = args.load_config(config_path)?;

    let baseline = if checksum {
        let client = PortalClient::new(&config.portal, &Target::new(&args.codename, ""))?;
        println!("Fetching checksum...");
        Some(client.fetch_baseline().await?)
    } else {
        None
    };

    check_instructor_notebook(&args.notebook_path, baseline, timeout, None, &config).await
}
