//! nbgrade CLI: checksum, validate and grade exercise notebooks.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use nbgrade_core::error::{
    ClearError, ExecutionError, GradingError, PolicyViolation, ScoreCheckError, StructuralError,
};

mod commands;

#[derive(Parser)]
#[command(name = "nbgrade", version, about = "Checksum and grade exercise notebooks")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and check notebook checksums
    Checksum {
        #[command(subcommand)]
        command: ChecksumCommand,
    },

    /// Validate, execute, grade and clear local notebooks
    Notebook {
        #[command(subcommand)]
        command: NotebookCommand,
    },

    /// Grade against and publish to the grading portal
    Portal {
        #[command(subcommand)]
        command: PortalCommand,
    },
}

#[derive(Subcommand)]
enum ChecksumCommand {
    /// Print the notebook's checksum baseline
    Digest {
        /// Notebook path
        notebook: PathBuf,

        /// Emit one digest per graded cell instead of an aggregate
        #[arg(long)]
        per_cell: bool,
    },

    /// Check a notebook against a baseline
    Validate {
        /// Notebook path
        notebook: PathBuf,

        /// Baseline JSON, hex digest, or path to a file holding either
        #[arg(long)]
        checksum: String,
    },
}

#[derive(Subcommand)]
enum NotebookCommand {
    /// Check an instructor notebook: it must execute cleanly and earn full marks
    Validate {
        /// Notebook path
        notebook: PathBuf,

        /// Baseline to validate against before and after execution
        #[arg(long)]
        checksum: Option<String>,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Total the exercise's points must add up to
        #[arg(long)]
        expected_total: Option<f64>,
    },

    /// Grade a learner submission
    Grade {
        /// Notebook path
        notebook: PathBuf,

        /// Baseline to validate against before and after execution
        #[arg(long)]
        checksum: String,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Grade the outputs already stored in the notebook
        #[arg(long)]
        no_execute: bool,

        /// Write a JSON grade report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Grade every notebook in a directory against one baseline
    GradeBatch {
        /// Directory of submissions
        dir: PathBuf,

        /// Baseline to validate against before and after execution
        #[arg(long)]
        checksum: String,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Grade the outputs already stored in the notebooks
        #[arg(long)]
        no_execute: bool,
    },

    /// Execute a notebook and write the executed copy
    Execute {
        /// Notebook path
        notebook: PathBuf,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output path (defaults to overwriting the notebook)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write the learner version of a notebook
    Clear {
        /// Notebook path
        notebook: PathBuf,

        /// Output path (defaults to overwriting the notebook)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PortalCommand {
    /// Grade a submission and publish its status to the portal
    Grade {
        #[command(flatten)]
        portal: commands::portal::PortalArgs,

        /// Learner username
        #[arg(long)]
        username: String,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Publish the notebook's checksum baseline
    Update {
        #[command(flatten)]
        portal: commands::portal::PortalArgs,

        /// Publish one digest per graded cell instead of an aggregate
        #[arg(long)]
        per_cell: bool,
    },

    /// Check an instructor notebook, optionally against the published baseline
    Validate {
        #[command(flatten)]
        portal: commands::portal::PortalArgs,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Fetch the published baseline and validate against it
        #[arg(long)]
        checksum: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nbgrade=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Checksum { command } => match command {
            ChecksumCommand::Digest { notebook, per_cell } => {
                commands::checksum::digest(notebook, per_cell)
            }
            ChecksumCommand::Validate { notebook, checksum } => {
                commands::checksum::validate(notebook, checksum)
            }
        },
        Commands::Notebook { command } => match command {
            NotebookCommand::Validate {
                notebook,
                checksum,
                timeout,
                expected_total,
            } => {
                commands::notebook::validate(notebook, checksum, timeout, expected_total, config)
                    .await
            }
            NotebookCommand::Grade {
                notebook,
                checksum,
                timeout,
                no_execute,
                report,
            } => {
                commands::notebook::grade(notebook, checksum, timeout, no_execute, report, config)
                    .await
            }
            NotebookCommand::GradeBatch {
                dir,
                checksum,
                timeout,
                no_execute,
            } => commands::notebook::grade_batch(dir, checksum, timeout, no_execute, config).await,
            NotebookCommand::Execute {
                notebook,
                timeout,
                output,
            } => commands::notebook::execute(notebook, timeout, output, config).await,
            NotebookCommand::Clear { notebook, output } => {
                commands::notebook::clear(notebook, output)
            }
        },
        Commands::Portal { command } => match command {
            PortalCommand::Grade {
                portal,
                username,
                timeout,
            } => commands::portal::grade(portal, username, timeout, config).await,
            PortalCommand::Update { portal, per_cell } => {
                commands::portal::update(portal, per_cell, config).await
            }
            PortalCommand::Validate {
                portal,
                timeout,
                checksum,
            } => commands::portal::validate(portal, timeout, checksum, config).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(exit_code(&e));
    }
}

/// Exit code for a failed command, by error category.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<GradingError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<StructuralError>().is_some() || err.downcast_ref::<ClearError>().is_some()
    {
        return 2;
    }
    if err.downcast_ref::<ExecutionError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<ScoreCheckError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<PolicyViolation>().is_some() {
        return 5;
    }
    6
}
