//! Working directory and environment for notebook kernels.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tokio::process::Command;

/// Environment variables removed before a kernel starts, so learner code
/// cannot read credentials of the grading host.
pub const SCRUBBED_ENV_VARS: &[&str] = &[
    "NBGRADE_TOKEN",
    "NBGRADE_GRADING_URL",
    "NBGRADE_CHECKSUM_URL",
    "SSH_AUTH_SOCK",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "AZURE_CLIENT_SECRET",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "DOCKER_HOST",
    "DOCKER_CONFIG",
    "KUBECONFIG",
    "DATABASE_URL",
    "NPM_TOKEN",
];

enum WorkDir {
    Given(PathBuf),
    Temp(TempDir),
}

/// Where a notebook runs and for how long.
///
/// Without an explicit directory a temporary one is created and removed on
/// drop.
pub struct Sandbox {
    work_dir: WorkDir,
    timeout: Duration,
}

impl Sandbox {
    pub fn new(working_dir: Option<&Path>, timeout: Duration) -> Result<Self> {
        let work_dir = match working_dir {
            Some(dir) => {
                if !dir.is_dir() {
                    anyhow::bail!("working directory does not exist: {}", dir.display());
                }
                WorkDir::Given(dir.to_path_buf())
            }
            None => WorkDir::Temp(TempDir::new().context("failed to create temp directory")?),
        };
        Ok(Self { work_dir, timeout })
    }

    pub fn work_dir(&self) -> &Path {
        match &self.work_dir {
            WorkDir::Given(path) => path,
            WorkDir::Temp(dir) => dir.path(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Point `cmd` at the working directory and strip sensitive variables.
    pub fn apply(&self, cmd: &mut Command) {
        cmd.current_dir(self.work_dir());
        for var in SCRUBBED_ENV_VARS {
            cmd.env_remove(var);
        }
    }
}
