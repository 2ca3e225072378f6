//! nbgrade configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nbgrade_core::engine::PipelineConfig;
use nbgrade_core::policy::HiddenTestPolicy;

/// Connection settings for the grading portal.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// API token sent as `Authorization: Token <token>`.
    #[serde(default)]
    pub token: Option<String>,
    /// Submission status endpoint; may contain `{username}` and `{codename}`.
    #[serde(default)]
    pub grading_url: Option<String>,
    /// Exercise checksum endpoint; may contain `{codename}`.
    #[serde(default)]
    pub checksum_url: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("grading_url", &self.grading_url)
            .field("checksum_url", &self.checksum_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            token: None,
            grading_url: None,
            checksum_url: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Grading defaults used by the CLI flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Execution budget per notebook, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Keep executing after a cell raises (learner grading).
    #[serde(default = "default_true")]
    pub allow_errors: bool,
    /// Total an exercise's points must add up to.
    #[serde(default = "default_expected_total")]
    pub expected_total: f64,
    /// Reject notebooks containing hidden test regions.
    #[serde(default = "default_true")]
    pub forbid_hidden_tests: bool,
    #[serde(default)]
    pub hidden_test_delimiters: HiddenTestPolicy,
    /// Max concurrent notebooks in batch grading.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Jupyter kernel to execute with; the notebook's own kernelspec when unset.
    #[serde(default)]
    pub kernel: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_expected_total() -> f64 {
    20.0
}
fn default_parallelism() -> usize {
    4
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            allow_errors: true,
            expected_total: default_expected_total(),
            forbid_hidden_tests: true,
            hidden_test_delimiters: HiddenTestPolicy::default(),
            parallelism: default_parallelism(),
            kernel: None,
        }
    }
}

impl GradingConfig {
    /// Pipeline settings for grading learner submissions.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            timeout: self.timeout_secs.map(Duration::from_secs),
            allow_errors: self.allow_errors,
            hidden_tests: self
                .forbid_hidden_tests
                .then(|| self.hidden_test_delimiters.clone()),
            parallelism: self.parallelism,
            ..PipelineConfig::default()
        }
    }

    /// Pipeline settings for checking an instructor's reference solution:
    /// errors abort execution and the solution must earn full marks.
    pub fn instructor_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            allow_errors: false,
            expected_total: Some(self.expected_total),
            require_full_score: true,
            ..self.pipeline_config()
        }
    }
}

/// Top-level nbgrade configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NbgradeConfig {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub grading: GradingConfig,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = lookup(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

fn resolve_portal_config(config: &mut PortalConfig, lookup: &dyn Fn(&str) -> Option<String>) {
    for field in [
        &mut config.token,
        &mut config.grading_url,
        &mut config.checksum_url,
    ] {
        if let Some(value) = field {
            *value = resolve_env_vars(value, lookup);
        }
    }
}

fn apply_env_overrides(config: &mut NbgradeConfig, lookup: &dyn Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("NBGRADE_TOKEN") {
        config.portal.token = Some(token);
    }
    if let Some(url) = lookup("NBGRADE_GRADING_URL") {
        config.portal.grading_url = Some(url);
    }
    if let Some(url) = lookup("NBGRADE_CHECKSUM_URL") {
        config.portal.checksum_url = Some(url);
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `nbgrade.toml` in the current directory
/// 2. `~/.config/nbgrade/config.toml`
///
/// Environment variable overrides: `NBGRADE_TOKEN`, `NBGRADE_GRADING_URL`,
/// `NBGRADE_CHECKSUM_URL`.
pub fn load_config() -> Result<NbgradeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<NbgradeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("nbgrade.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            parse_config_str(&content).with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => NbgradeConfig::default(),
    };

    finalize(&mut config, &process_env);
    Ok(config)
}

/// Parse a TOML config string without applying the environment.
pub fn parse_config_str(content: &str) -> Result<NbgradeConfig> {
    Ok(toml::from_str::<NbgradeConfig>(content)?)
}

fn finalize(config: &mut NbgradeConfig, lookup: &dyn Fn(&str) -> Option<String>) {
    apply_env_overrides(config, lookup);
    resolve_portal_config(&mut config.portal, lookup);
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("nbgrade"))
}
