//! HTTP client for the grading portal.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use nbgrade_core::checksum::Baseline;
use nbgrade_core::parser::to_json_string;
use nbgrade_core::traits::StatusReport;

use crate::config::PortalConfig;
use crate::error::TransportError;

/// The exercise (and learner) a client talks about; fills URL templates.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub codename: String,
    pub username: String,
}

impl Target {
    pub fn new(codename: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            codename: codename.into(),
            username: username.into(),
        }
    }

    /// Substitute `{codename}` and `{username}` in `template`.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{codename}", &self.codename)
            .replace("{username}", &self.username)
    }
}

#[derive(Serialize, Deserialize)]
struct ChecksumBody {
    checksum: Baseline,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
    score: Option<f64>,
    notebook: Option<()>,
    message: &'a str,
}

/// Client for one exercise on the grading portal.
pub struct PortalClient {
    client: reqwest::Client,
    token: String,
    grading_url: Option<String>,
    checksum_url: Option<String>,
    timeout_secs: u64,
}

impl PortalClient {
    pub fn new(config: &PortalConfig, target: &Target) -> Result<Self, TransportError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(TransportError::NotConfigured("token"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            token,
            grading_url: config.grading_url.as_deref().map(|u| target.render(u)),
            checksum_url: config.checksum_url.as_deref().map(|u| target.render(u)),
            timeout_secs: config.timeout_secs,
        })
    }

    fn grading_url(&self) -> Result<&str, TransportError> {
        self.grading_url
            .as_deref()
            .ok_or(TransportError::NotConfigured("grading_url"))
    }

    fn checksum_url(&self) -> Result<&str, TransportError> {
        self.checksum_url
            .as_deref()
            .ok_or(TransportError::NotConfigured("checksum_url"))
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    /// Fetch the published baseline of the exercise.
    #[instrument(skip(self))]
    pub async fn fetch_baseline(&self) -> Result<Baseline, TransportError> {
        let url = self.checksum_url()?;
        let response = self
            .client
            .get(url)
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let response = check_status(response, url).await?;

        let body: ChecksumBody = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("failed to parse checksum: {e}")))?;
        Ok(body.checksum)
    }

    /// Publish `baseline` as the exercise's checksum.
    #[instrument(skip_all)]
    pub async fn publish_baseline(&self, baseline: &Baseline) -> Result<(), TransportError> {
        let url = self.checksum_url()?;
        let response = self
            .client
            .patch(url)
            .header("Authorization", self.authorization())
            .json(&ChecksumBody {
                checksum: baseline.clone(),
            })
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        check_status(response, url).await?;
        Ok(())
    }

    /// Publish a submission status.
    ///
    /// Reports carrying a notebook are sent as multipart with the notebook as
    /// a file part; all others as JSON.
    #[instrument(skip_all, fields(status = %report.status))]
    pub async fn put_status(&self, report: &StatusReport) -> Result<(), TransportError> {
        let url = self.grading_url()?;
        let request = self
            .client
            .put(url)
            .header("Authorization", self.authorization());

        let request = match &report.notebook {
            Some(notebook) => {
                let json = to_json_string(notebook)
                    .map_err(|e| TransportError::InvalidResponse(format!("{e:#}")))?;
                let part = Part::text(json)
                    .file_name("notebook.ipynb")
                    .mime_str("application/x-ipynb+json")
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                let form = Form::new()
                    .text("status", report.status.as_str())
                    .text("score", report.score.map(|s| s.to_string()).unwrap_or_default())
                    .text("message", report.message.clone())
                    .part("notebook", part);
                request.multipart(form)
            }
            None => request.json(&StatusBody {
                status: report.status.as_str(),
                score: report.score,
                notebook: None,
                message: &report.message,
            }),
        };

        let response = request.send().await.map_err(|e| self.send_error(e))?;
        check_status(response, url).await?;
        Ok(())
    }

    fn send_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout_secs)
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, TransportError> {
    let status = response.status().as_u16();
    match status {
        401 | 403 => {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::Unauthorized(body))
        }
        404 => Err(TransportError::NotFound(url.to_string())),
        s if s >= 400 => {
            let message = response.text().await.unwrap_or_default();
            Err(TransportError::Api { status, message })
        }
        _ => Ok(response),
    }
}
