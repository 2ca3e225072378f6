//! Status reporting to the grading portal.

use async_trait::async_trait;

use nbgrade_core::traits::{ResultReporter, StatusReport};

use crate::client::PortalClient;

/// Publishes every status update to the portal's grading endpoint.
pub struct PortalReporter {
    client: PortalClient,
}

impl PortalReporter {
    pub fn new(client: PortalClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PortalClient {
        &self.client
    }
}

#[async_trait]
impl ResultReporter for PortalReporter {
    fn name(&self) -> &str {
        "portal"
    }

    async fn report(&self, report: &StatusReport) -> anyhow::Result<()> {
        tracing::info!(status = %report.status, score = ?report.score, "posting status");
        self.client.put_status(report).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nbgrade_core::checksum::{notebook_digest, ChecksumMode};
    use nbgrade_core::engine::{GradingPipeline, PipelineConfig, Submission};
    use nbgrade_core::model::{Cell, GradingRecord, Notebook};
    use nbgrade_runner::ScriptedExecutor;
    use wiremock::matchers::{body_json, body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::Target;
    use crate::config::PortalConfig;

    fn reporter(server: &MockServer) -> PortalReporter {
        let config = PortalConfig {
            token: Some("secret".into()),
            grading_url: Some(format!("{}/grading/{{codename}}/{{username}}/", server.uri())),
            checksum_url: None,
            timeout_secs: 5,
        };
        PortalReporter::new(PortalClient::new(&config, &Target::new("ex01", "bob")).unwrap())
    }

    fn exercise() -> Notebook {
        Notebook::new(vec![Cell::code("assert 1")
            .with_grading(GradingRecord::autograded("q1", 10.0))
            .with_outputs(1, vec![])])
    }

    #[tokio::test]
    async fn pipeline_publishes_grading_then_graded() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(body_json(serde_json::json!({
                "status": "grading", "score": null, "notebook": null, "message": ""
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(body_string_contains("notebook.ipynb"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let nb = exercise();
        let pipeline = GradingPipeline::new(Arc::new(ScriptedExecutor::new()), PipelineConfig::default());
        let submission = Submission::new("bob", nb.clone())
            .with_baseline(notebook_digest(&nb, ChecksumMode::Aggregate).unwrap());

        let outcome = pipeline.run(submission, &reporter(&server)).await.unwrap();
        assert_eq!(outcome.result.total_score, 10.0);
    }

    #[tokio::test]
    async fn pipeline_publishes_checksum_failed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(body_json(serde_json::json!({
                "status": "checksum-failed", "score": null, "notebook": null, "message": ""
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let nb = exercise();
        let mut tampered = nb.clone();
        tampered.cells[0].source = "assert True".into();
        let pipeline = GradingPipeline::new(Arc::new(ScriptedExecutor::new()), PipelineConfig::default());
        let submission = Submission::new("bob", tampered)
            .with_baseline(notebook_digest(&nb, ChecksumMode::Aggregate).unwrap());

        let err = pipeline.run(submission, &reporter(&server)).await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_report_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = reporter(&server)
            .report(&StatusReport::grading())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }
}
