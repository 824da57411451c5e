use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::{McpError, Result};
use crate::types::{ImpactAnalysis, ProjectStatus, ProjectStructure, UpdateResult, ValidationResult, ValidationScope};

/// Typed remote calls to the project-generation backend (§4.E). No retry
/// logic lives here — that decision belongs one layer up, in the
/// Workflow Driver.
pub struct McpClient {
    http: reqwest::Client,
    base_url: String,
}

impl McpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is static and always valid");
        Self { http, base_url: base_url.into() }
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "calling MCP");
        let resp = self.http.post(&url).json(&body).send().await?;
        self.decode(resp).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "calling MCP");
        let resp = self.http.get(&url).send().await?;
        self.decode(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "MCP returned an error status");
            return Err(McpError::Api { status: status.as_u16(), body });
        }
        resp.json::<T>().await.map_err(|e| McpError::Parse(e.to_string()))
    }

    #[instrument(skip(self, current_state), fields(project_id))]
    pub async fn analyze_change_impact(
        &self,
        project_id: &str,
        requested_change: &str,
        current_state: &Value,
    ) -> Result<ImpactAnalysis> {
        self.post(
            "/api/v1/projects/analyze-impact",
            json!({ "projectId": project_id, "requestedChange": requested_change, "currentState": current_state }),
        )
        .await
    }

    #[instrument(skip(self, requirements), fields(project_type))]
    pub async fn generate_project_structure(
        &self,
        requirements: &Value,
        project_type: &str,
    ) -> Result<ProjectStructure> {
        self.post(
            "/api/v1/projects/generate-structure",
            json!({ "requirements": requirements, "projectType": project_type }),
        )
        .await
    }

    #[instrument(skip(self, requirements), fields(project_id))]
    pub async fn analyze_domain(&self, project_id: &str, requirements: &Value) -> Result<Value> {
        self.post(
            "/api/v1/projects/analyze-domain",
            json!({ "projectId": project_id, "requirements": requirements }),
        )
        .await
    }

    #[instrument(skip(self), fields(project_id))]
    pub async fn generate_backend(&self, project_id: &str) -> Result<Value> {
        self.post("/api/v1/projects/generate-backend", json!({ "projectId": project_id })).await
    }

    #[instrument(skip(self), fields(project_id))]
    pub async fn generate_frontend(&self, project_id: &str) -> Result<Value> {
        self.post("/api/v1/projects/generate-frontend", json!({ "projectId": project_id })).await
    }

    #[instrument(skip(self), fields(project_id))]
    pub async fn setup_infrastructure(&self, project_id: &str) -> Result<Value> {
        self.post("/api/v1/projects/setup-infrastructure", json!({ "projectId": project_id })).await
    }

    #[instrument(skip(self, components), fields(project_id, update_type))]
    pub async fn update_components(
        &self,
        project_id: &str,
        components: &[String],
        update_type: &str,
    ) -> Result<UpdateResult> {
        self.post(
            "/api/v1/projects/update-components",
            json!({ "projectId": project_id, "components": components, "updateType": update_type }),
        )
        .await
    }

    #[instrument(skip(self), fields(project_id, %scope))]
    pub async fn validate_consistency(&self, project_id: &str, scope: ValidationScope) -> Result<ValidationResult> {
        self.post(
            "/api/v1/projects/validate",
            json!({ "projectId": project_id, "scope": scope.to_string() }),
        )
        .await
    }

    #[instrument(skip(self), fields(project_id))]
    pub async fn get_project_status(&self, project_id: &str) -> Result<ProjectStatus> {
        self.get(&format!("/api/v1/projects/{project_id}/status")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn analyze_change_impact_decodes_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/analyze-impact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "affectedComponents": ["api"],
                "riskLevel": "high",
                "breakingChanges": true,
                "requiredUpdates": ["schema"],
                "complexity": "medium",
            })))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri(), Duration::from_secs(5));
        let result = client
            .analyze_change_impact("proj-1", "swap database to mongo", &json!({}))
            .await
            .unwrap();
        assert!(result.is_high_risk());
        assert_eq!(result.affected_components, vec!["api".to_string()]);
    }

    #[tokio::test]
    async fn non_2xx_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/generate-backend"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri(), Duration::from_secs(5));
        let err = client.generate_backend("proj-1").await.unwrap_err();
        match err {
            McpError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_failure_maps_to_unreachable() {
        let client = McpClient::new("http://127.0.0.1:1", Duration::from_millis(200));
        let err = client.get_project_status("proj-1").await.unwrap_err();
        assert!(matches!(err, McpError::Unreachable(_)));
    }
}
