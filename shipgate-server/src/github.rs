//! GitHub Actions client used to dispatch promotions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::GateError;
use crate::recording::{RecordingLogger, ServiceType, CORRELATION_ID_HEADER};
use crate::slack::create_client;

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const SERVICE: &str = "github";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: String,
}

/// Operations the dispatcher needs from the CI platform.
#[async_trait]
pub trait CiPlatform: Send + Sync {
    async fn list_workflows(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Workflow>, GateError>;

    async fn dispatch_workflow(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        owner: &str,
        repo: &str,
        workflow_id: u64,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), GateError>;
}

#[derive(Clone)]
pub struct GitHubClient {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowsResponse {
    workflows: Vec<Workflow>,
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: &'a BTreeMap<String, String>,
}

impl GitHubClient {
    pub fn new() -> Self {
        Self::new_with_recording(None)
    }

    pub fn new_with_recording(recording_logger: Option<RecordingLogger>) -> Self {
        Self {
            client: create_client(recording_logger, ServiceType::GitHub),
            base_url: GITHUB_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        correlation_id: Option<&str>,
        token: &str,
    ) -> reqwest_middleware::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(cid) = correlation_id {
            builder = builder.header(CORRELATION_ID_HEADER, cid);
        }
        builder
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn check(response: reqwest::Response) -> Result<String, GateError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GateError::upstream(SERVICE, Some(status.as_u16()), e.to_string()))?;
    if !status.is_success() {
        error!("GitHub API error: {} - {}", status, text);
        return Err(GateError::upstream(SERVICE, Some(status.as_u16()), text));
    }
    Ok(text)
}

#[async_trait]
impl CiPlatform for GitHubClient {
    async fn list_workflows(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Workflow>, GateError> {
        let url = format!(
            "{}/repos/{}/{}/actions/workflows",
            self.base_url, owner, repo
        );
        let response = self
            .request(reqwest::Method::GET, &url, correlation_id, token)
            .send()
            .await
            .map_err(|e| GateError::upstream(SERVICE, None, e.to_string()))?;
        let text = check(response).await?;

        let parsed: WorkflowsResponse = serde_json::from_str(&text)
            .map_err(|e| GateError::upstream(SERVICE, Some(200), format!("{}: {}", e, text)))?;
        Ok(parsed.workflows)
    }

    async fn dispatch_workflow(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        owner: &str,
        repo: &str,
        workflow_id: u64,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), GateError> {
        let url = format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.base_url, owner, repo, workflow_id
        );
        let body = serde_json::to_string(&DispatchRequest { git_ref, inputs })
            .map_err(|e| GateError::Internal(format!("failed to encode dispatch: {}", e)))?;

        info!(
            "Dispatching workflow {} on {}/{}@{}",
            workflow_id, owner, repo, git_ref
        );
        let response = self
            .request(reqwest::Method::POST, &url, correlation_id, token)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GateError::upstream(SERVICE, None, e.to_string()))?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflows_response_parses() {
        let parsed: WorkflowsResponse = serde_json::from_str(
            r#"{"total_count":2,"workflows":[
                {"id":1,"name":"CI","path":".github/workflows/ci.yml","state":"active"},
                {"id":2,"name":"deploy-to-env","path":".github/workflows/deploy.yml","state":"active"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parsed.workflows.len(), 2);
        assert_eq!(parsed.workflows[1].name, "deploy-to-env");
    }

    #[test]
    fn test_dispatch_body_shape() {
        let inputs = BTreeMap::from([
            ("deploy_env".to_string(), "prod".to_string()),
            ("oidc_role".to_string(), "arn:aws:iam::1:role/Prod".to_string()),
        ]);
        let body = serde_json::to_value(DispatchRequest {
            git_ref: "main",
            inputs: &inputs,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"ref": "main", "inputs": {"deploy_env": "prod", "oidc_role": "arn:aws:iam::1:role/Prod"}})
        );
    }
}
