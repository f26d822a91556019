//! Normalization of inbound CI deployment-status webhooks.
//!
//! GitHub sends `deployment_status` events for every deployment in a
//! repository. Only events produced by the allow-listed deployment workflows
//! are relevant; everything else is acknowledged and dropped.

use serde::Deserialize;
use std::fmt;

use crate::record::DeploymentStatus;

/// Workflow names whose deployment statuses are tracked by default.
pub const DEFAULT_DEPLOY_WORKFLOWS: &[&str] = &["Deploy", "deploy-to-env"];

/// A deployment status in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentEvent {
    pub repository: String,
    pub owner: String,
    pub environment: String,
    pub deployment_id: u64,
    pub branch: String,
    pub sha: String,
    pub status: DeploymentStatus,
    pub actor: String,
    pub target_url: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Why a payload was dropped without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The payload has no `deployment_status` object.
    NotDeploymentStatus,
    /// The originating workflow is not one of the deployment workflows.
    WorkflowNotAllowed(Option<String>),
    /// The payload claims to be a deployment status but is missing data.
    Malformed(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDeploymentStatus => write!(f, "not a deployment status event"),
            Self::WorkflowNotAllowed(Some(name)) => {
                write!(f, "workflow '{}' is not a deployment workflow", name)
            }
            Self::WorkflowNotAllowed(None) => write!(f, "event has no originating workflow"),
            Self::Malformed(reason) => write!(f, "malformed payload: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Event(DeploymentEvent),
    Ignored(IgnoreReason),
}

#[derive(Debug, Deserialize)]
struct Payload {
    deployment_status: DeploymentStatusBody,
    deployment: DeploymentBody,
    repository: RepositoryBody,
}

#[derive(Debug, Deserialize)]
struct DeploymentStatusBody {
    state: String,
    environment: String,
    created_at: String,
    updated_at: Option<String>,
    target_url: Option<String>,
    creator: Login,
}

#[derive(Debug, Deserialize)]
struct DeploymentBody {
    id: u64,
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryBody {
    name: String,
    owner: Login,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

/// Parse and filter a raw webhook body.
///
/// Never fails: anything that is not a usable deployment status from an
/// allow-listed workflow comes back as [`Normalized::Ignored`].
pub fn normalize(body: &[u8], allowed_workflows: &[String]) -> Normalized {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return Normalized::Ignored(IgnoreReason::Malformed(e.to_string())),
    };

    if value.get("deployment_status").is_none() {
        return Normalized::Ignored(IgnoreReason::NotDeploymentStatus);
    }

    let workflow = value
        .pointer("/workflow/name")
        .and_then(|name| name.as_str())
        .map(str::to_string);
    let allowed = workflow
        .as_deref()
        .is_some_and(|name| allowed_workflows.iter().any(|w| w == name));
    if !allowed {
        return Normalized::Ignored(IgnoreReason::WorkflowNotAllowed(workflow));
    }

    let payload: Payload = match serde_json::from_value(value) {
        Ok(payload) => payload,
        Err(e) => return Normalized::Ignored(IgnoreReason::Malformed(e.to_string())),
    };

    let status = match DeploymentStatus::parse(&payload.deployment_status.state) {
        Some(status) => status,
        None => {
            return Normalized::Ignored(IgnoreReason::Malformed(format!(
                "unknown deployment state '{}'",
                payload.deployment_status.state
            )))
        }
    };

    let created_at = payload.deployment_status.created_at;
    let updated_at = payload
        .deployment_status
        .updated_at
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| created_at.clone());

    Normalized::Event(DeploymentEvent {
        repository: payload.repository.name,
        owner: payload.repository.owner.login,
        environment: payload.deployment_status.environment,
        deployment_id: payload.deployment.id,
        branch: payload.deployment.ref_name,
        sha: payload.deployment.sha,
        status,
        actor: payload.deployment_status.creator.login,
        target_url: payload.deployment_status.target_url.unwrap_or_default(),
        created_at,
        updated_at,
    })
}
