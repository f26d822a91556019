pub mod approvers;
pub mod config;
pub mod error;
pub mod github;
pub mod interaction;
pub mod recording;
pub mod secrets;
pub mod slack;
pub mod state_machine;
pub mod store;
pub mod webhook;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use shipgate_core::PromotionChain;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use error::GateError;
pub use github::{CiPlatform, GitHubClient};
pub use recording::RecordingLogger;
pub use secrets::{Credentials, SecretProvider};
pub use slack::{ChatPlatform, SlackClient};
pub use state_machine::InterpreterContext;
pub use store::RecordStore;

pub fn service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub chain: PromotionChain,
    pub records: RecordStore,
    pub chat: Arc<dyn ChatPlatform>,
    pub ci: Arc<dyn CiPlatform>,
    pub secrets: Arc<dyn SecretProvider>,
    pub channel: String,
    /// Workflows whose deployment statuses are tracked.
    pub deploy_workflows: Vec<String>,
    /// Workflow dispatched on approval.
    pub dispatch_workflow: String,
    pub github_webhook_secret: String,
    pub slack_signing_secret: String,
    pub recording_logger: Option<RecordingLogger>,
}

impl AppState {
    /// Interpreter context for one inbound request, with freshly fetched tokens.
    pub async fn interpreter(
        &self,
        correlation_id: Option<String>,
    ) -> Result<InterpreterContext, GateError> {
        Ok(InterpreterContext {
            chat: self.chat.clone(),
            ci: self.ci.clone(),
            records: self.records.clone(),
            credentials: self.secrets.fetch().await?,
            channel: self.channel.clone(),
            dispatch_workflow: self.dispatch_workflow.clone(),
            correlation_id,
        })
    }
}

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "shipgate"
    })))
}

async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "shipgate",
        "version": service_version(),
        "description": "Chat-approved promotion of deployments between environments",
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "API documentation and service information",
                "authentication": "None"
            },
            {
                "path": "/github/webhook",
                "method": "POST",
                "description": "GitHub deployment_status webhook receiver",
                "authentication": "GitHub webhook signature (X-Hub-Signature-256)"
            },
            {
                "path": "/slack/interaction",
                "method": "POST",
                "description": "Slack interactive callback for approve/reject buttons",
                "authentication": "Slack request signature (X-Slack-Signature)"
            },
            {
                "path": "/slack/approvers/add",
                "method": "POST",
                "description": "Slash command: add the mentioned user as an approver",
                "authentication": "Slack request signature (X-Slack-Signature)"
            },
            {
                "path": "/slack/approvers/remove",
                "method": "POST",
                "description": "Slash command: remove the mentioned approver",
                "authentication": "Slack request signature (X-Slack-Signature)"
            },
            {
                "path": "/slack/approvers/list",
                "method": "POST",
                "description": "Slash command: list approvers",
                "authentication": "Slack request signature (X-Slack-Signature)"
            }
        ],
        "configuration": {
            "required_env_vars": [
                "GITHUB_WEBHOOK_SECRET",
                "SLACK_SIGNING_SECRET",
                "SLACK_CHANNEL",
                "SECRETS_FILE or SLACK_TOKEN and GITHUB_TOKEN"
            ],
            "optional_env_vars": [
                "NEXT_ENVS (default: {\"dev\":\"test\",\"test\":\"prod\"})",
                "APPROVAL_ENVS (default: prod)",
                "IDENTITY_BINDINGS (default: {})",
                "DEPLOY_WORKFLOWS (default: Deploy,deploy-to-env)",
                "DISPATCH_WORKFLOW (default: deploy-to-env)",
                "PORT (default: 3000)",
                "STATE_DIR (default: current directory)",
                "HISTORY_TTL_DAYS (default: 90)",
                "RECORDING_ENABLED (default: false)",
                "RECORDING_LOG_PATH (default: recordings.jsonl)"
            ]
        }
    }))
}

/// The full HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .merge(webhook::webhook_router(state.clone()))
        .merge(interaction::slack_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
