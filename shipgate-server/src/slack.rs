//! Slack Web API client.

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use shipgate_core::{Block, MessageRef};
use tracing::{error, info, warn};

use crate::error::GateError;
use crate::recording::{RecordingLogger, RecordingMiddleware, ServiceType, CORRELATION_ID_HEADER};

const SLACK_API_BASE: &str = "https://slack.com/api";
const SERVICE: &str = "slack";

/// Profile fields used for approvers and vote tallies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub avatar_url: String,
    pub email: Option<String>,
}

/// Operations the resolver needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn post_message(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        channel: &str,
        blocks: &[Block],
    ) -> Result<MessageRef, GateError>;

    async fn update_message(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        message: &MessageRef,
        blocks: &[Block],
    ) -> Result<(), GateError>;

    /// `Ok(None)` when Slack answers but does not return a profile.
    async fn get_user_profile(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        user_id: &str,
    ) -> Result<Option<UserProfile>, GateError>;
}

#[derive(Clone)]
pub struct SlackClient {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: String,
    blocks: &'a [Block],
}

#[derive(Debug, Serialize)]
struct UpdateMessageRequest<'a> {
    channel: &'a str,
    ts: &'a str,
    text: String,
    blocks: &'a [Block],
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    ok: bool,
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    image_24: String,
    email: Option<String>,
}

/// Notification fallback text: the message header.
fn fallback_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .find_map(|block| match block {
            Block::Header { text } => Some(text.as_str().to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

impl SlackClient {
    pub fn new() -> Self {
        Self::new_with_recording(None)
    }

    pub fn new_with_recording(recording_logger: Option<RecordingLogger>) -> Self {
        Self {
            client: create_client(recording_logger, ServiceType::Slack),
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        method: &str,
        body: &T,
    ) -> Result<String, GateError> {
        let url = format!("{}/{}", self.base_url, method);
        let payload = serde_json::to_string(body)
            .map_err(|e| GateError::Internal(format!("failed to encode {}: {}", method, e)))?;
        let mut request = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(payload);
        if let Some(cid) = correlation_id {
            request = request.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GateError::upstream(SERVICE, None, e.to_string()))?;
        read_body(response).await
    }
}

impl Default for SlackClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, GateError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GateError::upstream(SERVICE, Some(status.as_u16()), e.to_string()))?;
    if !status.is_success() {
        error!("Slack API error: {} - {}", status, text);
        return Err(GateError::upstream(SERVICE, Some(status.as_u16()), text));
    }
    Ok(text)
}

fn parse_ok<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, GateError> {
    serde_json::from_str(text)
        .map_err(|e| GateError::upstream(SERVICE, Some(200), format!("{}: {}", e, text)))
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn post_message(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        channel: &str,
        blocks: &[Block],
    ) -> Result<MessageRef, GateError> {
        info!("Posting deployment message to {}", channel);
        let body = PostMessageRequest {
            channel,
            text: fallback_text(blocks),
            blocks,
        };
        let text = self
            .call(correlation_id, token, "chat.postMessage", &body)
            .await?;
        let response: MessageResponse = parse_ok(&text)?;

        match (response.ok, response.ts) {
            (true, Some(ts)) => Ok(MessageRef {
                channel: response.channel.unwrap_or_else(|| channel.to_string()),
                ts,
            }),
            _ => {
                error!("chat.postMessage was not ok: {}", text);
                Err(GateError::upstream(SERVICE, Some(200), text))
            }
        }
    }

    async fn update_message(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        message: &MessageRef,
        blocks: &[Block],
    ) -> Result<(), GateError> {
        info!("Updating message {} in {}", message.ts, message.channel);
        let body = UpdateMessageRequest {
            channel: &message.channel,
            ts: &message.ts,
            text: fallback_text(blocks),
            blocks,
        };
        let text = self
            .call(correlation_id, token, "chat.update", &body)
            .await?;
        let response: MessageResponse = parse_ok(&text)?;
        if !response.ok {
            error!("chat.update was not ok: {}", text);
            return Err(GateError::upstream(SERVICE, Some(200), text));
        }
        Ok(())
    }

    async fn get_user_profile(
        &self,
        correlation_id: Option<&str>,
        token: &str,
        user_id: &str,
    ) -> Result<Option<UserProfile>, GateError> {
        let url = format!("{}/users.profile.get?user={}", self.base_url, user_id);
        let mut request = self.client.get(&url).bearer_auth(token);
        if let Some(cid) = correlation_id {
            request = request.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GateError::upstream(SERVICE, None, e.to_string()))?;
        let text = read_body(response).await?;
        let response: ProfileResponse = parse_ok(&text)?;

        match (response.ok, response.profile) {
            (true, Some(profile)) => Ok(Some(UserProfile {
                name: profile.real_name,
                avatar_url: profile.image_24,
                email: profile.email.filter(|e| !e.is_empty()),
            })),
            _ => {
                warn!("users.profile.get returned no profile for {}", user_id);
                Ok(None)
            }
        }
    }
}

pub(crate) fn create_client(
    recording_logger: Option<RecordingLogger>,
    service_type: ServiceType,
) -> ClientWithMiddleware {
    use reqwest_middleware::ClientBuilder;

    let client = Client::builder()
        .user_agent(concat!("shipgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        });

    let mut builder = ClientBuilder::new(client);
    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger, service_type));
    }
    builder.build()
}
