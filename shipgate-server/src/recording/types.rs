use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One line of the recording log.
///
/// An inbound callback and every platform call it causes share a
/// `correlation_id`, so a session can be replayed per request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordedEvent {
    /// RFC 3339.
    pub timestamp: String,
    pub correlation_id: String,
    pub event_type: EventType,
    pub direction: Direction,
    /// `"github_webhook"`, `"/slack/interaction"`, `"POST /api/chat.update"`, ...
    pub operation: String,
    /// Sanitized headers and body.
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum EventType {
    GitHubWebhookReceived,
    SlackRequestReceived,
    SlackApiCall,
    GitHubApiCall,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum ServiceType {
    Slack,
    GitHub,
}

impl ServiceType {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Slack => EventType::SlackApiCall,
            Self::GitHub => EventType::GitHubApiCall,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
