//! Slack entrypoints: request signing and the interactive (button) callback.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Extension, Form, Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use shipgate_core::{recover_target, Block, MessageRef, RecordKey, StateToken, Verdict, Voter};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::approvers;
use crate::error::GateError;
use crate::recording::{inbound_event, CorrelationId, EventType};
use crate::state_machine::{process_event, Event, Vote};
use crate::webhook::MAX_BODY_SIZE;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_VERSION: &str = "v0";

/// Maximum age of a signed request, in either direction to allow for clock skew.
const TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

fn is_timestamp_within_tolerance(timestamp_secs: i64, now_secs: i64) -> bool {
    (now_secs - timestamp_secs).abs() <= TIMESTAMP_TOLERANCE_SECONDS
}

/// Verify `v0=<hex hmac of "v0:{timestamp}:{body}">`.
fn verify_slack_signature(secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
    else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);

    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_slack_request(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    };
    let timestamp = header("x-slack-request-timestamp").ok_or(StatusCode::UNAUTHORIZED)?;
    let signature = header("x-slack-signature").ok_or(StatusCode::UNAUTHORIZED)?;

    let timestamp_secs: i64 = timestamp.parse().map_err(|_| {
        warn!("Unparseable Slack request timestamp: {}", timestamp);
        StatusCode::UNAUTHORIZED
    })?;
    if !is_timestamp_within_tolerance(timestamp_secs, chrono::Utc::now().timestamp()) {
        warn!("Slack request timestamp {} outside tolerance", timestamp_secs);
        return Err(StatusCode::UNAUTHORIZED);
    }

    if !verify_slack_signature(&state.slack_signing_secret, &timestamp, &bytes, &signature) {
        error!("Invalid Slack request signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if let Some(logger) = &state.recording_logger {
        logger.record(inbound_event(
            &correlation_id,
            EventType::SlackRequestReceived,
            parts.uri.path(),
            &parts.headers,
            &bytes,
        ));
    }

    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

#[derive(Debug, Deserialize)]
pub struct InteractionForm {
    pub payload: String,
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    user: SlackUser,
    #[serde(default)]
    actions: Vec<Action>,
    channel: Option<Channel>,
    message: Option<EchoedMessage>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Action {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    block_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EchoedMessage {
    ts: String,
    #[serde(default)]
    blocks: Vec<Block>,
}

/// What a callback asks for, before the voter's profile is known.
#[derive(Debug, PartialEq, Eq)]
struct Click {
    key: RecordKey,
    verdict: Verdict,
    token: Option<StateToken>,
    message: MessageRef,
    blocks: Vec<Block>,
}

fn parse_click(payload: InteractionPayload) -> Result<(SlackUser, Click), GateError> {
    let action = payload
        .actions
        .into_iter()
        .next()
        .ok_or_else(|| GateError::BadRequest("callback carries no action".to_string()))?;
    let verdict = action
        .value
        .as_deref()
        .and_then(Verdict::from_value)
        .ok_or_else(|| GateError::BadRequest("action is not approve or reject".to_string()))?;
    let message = payload
        .message
        .ok_or_else(|| GateError::BadRequest("callback carries no message".to_string()))?;
    let channel = payload
        .channel
        .ok_or_else(|| GateError::BadRequest("callback carries no channel".to_string()))?;

    let token = action.block_id.as_deref().and_then(StateToken::parse);
    if let Some(token) = &token {
        if token.verdict != verdict {
            return Err(GateError::BadRequest(format!(
                "action value '{}' does not match its affordance '{}'",
                verdict.as_value(),
                token.verdict.as_value()
            )));
        }
    }
    let key = match &token {
        Some(token) => RecordKey::new(&token.repository, &token.environment),
        None => {
            let target = recover_target(&message.blocks).ok_or_else(|| {
                GateError::BadRequest("message does not name a deployment".to_string())
            })?;
            RecordKey::new(target.repository, target.environment)
        }
    };

    let click = Click {
        key,
        verdict,
        token,
        message: MessageRef {
            channel: channel.id,
            ts: message.ts,
        },
        blocks: message.blocks,
    };
    Ok((payload.user, click))
}

pub async fn interaction_handler(
    State(state): State<Arc<AppState>>,
    Extension(correlation_id): Extension<CorrelationId>,
    Form(form): Form<InteractionForm>,
) -> Result<StatusCode, GateError> {
    let payload: InteractionPayload = serde_json::from_str(&form.payload)
        .map_err(|e| GateError::BadRequest(format!("malformed interaction payload: {}", e)))?;
    let (user, click) = parse_click(payload)?;

    let ctx = state.interpreter(Some(correlation_id.0)).await?;
    let profile = ctx
        .chat
        .get_user_profile(
            ctx.correlation_id.as_deref(),
            &ctx.credentials.chat_token,
            &user.id,
        )
        .await?
        .ok_or_else(|| {
            GateError::upstream("slack", Some(200), format!("no profile for user {}", user.id))
        })?;

    let fallback_name = user.name.or(user.username).unwrap_or_else(|| user.id.clone());
    let voter = Voter {
        id: user.id,
        name: if profile.name.is_empty() {
            fallback_name
        } else {
            profile.name
        },
        avatar_url: profile.avatar_url,
    };

    info!(
        "{} voted {} on {} ({})",
        voter.id, click.verdict, click.key, click.message.ts
    );
    process_event(
        &ctx,
        &state.chain,
        Event::VoteCast(Vote {
            key: click.key,
            voter,
            verdict: click.verdict,
            token: click.token,
            blocks: click.blocks,
            message: click.message,
        }),
    )
    .await?;

    Ok(StatusCode::OK)
}

pub fn slack_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/slack/interaction", post(interaction_handler))
        .route("/slack/approvers/add", post(approvers::add_handler))
        .route("/slack/approvers/remove", post(approvers::remove_handler))
        .route("/slack/approvers/list", post(approvers::list_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_slack_request,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shipgate_core::anchors::{field_text, header_text, BRANCH_LABEL, REPO_LABEL};
    use shipgate_core::Text;

    fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("v0:{}:", timestamp).as_bytes());
        mac.update(body);
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_slack_signature() {
        let body = b"payload=%7B%7D";
        let signature = sign("signing", "1700000000", body);
        assert!(verify_slack_signature("signing", "1700000000", body, &signature));
    }

    #[test]
    fn test_signature_covers_timestamp() {
        let body = b"payload=%7B%7D";
        let signature = sign("signing", "1700000000", body);
        assert!(!verify_slack_signature("signing", "1700000001", body, &signature));
        assert!(!verify_slack_signature("other", "1700000000", body, &signature));
        assert!(!verify_slack_signature(
            "signing",
            "1700000000",
            body,
            &signature.replace("v0=", "v1=")
        ));
    }

    #[test]
    fn test_timestamp_tolerance() {
        let now = 1_700_000_000;
        assert!(is_timestamp_within_tolerance(now, now));
        assert!(is_timestamp_within_tolerance(now - 300, now));
        assert!(is_timestamp_within_tolerance(now + 300, now));
        assert!(!is_timestamp_within_tolerance(now - 301, now));
        assert!(!is_timestamp_within_tolerance(now + 301, now));
    }

    fn payload(block_id: &str, blocks: serde_json::Value) -> InteractionPayload {
        serde_json::from_value(json!({
            "type": "block_actions",
            "user": {"id": "U1", "username": "ada", "name": "ada"},
            "channel": {"id": "C1", "name": "deploys"},
            "message": {"ts": "1700000000.000100", "blocks": blocks},
            "actions": [{
                "action_id": "promote-approved",
                "block_id": block_id,
                "value": "approved",
                "type": "button"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_click_resolved_through_token() {
        let (user, click) = parse_click(payload("gate|approved|42|blog|test", json!([]))).unwrap();
        assert_eq!(user.id, "U1");
        assert_eq!(click.key, RecordKey::new("blog", "test"));
        assert_eq!(click.verdict, Verdict::Approved);
        assert_eq!(click.token.unwrap().deployment_id, 42);
        assert_eq!(
            click.message,
            MessageRef {
                channel: "C1".to_string(),
                ts: "1700000000.000100".to_string()
            }
        );
    }

    #[test]
    fn test_click_value_must_match_token() {
        let result = parse_click(payload("gate|rejected|42|blog|test", json!([])));
        assert!(matches!(result, Err(GateError::BadRequest(_))));
    }

    #[test]
    fn test_click_without_token_uses_anchors() {
        let blocks = vec![
            Block::header(header_text("blog", "test", "octocat", "success")),
            Block::fields(vec![
                Text::mrkdwn(field_text(REPO_LABEL, "blog")),
                Text::mrkdwn(field_text(BRANCH_LABEL, "main")),
            ]),
        ];
        let (_, click) =
            parse_click(payload("xYz12", serde_json::to_value(&blocks).unwrap())).unwrap();
        assert_eq!(click.key, RecordKey::new("blog", "test"));
        assert_eq!(click.token, None);
        assert_eq!(click.blocks, blocks);
    }

    #[test]
    fn test_click_on_unrelated_message_is_rejected() {
        let result = parse_click(payload("xYz12", json!([])));
        assert!(matches!(result, Err(GateError::BadRequest(_))));
    }
}
