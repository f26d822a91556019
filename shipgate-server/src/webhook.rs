//! GitHub `deployment_status` webhook.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use shipgate_core::{normalize, Normalized};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::GateError;
use crate::recording::{inbound_event, CorrelationId, EventType};
use crate::state_machine::{process_event, Event};
use crate::AppState;

/// Upper bound on buffered webhook bodies.
pub(crate) const MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
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

    mac.update(payload);

    // Constant-time comparison.
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.github_webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if let Some(logger) = &state.recording_logger {
        logger.record(inbound_event(
            &correlation_id,
            EventType::GitHubWebhookReceived,
            "github_webhook",
            &parts.headers,
            &bytes,
        ));
    }

    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, GateError> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone());

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|e| GateError::BadRequest(format!("unreadable body: {}", e)))?;

    let event = match normalize(&bytes, &state.deploy_workflows) {
        Normalized::Event(event) => event,
        Normalized::Ignored(reason) => {
            info!("Ignoring webhook: {}", reason);
            return Ok(Json(WebhookResponse {
                message: format!("ignored: {}", reason),
            }));
        }
    };

    info!(
        "Deployment {} of {}/{} to {}: {}",
        event.deployment_id, event.owner, event.repository, event.environment, event.status
    );
    let summary = format!(
        "deployment {} to {} is {}",
        event.deployment_id, event.environment, event.status
    );

    let ctx = state.interpreter(correlation_id).await?;
    let record = process_event(&ctx, &state.chain, Event::StatusReported(event)).await?;

    let message = match record {
        Some(_) => summary,
        None => format!("{} (unchanged)", summary),
    };
    Ok(Json(WebhookResponse { message }))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/github/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
