//! Errors surfaced by the HTTP entrypoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::RepositoryError;

#[derive(Debug, Error)]
pub enum GateError {
    /// Approver registry, deployment record or CI workflow is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request does not fit the current record (already resolved, stale token, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A chat or CI platform call failed or answered with a non-ok response.
    #[error("{service} call failed ({})", describe_upstream(.status, .body))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        body: String,
    },

    #[error(transparent)]
    Storage(#[from] RepositoryError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn describe_upstream(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(status) => format!("status {}: {}", status, body),
        None => format!("no response: {}", body),
    }
}

impl GateError {
    pub fn upstream(service: &'static str, status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = match &self {
            Self::Upstream {
                service,
                status: upstream_status,
                body,
            } => json!({
                "error": self.to_string(),
                "upstream": {
                    "service": service,
                    "status": upstream_status,
                    "body": serde_json::from_str::<serde_json::Value>(body)
                        .unwrap_or_else(|_| serde_json::Value::String(body.clone())),
                }
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
