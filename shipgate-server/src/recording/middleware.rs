use super::sanitizer::Sanitizer;
use super::types::{CorrelationId, CORRELATION_ID_HEADER};
use super::{Direction, EventType, RecordedEvent, RecordingLogger, ServiceType};
use axum::http::{self, HeaderMap, HeaderValue};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use uuid::Uuid;

const MAX_RECORDED_BODY: usize = 10_000;

/// Records every outbound platform call made through the client it wraps.
pub struct RecordingMiddleware {
    logger: RecordingLogger,
    service_type: ServiceType,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger, service_type: ServiceType) -> Self {
        Self {
            logger,
            service_type,
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| extensions.get::<CorrelationId>().map(|id| id.0.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        let request_data = RequestData {
            method: req.method().to_string(),
            url: req.url().to_string(),
            headers: Sanitizer::sanitize_headers(&headers_to_hashmap(req.headers())),
            body: body_summary(&req),
        };
        let operation = format!("{} {}", request_data.method, req.url().path());
        self.record(
            &correlation_id,
            Direction::Request,
            operation,
            serde_json::to_value(&request_data).unwrap_or(serde_json::Value::Null),
        );

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => {
                let response_data = ResponseData {
                    status_code: resp.status().as_u16(),
                    headers: Sanitizer::sanitize_headers(&headers_to_hashmap(resp.headers())),
                    body_size: resp.content_length().unwrap_or(0),
                };
                self.record(
                    &correlation_id,
                    Direction::Response,
                    format!("response_{}", response_data.status_code),
                    serde_json::to_value(&response_data).unwrap_or(serde_json::Value::Null),
                );
            }
            Err(err) => self.record(
                &correlation_id,
                Direction::Response,
                "error".to_string(),
                serde_json::json!({ "error": err.to_string() }),
            ),
        }

        response
    }
}

impl RecordingMiddleware {
    fn record(
        &self,
        correlation_id: &str,
        direction: Direction,
        operation: String,
        data: serde_json::Value,
    ) {
        self.logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type: self.service_type.event_type(),
            direction,
            operation,
            data,
            metadata: HashMap::new(),
        });
    }
}

fn body_summary(request: &Request) -> serde_json::Value {
    let Some(body) = request.body() else {
        return serde_json::Value::String("[NO_BODY]".to_string());
    };
    match body.as_bytes() {
        Some(bytes) if bytes.len() > MAX_RECORDED_BODY => {
            serde_json::Value::String(format!("[LARGE_BODY_{}b]", bytes.len()))
        }
        Some(bytes) => Sanitizer::sanitize_body(bytes),
        None => serde_json::Value::String("[STREAM_BODY]".to_string()),
    }
}

/// An inbound callback, with sanitized headers and body.
pub fn inbound_event(
    correlation_id: &CorrelationId,
    event_type: EventType,
    operation: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> RecordedEvent {
    RecordedEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        correlation_id: correlation_id.0.clone(),
        event_type,
        direction: Direction::Request,
        operation: operation.to_string(),
        data: serde_json::json!({
            "headers": Sanitizer::sanitize_headers(&headers_to_hashmap(headers)),
            "body": Sanitizer::sanitize_body(body),
        }),
        metadata: HashMap::new(),
    }
}

pub fn headers_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

#[derive(Debug, serde::Serialize)]
struct RequestData {
    method: String,
    url: String,
    headers: HashMap<String, String>,
    body: serde_json::Value,
}

#[derive(Debug, serde::Serialize)]
struct ResponseData {
    status_code: u16,
    headers: HashMap<String, String>,
    body_size: u64,
}
