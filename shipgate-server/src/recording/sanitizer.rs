use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;

const REDACTED: &str = "[REDACTED]";

/// Headers whose values never reach the recording log.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-hub-signature-256",
    "x-slack-signature",
];

const SENSITIVE_KEYS: &[&str] = &[
    "token",
    "secret",
    "password",
    "email",
    "response_url",
    "trigger_id",
];

pub struct Sanitizer;

impl Sanitizer {
    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let value = if SENSITIVE_HEADERS.contains(&key.to_lowercase().as_str()) {
                    REDACTED.to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        let val = if SENSITIVE_KEYS.contains(&key.as_str()) {
                            Value::String(REDACTED.to_string())
                        } else {
                            Self::sanitize_json(val)
                        };
                        (key.clone(), val)
                    })
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }

    /// Sanitize a request body: JSON as-is, form bodies field by field.
    ///
    /// Slack nests a JSON document inside the `payload` form field; such
    /// fields are decoded and sanitized as JSON.
    pub fn sanitize_body(body: &[u8]) -> Value {
        if let Ok(json) = serde_json::from_slice::<Value>(body) {
            return Self::sanitize_json(&json);
        }
        let Ok(text) = std::str::from_utf8(body) else {
            return Value::String(format!("[BINARY_BODY_{}b]", body.len()));
        };
        let Ok(url) = Url::parse(&format!("http://localhost/?{}", text)) else {
            return Value::Null;
        };

        let fields = url
            .query_pairs()
            .map(|(key, value)| {
                let value = match serde_json::from_str::<Value>(&value) {
                    Ok(json @ Value::Object(_)) => json,
                    _ => Value::String(value.into_owned()),
                };
                (key.into_owned(), value)
            })
            .collect();
        Self::sanitize_json(&Value::Object(fields))
    }
}
