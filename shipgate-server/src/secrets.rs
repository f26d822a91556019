//! Platform credentials.
//!
//! Tokens are fetched once per inbound request so that a rotated secret is
//! picked up without a restart.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GateError;

#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "SLACK_TOKEN")]
    pub chat_token: String,
    #[serde(rename = "GITHUB_TOKEN")]
    pub ci_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("chat_token", &"[REDACTED]")
            .field("ci_token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn fetch(&self) -> Result<Credentials, GateError>;
}

/// Fixed credentials, read from the environment at startup.
pub struct StaticSecrets {
    credentials: Credentials,
}

impl StaticSecrets {
    pub fn new(chat_token: impl Into<String>, ci_token: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                chat_token: chat_token.into(),
                ci_token: ci_token.into(),
            },
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn fetch(&self) -> Result<Credentials, GateError> {
        Ok(self.credentials.clone())
    }
}

/// A JSON document `{"SLACK_TOKEN": .., "GITHUB_TOKEN": ..}` re-read on every fetch.
pub struct FileSecrets {
    path: PathBuf,
}

impl FileSecrets {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretProvider for FileSecrets {
    async fn fetch(&self) -> Result<Credentials, GateError> {
        let contents = tokio::fs::read(&self.path).await.map_err(|e| {
            GateError::Internal(format!(
                "failed to read secrets file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_slice(&contents).map_err(|e| {
            GateError::Internal(format!(
                "secrets file {} is not a valid credentials document: {}",
                self.path.display(),
                e
            ))
        })
    }
}
