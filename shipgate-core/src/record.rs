//! Deployment records: the latest known status of one (repository, environment) pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::blocks::{Block, Verdict};
use crate::event::DeploymentEvent;
use crate::key::RecordKey;

/// GitHub deployment status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Queued,
    InProgress,
    Success,
    Failure,
    Error,
    Inactive,
}

impl DeploymentStatus {
    pub fn parse(state: &str) -> Option<Self> {
        match state {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "in_progress" => Some(Self::InProgress),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "error" => Some(Self::Error),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record stands in the approval workflow.
///
/// A single enum replaces a pair of `approved`/`rejected` flags, so a record
/// can never be both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalState {
    /// No promotion is on offer (deployment not successful, or last environment).
    AwaitingStatus,
    /// Promotion affordances are posted and votes are being collected.
    AwaitingApproval,
    Approved {
        authority: String,
    },
    Rejected {
        authority: String,
        /// Set when the rejection was automatic because a newer deployment arrived.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_by: Option<u64>,
    },
}

impl ApprovalState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Approved { .. } | Self::Rejected { .. })
    }

    pub fn resolved(verdict: Verdict, authority: impl Into<String>) -> Self {
        match verdict {
            Verdict::Approved => Self::Approved {
                authority: authority.into(),
            },
            Verdict::Rejected => Self::Rejected {
                authority: authority.into(),
                superseded_by: None,
            },
        }
    }

    pub fn authority(&self) -> Option<&str> {
        match self {
            Self::Approved { authority } | Self::Rejected { authority, .. } => Some(authority),
            _ => None,
        }
    }
}

/// Reference to a posted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub repository: String,
    pub owner: String,
    pub environment: String,
    pub deployment_id: u64,
    pub status: DeploymentStatus,
    pub branch: String,
    pub sha: String,
    pub author: String,
    #[serde(default)]
    pub target_url: String,
    pub created_at: String,
    pub updated_at: String,
    pub approval: ApprovalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRef>,
    /// The block sequence last rendered for this record.
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl DeploymentRecord {
    /// A fresh record for an event, before any message has been posted.
    pub fn from_event(event: &DeploymentEvent) -> Self {
        Self {
            repository: event.repository.clone(),
            owner: event.owner.clone(),
            environment: event.environment.clone(),
            deployment_id: event.deployment_id,
            status: event.status,
            branch: event.branch.clone(),
            sha: event.sha.clone(),
            author: event.actor.clone(),
            target_url: event.target_url.clone(),
            created_at: event.created_at.clone(),
            updated_at: event.updated_at.clone(),
            approval: ApprovalState::AwaitingStatus,
            message: None,
            blocks: Vec::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.repository, &self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            DeploymentStatus::Pending,
            DeploymentStatus::Queued,
            DeploymentStatus::InProgress,
            DeploymentStatus::Success,
            DeploymentStatus::Failure,
            DeploymentStatus::Error,
            DeploymentStatus::Inactive,
        ] {
            assert_eq!(DeploymentStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_approval_state_serialization() {
        let state = ApprovalState::Rejected {
            authority: "subsequent deployment".to_string(),
            superseded_by: Some(7),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"state": "rejected", "authority": "subsequent deployment", "superseded_by": 7})
        );
        assert!(state.is_resolved());
        assert!(!ApprovalState::AwaitingApproval.is_resolved());
    }
}
