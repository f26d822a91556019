//! Events fed into the approval state machine.

use shipgate_core::{Block, DeploymentEvent, MessageRef, RecordKey, StateToken, Verdict, Voter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A deployment status arrived from the CI platform.
    StatusReported(DeploymentEvent),
    /// Someone clicked an affordance on a deployment message.
    VoteCast(Vote),
}

/// A click on the approve or reject affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Record the message belongs to, from its state token or phrase anchors.
    pub key: RecordKey,
    pub voter: Voter,
    pub verdict: Verdict,
    /// Absent for messages rendered without tokens.
    pub token: Option<StateToken>,
    /// Blocks echoed back by the chat platform with the callback.
    pub blocks: Vec<Block>,
    pub message: MessageRef,
}

impl Event {
    pub fn key(&self) -> RecordKey {
        match self {
            Self::StatusReported(event) => RecordKey::new(&event.repository, &event.environment),
            Self::VoteCast(vote) => vote.key.clone(),
        }
    }

    /// Short description for logs.
    pub fn log_summary(&self) -> String {
        match self {
            Self::StatusReported(event) => format!(
                "StatusReported(deployment {} {})",
                event.deployment_id, event.status
            ),
            Self::VoteCast(vote) => format!("VoteCast({} by {})", vote.verdict, vote.voter.id),
        }
    }
}
