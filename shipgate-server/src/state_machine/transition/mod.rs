//! Pure state transition function.
//!
//! Given the latest record of a pair, the approver registry and an event,
//! returns the record to publish and the effects to execute. Nothing here
//! performs I/O.
//!
//! - `status`: deployment status reports
//! - `vote`: affordance clicks

mod status;
mod vote;

use shipgate_core::{ApproverRegistry, DeploymentRecord, PromotionChain};
use thiserror::Error;

use super::effect::Effect;
use super::event::Event;
use crate::error::GateError;

/// Everything a transition may read.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub latest: Option<&'a DeploymentRecord>,
    pub approvers: Option<&'a ApproverRegistry>,
    pub chain: &'a PromotionChain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The latest record after the transition; `None` when nothing changed.
    pub record: Option<DeploymentRecord>,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(record: DeploymentRecord, effects: Vec<Effect>) -> Self {
        Self {
            record: Some(record),
            effects,
        }
    }

    pub fn no_change(effects: Vec<Effect>) -> Self {
        Self {
            record: None,
            effects,
        }
    }
}

/// Why an event could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

impl From<Rejection> for GateError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NotFound(message) => GateError::NotFound(message),
            Rejection::Conflict(message) => GateError::Conflict(message),
        }
    }
}

pub fn transition(snapshot: Snapshot<'_>, event: Event) -> Result<TransitionResult, Rejection> {
    match event {
        Event::StatusReported(event) => status::on_status(snapshot, event),
        Event::VoteCast(vote) => vote::on_vote(snapshot, vote),
    }
}
