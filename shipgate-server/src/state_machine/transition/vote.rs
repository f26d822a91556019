//! Vote transitions.
//!
//! A vote is binding when the next environment is not gated or the voter is
//! a registered approver. Binding votes resolve the record; other votes are
//! only tallied.

use shipgate_core::builder::{record_vote, resolve};
use shipgate_core::{ApprovalState, BlockError, Verdict};

use super::{Rejection, Snapshot, TransitionResult};
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::Vote;

fn conflict(error: BlockError) -> Rejection {
    Rejection::Conflict(error.to_string())
}

pub(super) fn on_vote(snapshot: Snapshot<'_>, vote: Vote) -> Result<TransitionResult, Rejection> {
    let Some(current) = snapshot.latest else {
        return Err(Rejection::NotFound(format!(
            "no deployment record for {}",
            vote.key
        )));
    };

    if let Some(authority) = current.approval.authority() {
        return Err(Rejection::Conflict(format!(
            "deployment {} was already resolved by {}",
            current.deployment_id, authority
        )));
    }
    if let Some(token) = &vote.token {
        if token.deployment_id != current.deployment_id {
            return Err(Rejection::Conflict(format!(
                "message is for deployment {} but the latest deployment is {}",
                token.deployment_id, current.deployment_id
            )));
        }
    }
    let next = match snapshot.chain.next_environment(&current.environment) {
        Some(next) if current.approval == ApprovalState::AwaitingApproval => next,
        _ => {
            return Err(Rejection::Conflict(format!(
                "deployment {} is not awaiting approval",
                current.deployment_id
            )))
        }
    };

    let binding = if snapshot.chain.requires_approval(next) {
        let registry = snapshot.approvers.ok_or_else(|| {
            Rejection::NotFound("approver registry has not been created".to_string())
        })?;
        registry.contains(&vote.voter.id)
    } else {
        true
    };

    let mut record = current.clone();
    let mut blocks = if record.blocks.is_empty() {
        vote.blocks
    } else {
        record.blocks.clone()
    };
    if record.message.is_none() {
        record.message = Some(vote.message);
    }

    let mut effects = Vec::new();
    if !binding {
        record_vote(&mut blocks, &vote.voter, vote.verdict).map_err(conflict)?;
        effects.push(Effect::log(
            LogLevel::Info,
            format!(
                "Non-binding {} vote from {} on deployment {}",
                vote.verdict.as_value(),
                vote.voter.id,
                record.deployment_id
            ),
        ));
        record.blocks = blocks;
        effects.push(Effect::Publish {
            record: record.clone(),
        });
        return Ok(TransitionResult::new(record, effects));
    }

    resolve(&mut blocks, vote.verdict, &vote.voter.name).map_err(conflict)?;
    record.approval = ApprovalState::resolved(vote.verdict, vote.voter.name.clone());
    record.blocks = blocks;
    effects.push(Effect::log(
        LogLevel::Info,
        format!(
            "{} {} promotion of deployment {} to {}",
            vote.voter.name, vote.verdict, record.deployment_id, next
        ),
    ));

    // Only the workflow lookup may run before the resolution is stored.
    let approved = vote.verdict == Verdict::Approved;
    if approved {
        effects.push(Effect::LocateWorkflow {
            owner: record.owner.clone(),
            repository: record.repository.clone(),
        });
    }
    effects.push(Effect::Store {
        record: record.clone(),
    });
    if approved {
        effects.push(Effect::Dispatch {
            owner: record.owner.clone(),
            repository: record.repository.clone(),
            branch: record.branch.clone(),
            environment: next.to_string(),
            binding: snapshot.chain.identity_binding(next).map(str::to_string),
        });
    }
    if let Some(message) = &record.message {
        effects.push(Effect::UpdateMessage {
            message: message.clone(),
            blocks: record.blocks.clone(),
        });
    }
    Ok(TransitionResult::new(record, effects))
}
