//! Deployment status transitions.

use shipgate_core::builder::{render, supersede};
use shipgate_core::{
    ApprovalState, ApproverRegistry, DeploymentEvent, DeploymentRecord, DeploymentStatus,
    PromotionChain,
};

use super::{Rejection, Snapshot, TransitionResult};
use crate::state_machine::effect::{Effect, LogLevel};

const SUPERSEDING_AUTHORITY: &str = "subsequent deployment";

pub(super) fn on_status(
    snapshot: Snapshot<'_>,
    event: DeploymentEvent,
) -> Result<TransitionResult, Rejection> {
    match snapshot.latest {
        Some(current) if current.deployment_id == event.deployment_id => {
            if current.status == event.status {
                return Ok(TransitionResult::no_change(vec![Effect::log(
                    LogLevel::Debug,
                    format!(
                        "Deployment {} already reported {}, ignoring",
                        event.deployment_id, event.status
                    ),
                )]));
            }

            let mut record = current.clone();
            record.status = event.status;
            record.updated_at = event.updated_at;
            if !event.target_url.is_empty() {
                record.target_url = event.target_url;
            }
            if !record.approval.is_resolved() {
                record.approval = offered_approval(snapshot.chain, &record);
            }
            record.blocks = render(
                &record,
                snapshot.chain,
                &roster(snapshot.chain, &record, snapshot.approvers)?,
            );

            let effects = vec![
                Effect::log(
                    LogLevel::Info,
                    format!(
                        "Deployment {} to {} is now {}",
                        record.deployment_id, record.environment, record.status
                    ),
                ),
                Effect::Publish {
                    record: record.clone(),
                },
            ];
            Ok(TransitionResult::new(record, effects))
        }
        previous => {
            let mut effects = previous
                .map(|old| retire(old, event.deployment_id, snapshot.chain))
                .unwrap_or_default();

            let mut record = DeploymentRecord::from_event(&event);
            record.approval = offered_approval(snapshot.chain, &record);
            record.blocks = render(
                &record,
                snapshot.chain,
                &roster(snapshot.chain, &record, snapshot.approvers)?,
            );

            effects.push(Effect::log(
                LogLevel::Info,
                format!(
                    "New deployment {} of {} to {}: {}",
                    record.deployment_id, record.repository, record.environment, record.status
                ),
            ));
            effects.push(Effect::Publish {
                record: record.clone(),
            });
            Ok(TransitionResult::new(record, effects))
        }
    }
}

/// Approval state for a record that has not been resolved yet.
fn offered_approval(chain: &PromotionChain, record: &DeploymentRecord) -> ApprovalState {
    let promotable = record.status == DeploymentStatus::Success
        && chain.next_environment(&record.environment).is_some();
    if promotable {
        ApprovalState::AwaitingApproval
    } else {
        ApprovalState::AwaitingStatus
    }
}

/// The registry to render, required only when the message shows the roster.
fn roster(
    chain: &PromotionChain,
    record: &DeploymentRecord,
    approvers: Option<&ApproverRegistry>,
) -> Result<ApproverRegistry, Rejection> {
    let shows_roster = record.approval == ApprovalState::AwaitingApproval
        && chain
            .next_environment(&record.environment)
            .is_some_and(|next| chain.requires_approval(next));
    match approvers {
        Some(registry) => Ok(registry.clone()),
        None if shows_roster => Err(Rejection::NotFound(
            "approver registry has not been created".to_string(),
        )),
        None => Ok(ApproverRegistry::new()),
    }
}

/// Move the current record to history because `superseded_by` replaced it.
///
/// An unresolved record is force-rejected and its message loses the
/// affordances; a resolved one is archived as it stands.
fn retire(old: &DeploymentRecord, superseded_by: u64, chain: &PromotionChain) -> Vec<Effect> {
    if old.approval.is_resolved() {
        return vec![Effect::Archive {
            record: old.clone(),
        }];
    }

    let mut old = old.clone();
    old.approval = ApprovalState::Rejected {
        authority: SUPERSEDING_AUTHORITY.to_string(),
        superseded_by: Some(superseded_by),
    };
    if old.blocks.is_empty() {
        old.blocks = render(&old, chain, &ApproverRegistry::new());
    }
    supersede(&mut old.blocks);

    let mut effects = vec![Effect::log(
        LogLevel::Info,
        format!(
            "Deployment {} superseded by {}",
            old.deployment_id, superseded_by
        ),
    )];
    if let Some(message) = &old.message {
        effects.push(Effect::UpdateMessage {
            message: message.clone(),
            blocks: old.blocks.clone(),
        });
    }
    effects.push(Effect::Archive { record: old });
    effects
}
