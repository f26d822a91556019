//! Runs one event through the state machine for its (repository, environment) pair.

use shipgate_core::{DeploymentRecord, PromotionChain};
use tracing::info;

use super::event::Event;
use super::interpreter::{execute_effects, InterpreterContext};
use super::transition::{transition, Snapshot, TransitionResult};
use crate::error::GateError;

/// Load the pair's state, apply `event` and execute the resulting effects.
///
/// Returns the record as stored afterwards, or `None` when the event changed
/// nothing. Reads and writes are not conditional: two events for the same
/// pair racing each other resolve as last writer wins.
pub async fn process_event(
    ctx: &InterpreterContext,
    chain: &PromotionChain,
    event: Event,
) -> Result<Option<DeploymentRecord>, GateError> {
    let key = event.key();
    let latest = ctx.records.get_latest(&key).await?;
    let approvers = ctx.records.get_approvers().await?;

    info!(
        "Processing event {} for {} (latest deployment {:?})",
        event.log_summary(),
        key,
        latest.as_ref().map(|record| record.deployment_id)
    );

    let TransitionResult { record, effects } = transition(
        Snapshot {
            latest: latest.as_ref(),
            approvers: approvers.as_ref(),
            chain,
        },
        event,
    )?;

    if !effects.is_empty() {
        info!("Executing {} effects for {}", effects.len(), key);
    }
    let published = execute_effects(ctx, effects).await?;

    Ok(published.or(record))
}
