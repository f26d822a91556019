//! Slash commands maintaining the approver registry.
//!
//! Every command answers with the registry as it stands afterwards, so a
//! refused request is visible as an unchanged listing.

use std::sync::Arc;

use axum::{extract::State, response::Json, Extension, Form};
use serde::{Deserialize, Serialize};
use shipgate_core::{
    parse_mention, AddOutcome, Approver, ApproverRegistry, Block, RemoveOutcome, Text,
};
use tracing::{info, warn};

use crate::error::GateError;
use crate::recording::CorrelationId;
use crate::AppState;

/// The fields of a slash-command request that are used.
#[derive(Debug, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub text: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub blocks: Vec<Block>,
}

fn listing(registry: &ApproverRegistry) -> Json<CommandResponse> {
    let approvers: Vec<&Approver> = registry.list().collect();
    let json = serde_json::to_string_pretty(&approvers).unwrap_or_else(|_| "[]".to_string());
    Json(CommandResponse {
        blocks: vec![Block::Section {
            block_id: None,
            text: Some(Text::mrkdwn(format!("```\n{}```", json))),
            fields: Vec::new(),
            accessory: None,
        }],
    })
}

fn mentioned(command: &SlashCommand) -> Result<&str, GateError> {
    parse_mention(&command.text).ok_or_else(|| {
        GateError::BadRequest(format!(
            "expected a user mention such as <@U123|name>, got '{}'",
            command.text
        ))
    })
}

pub async fn add_handler(
    State(state): State<Arc<AppState>>,
    Extension(correlation_id): Extension<CorrelationId>,
    Form(command): Form<SlashCommand>,
) -> Result<Json<CommandResponse>, GateError> {
    let target = mentioned(&command)?;
    let mut registry = state.records.get_approvers().await?.unwrap_or_default();

    if !registry.may_add(&command.user_id) {
        warn!(
            "{} tried to add {} without being an approver",
            command.user_id, target
        );
        return Ok(listing(&registry));
    }

    let credentials = state.secrets.fetch().await?;
    let Some(profile) = state
        .chat
        .get_user_profile(Some(&correlation_id.0), &credentials.chat_token, target)
        .await?
    else {
        warn!("No profile for {}, registry unchanged", target);
        return Ok(listing(&registry));
    };

    let approver = Approver {
        id: target.to_string(),
        name: profile.name,
        image: profile.avatar_url,
        email: profile.email,
    };
    match registry.add(&command.user_id, approver) {
        AddOutcome::Added => {
            state.records.put_approvers(&registry).await?;
            info!("{} added {} as an approver", command.user_id, target);
        }
        AddOutcome::AlreadyApprover => info!("{} is already an approver", target),
        AddOutcome::NotAuthorized => warn!("{} may not add approvers", command.user_id),
    }

    Ok(listing(&registry))
}

pub async fn remove_handler(
    State(state): State<Arc<AppState>>,
    Form(command): Form<SlashCommand>,
) -> Result<Json<CommandResponse>, GateError> {
    let target = mentioned(&command)?;
    let mut registry = state.records.get_approvers().await?.unwrap_or_default();

    match registry.remove(&command.user_id, target) {
        RemoveOutcome::Removed => {
            state.records.put_approvers(&registry).await?;
            info!("{} removed {} from the approvers", command.user_id, target);
            if registry.is_empty() {
                warn!("Approver registry is now empty; anyone may add the next approver");
            }
        }
        RemoveOutcome::NotApprover => info!("{} is not an approver", target),
        RemoveOutcome::NotAuthorized => warn!(
            "{} tried to remove {} without being an approver",
            command.user_id, target
        ),
    }

    Ok(listing(&registry))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandResponse>, GateError> {
    let registry = state.records.get_approvers().await?.unwrap_or_default();
    Ok(listing(&registry))
}
