//! Effect interpreter that executes effects against real APIs.
//!
//! The interpreter is the boundary between the pure state machine and the
//! chat platform, the CI platform and the record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use shipgate_core::DeploymentRecord;
use tracing::{debug, error, info, warn};

use super::effect::{Effect, LogLevel};
use crate::error::GateError;
use crate::github::{CiPlatform, Workflow};
use crate::secrets::Credentials;
use crate::slack::ChatPlatform;
use crate::store::RecordStore;

/// Context needed by the interpreter to execute effects.
pub struct InterpreterContext {
    pub chat: Arc<dyn ChatPlatform>,
    pub ci: Arc<dyn CiPlatform>,
    pub records: RecordStore,
    pub credentials: Credentials,
    /// Channel new deployment messages are posted to.
    pub channel: String,
    /// Name of the workflow dispatched on approval.
    pub dispatch_workflow: String,
    /// Correlation ID for request tracing.
    pub correlation_id: Option<String>,
}

/// State carried from one effect to the next within a single run.
#[derive(Default)]
struct Run {
    /// Last record published or stored.
    latest: Option<DeploymentRecord>,
    /// Workflow found by `LocateWorkflow`, consumed by `Dispatch`.
    workflow: Option<Workflow>,
}

/// Execute effects in order, stopping at the first failure.
///
/// Returns the last record published or stored, with its message reference
/// filled in.
pub async fn execute_effects(
    ctx: &InterpreterContext,
    effects: Vec<Effect>,
) -> Result<Option<DeploymentRecord>, GateError> {
    let mut run = Run::default();

    for effect in effects {
        execute_effect(ctx, &mut run, effect)
            .await
            .inspect_err(|e| {
                error!("Effect execution failed: {}", e);
            })?;
    }

    Ok(run.latest)
}

async fn execute_effect(
    ctx: &InterpreterContext,
    run: &mut Run,
    effect: Effect,
) -> Result<(), GateError> {
    let cid = ctx.correlation_id.as_deref();

    match effect {
        Effect::UpdateMessage { message, blocks } => {
            ctx.chat
                .update_message(cid, &ctx.credentials.chat_token, &message, &blocks)
                .await?;
        }

        Effect::Publish { record } => {
            run.latest = Some(execute_publish(ctx, record).await?);
        }

        Effect::Store { record } => {
            ctx.records.put_latest(&record).await?;
            run.latest = Some(record);
        }

        Effect::Archive { record } => {
            ctx.records.archive(&record).await?;
        }

        Effect::LocateWorkflow { owner, repository } => {
            run.workflow = Some(locate_workflow(ctx, &owner, &repository).await?);
        }

        Effect::Dispatch {
            owner,
            repository,
            branch,
            environment,
            binding,
        } => {
            let workflow = match run.workflow.take() {
                Some(workflow) => workflow,
                None => locate_workflow(ctx, &owner, &repository).await?,
            };
            execute_dispatch(
                ctx,
                &workflow,
                &owner,
                &repository,
                &branch,
                &environment,
                binding,
            )
            .await?;
        }

        Effect::Log { level, message } => match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        },
    }

    Ok(())
}

/// Post or update the record's message, then store the record as latest.
async fn execute_publish(
    ctx: &InterpreterContext,
    mut record: DeploymentRecord,
) -> Result<DeploymentRecord, GateError> {
    let cid = ctx.correlation_id.as_deref();
    let token = &ctx.credentials.chat_token;

    match &record.message {
        Some(message) => {
            ctx.chat
                .update_message(cid, token, message, &record.blocks)
                .await?;
        }
        None => {
            let message = ctx
                .chat
                .post_message(cid, token, &ctx.channel, &record.blocks)
                .await?;
            record.message = Some(message);
        }
    }

    ctx.records.put_latest(&record).await?;
    Ok(record)
}

async fn locate_workflow(
    ctx: &InterpreterContext,
    owner: &str,
    repository: &str,
) -> Result<Workflow, GateError> {
    let workflows = ctx
        .ci
        .list_workflows(
            ctx.correlation_id.as_deref(),
            &ctx.credentials.ci_token,
            owner,
            repository,
        )
        .await?;
    workflows
        .into_iter()
        .find(|workflow| workflow.name == ctx.dispatch_workflow)
        .ok_or_else(|| {
            GateError::NotFound(format!(
                "workflow '{}' not found in {}/{}",
                ctx.dispatch_workflow, owner, repository
            ))
        })
}

/// Dispatch `workflow` for `branch` with the target environment as input.
async fn execute_dispatch(
    ctx: &InterpreterContext,
    workflow: &Workflow,
    owner: &str,
    repository: &str,
    branch: &str,
    environment: &str,
    binding: Option<String>,
) -> Result<(), GateError> {
    let mut inputs = BTreeMap::from([("deploy_env".to_string(), environment.to_string())]);
    if let Some(binding) = binding {
        inputs.insert("oidc_role".to_string(), binding);
    }

    info!(
        "Promoting {}/{}@{} to {} via workflow {}",
        owner, repository, branch, environment, workflow.id
    );
    ctx.ci
        .dispatch_workflow(
            ctx.correlation_id.as_deref(),
            &ctx.credentials.ci_token,
            owner,
            repository,
            workflow.id,
            branch,
            &inputs,
        )
        .await
}
