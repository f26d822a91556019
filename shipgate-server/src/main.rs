use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shipgate_server::config::{Config, SecretSource};
use shipgate_server::secrets::{FileSecrets, SecretProvider, StaticSecrets};
use shipgate_server::store::{RecordStore, SqliteItemStore};
use shipgate_server::{app, AppState, GitHubClient, RecordingLogger, SlackClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting shipgate {}", shipgate_server::service_version());

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let recording_logger = if config.recording_enabled {
        match RecordingLogger::new(PathBuf::from(&config.recording_log_path)) {
            Ok(logger) => {
                info!(
                    "Recording enabled, logging to: {}",
                    config.recording_log_path
                );
                Some(logger)
            }
            Err(e) => {
                error!("Failed to initialize recording logger: {}", e);
                None
            }
        }
    } else {
        None
    };

    let db_path = config.state_dir.join("shipgate.db");
    info!("Using state database at {}", db_path.display());
    let items = SqliteItemStore::new(&db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    let records = RecordStore::new(
        Arc::new(items),
        chrono::Duration::days(config.history_ttl_days),
    );

    match records.prune_expired().await {
        Ok(0) => {}
        Ok(pruned) => info!("Pruned {} expired history records", pruned),
        Err(e) => error!("Failed to prune expired history records: {}", e),
    }

    let secrets: Arc<dyn SecretProvider> = match &config.secrets {
        SecretSource::File(path) => {
            info!("Reading platform tokens from {}", path.display());
            Arc::new(FileSecrets::new(path.clone()))
        }
        SecretSource::Env {
            slack_token,
            github_token,
        } => Arc::new(StaticSecrets::new(slack_token.clone(), github_token.clone())),
    };

    let state = Arc::new(AppState {
        chain: config.chain.clone(),
        records,
        chat: Arc::new(SlackClient::new_with_recording(recording_logger.clone())),
        ci: Arc::new(GitHubClient::new_with_recording(recording_logger.clone())),
        secrets,
        channel: config.slack_channel.clone(),
        deploy_workflows: config.deploy_workflows.clone(),
        dispatch_workflow: config.dispatch_workflow.clone(),
        github_webhook_secret: config.github_webhook_secret.clone(),
        slack_signing_secret: config.slack_signing_secret.clone(),
        recording_logger,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}
