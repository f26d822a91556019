use anyhow::{bail, Context, Result};
use shipgate_core::{PromotionChain, DEFAULT_DEPLOY_WORKFLOWS};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::PathBuf;

/// Where platform tokens come from.
#[derive(Clone)]
pub enum SecretSource {
    /// JSON file re-read on every request.
    File(PathBuf),
    /// Tokens fixed at startup.
    Env {
        slack_token: String,
        github_token: String,
    },
}

#[derive(Clone)]
pub struct Config {
    pub github_webhook_secret: String,
    pub slack_signing_secret: String,
    pub slack_channel: String,
    pub secrets: SecretSource,
    pub chain: PromotionChain,
    pub deploy_workflows: Vec<String>,
    pub dispatch_workflow: String,
    pub port: u16,
    /// Directory for the SQLite database. Defaults to the working directory.
    pub state_dir: PathBuf,
    pub history_ttl_days: i64,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{} environment variable is required", name))
        };

        let github_webhook_secret = required("GITHUB_WEBHOOK_SECRET")?;
        let slack_signing_secret = required("SLACK_SIGNING_SECRET")?;
        let slack_channel = required("SLACK_CHANNEL")?;

        let secrets = match lookup("SECRETS_FILE").filter(|s| !s.trim().is_empty()) {
            Some(path) => SecretSource::File(PathBuf::from(path)),
            None => SecretSource::Env {
                slack_token: required("SLACK_TOKEN")
                    .context("set SECRETS_FILE or SLACK_TOKEN/GITHUB_TOKEN")?,
                github_token: required("GITHUB_TOKEN")
                    .context("set SECRETS_FILE or SLACK_TOKEN/GITHUB_TOKEN")?,
            },
        };

        let next: BTreeMap<String, String> = match lookup("NEXT_ENVS") {
            Some(json) => serde_json::from_str(&json)
                .context("NEXT_ENVS must be a JSON object of environment to successor")?,
            None => BTreeMap::from([
                ("dev".to_string(), "test".to_string()),
                ("test".to_string(), "prod".to_string()),
            ]),
        };
        let gated: BTreeSet<String> =
            parse_list(lookup("APPROVAL_ENVS").as_deref().unwrap_or("prod"))
                .into_iter()
                .collect();
        let bindings: BTreeMap<String, String> = match lookup("IDENTITY_BINDINGS") {
            Some(json) => serde_json::from_str(&json)
                .context("IDENTITY_BINDINGS must be a JSON object of environment to binding")?,
            None => BTreeMap::new(),
        };
        let chain = PromotionChain::new(next, gated, bindings)
            .context("NEXT_ENVS does not describe a linear promotion chain")?;

        let deploy_workflows = match lookup("DEPLOY_WORKFLOWS") {
            Some(list) => parse_list(&list),
            None => DEFAULT_DEPLOY_WORKFLOWS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        if deploy_workflows.is_empty() {
            bail!("DEPLOY_WORKFLOWS must name at least one workflow");
        }

        let dispatch_workflow =
            lookup("DISPATCH_WORKFLOW").unwrap_or_else(|| "deploy-to-env".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let history_ttl_days = lookup("HISTORY_TTL_DAYS")
            .unwrap_or_else(|| "90".to_string())
            .parse::<i64>()
            .context("HISTORY_TTL_DAYS must be a whole number of days")?;
        if history_ttl_days <= 0 {
            bail!("HISTORY_TTL_DAYS must be positive");
        }

        let recording_enabled = lookup("RECORDING_ENABLED")
            .unwrap_or_else(|| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let recording_log_path =
            lookup("RECORDING_LOG_PATH").unwrap_or_else(|| "recordings.jsonl".to_string());

        Ok(Config {
            github_webhook_secret,
            slack_signing_secret,
            slack_channel,
            secrets,
            chain,
            deploy_workflows,
            dispatch_workflow,
            port,
            state_dir,
            history_ttl_days,
            recording_enabled,
            recording_log_path,
        })
    }
}

/// Split a comma separated list, dropping blanks.
fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("GITHUB_WEBHOOK_SECRET", "gh-secret"),
        ("SLACK_SIGNING_SECRET", "slack-secret"),
        ("SLACK_CHANNEL", "C123"),
        ("SLACK_TOKEN", "xoxb-1"),
        ("GITHUB_TOKEN", "ghp-1"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.history_ttl_days, 90);
        assert_eq!(config.dispatch_workflow, "deploy-to-env");
        assert_eq!(config.deploy_workflows, vec!["Deploy", "deploy-to-env"]);
        assert_eq!(config.chain, PromotionChain::default());
        assert!(!config.recording_enabled);
        assert!(matches!(config.secrets, SecretSource::Env { .. }));
    }

    #[test]
    fn test_missing_required_variable() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "SLACK_CHANNEL")
            .collect();
        let err = Config::from_lookup(lookup(&vars)).err().unwrap();
        assert!(err.to_string().contains("SLACK_CHANNEL"));
    }

    #[test]
    fn test_secrets_file_replaces_token_variables() {
        let vars = [
            ("GITHUB_WEBHOOK_SECRET", "gh-secret"),
            ("SLACK_SIGNING_SECRET", "slack-secret"),
            ("SLACK_CHANNEL", "C123"),
            ("SECRETS_FILE", "/run/secrets/shipgate.json"),
        ];
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert!(matches!(config.secrets, SecretSource::File(_)));
    }

    #[test]
    fn test_custom_chain() {
        let mut vars = BASE.to_vec();
        vars.push(("NEXT_ENVS", r#"{"staging":"live"}"#));
        vars.push(("APPROVAL_ENVS", "live, staging"));
        vars.push(("IDENTITY_BINDINGS", r#"{"live":"arn:aws:iam::1:role/Live"}"#));
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.chain.next_environment("staging"), Some("live"));
        assert!(config.chain.requires_approval("live"));
        assert_eq!(
            config.chain.identity_binding("live"),
            Some("arn:aws:iam::1:role/Live")
        );
    }

    #[test]
    fn test_cyclic_chain_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("NEXT_ENVS", r#"{"a":"b","b":"a"}"#));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" Deploy , ,deploy-to-env"), vec!["Deploy", "deploy-to-env"]);
        assert!(parse_list("").is_empty());
    }
}
