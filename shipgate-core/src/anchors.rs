//! Locating the deployment a rendered message belongs to.
//!
//! Every affordance section carries a [`StateToken`] in its `block_id`, which
//! names the deployment explicitly. Messages rendered without tokens are
//! matched through fixed phrase anchors in the header and field text; the
//! renderer uses the same helpers so the anchors cannot drift.

use crate::blocks::{Block, Verdict};

const HEADER_ENV_ANCHOR: &str = " deployment to ";
const HEADER_AUTHOR_ANCHOR: &str = " by ";

pub const REPO_LABEL: &str = "Repo";
pub const BRANCH_LABEL: &str = "Branch";

const TOKEN_PREFIX: &str = "gate";
const TOKEN_SEPARATOR: &str = "|";

/// `"{repository} deployment to {environment} by {author}: {status}"`
pub fn header_text(repository: &str, environment: &str, author: &str, status: &str) -> String {
    format!(
        "{}{}{}{}{}: {}",
        repository, HEADER_ENV_ANCHOR, environment, HEADER_AUTHOR_ANCHOR, author, status
    )
}

/// `"*{label}:*\n{value}"`
pub fn field_text(label: &str, value: &str) -> String {
    format!("*{}:*\n{}", label, value)
}

fn field_value<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let anchor = format!("*{}:*\n", label);
    let start = text.find(&anchor)? + anchor.len();
    let value = text[start..].lines().next()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Deployment identity recovered from message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTarget {
    pub repository: String,
    pub environment: String,
}

/// Recover repository and environment from the phrase anchors.
pub fn recover_target(blocks: &[Block]) -> Option<MessageTarget> {
    let header = blocks.iter().find_map(|block| match block {
        Block::Header { text } => Some(text.as_str()),
        _ => None,
    })?;

    let (header_repository, rest) = header.split_once(HEADER_ENV_ANCHOR)?;
    let (environment, _) = rest.split_once(HEADER_AUTHOR_ANCHOR)?;

    let texts: Vec<&str> = blocks.iter().flat_map(Block::texts).collect();
    let repository = texts
        .iter()
        .find_map(|text| field_value(text, REPO_LABEL))
        .unwrap_or(header_repository);

    if repository.trim().is_empty() || environment.trim().is_empty() {
        return None;
    }

    Some(MessageTarget {
        repository: repository.trim().to_string(),
        environment: environment.trim().to_string(),
    })
}

/// Opaque identifier tying an affordance to one deployment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken {
    pub verdict: Verdict,
    pub deployment_id: u64,
    pub repository: String,
    pub environment: String,
}

impl StateToken {
    pub fn encode(&self) -> String {
        let deployment_id = self.deployment_id.to_string();
        [
            TOKEN_PREFIX,
            self.verdict.as_value(),
            deployment_id.as_str(),
            self.repository.as_str(),
            self.environment.as_str(),
        ]
        .join(TOKEN_SEPARATOR)
    }

    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.splitn(5, TOKEN_SEPARATOR);
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let verdict = Verdict::from_value(parts.next()?)?;
        let deployment_id = parts.next()?.parse().ok()?;
        let repository = parts.next()?.to_string();
        let environment = parts.next()?.to_string();
        if repository.is_empty() || environment.is_empty() {
            return None;
        }
        Some(Self {
            verdict,
            deployment_id,
            repository,
            environment,
        })
    }
}
