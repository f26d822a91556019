//! The promotion chain: which environment follows which, and which ones are gated.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("promotion chain loops back through environment '{0}'")]
    Cycle(String),
    #[error("environment '{0}' is the successor of more than one environment")]
    Branching(String),
}

/// Ordered mapping from an environment to its successor.
///
/// The chain is linear: every environment has at most one successor and is
/// the successor of at most one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionChain {
    next: BTreeMap<String, String>,
    gated: BTreeSet<String>,
    bindings: BTreeMap<String, String>,
}

impl Default for PromotionChain {
    fn default() -> Self {
        Self {
            next: BTreeMap::from([
                ("dev".to_string(), "test".to_string()),
                ("test".to_string(), "prod".to_string()),
            ]),
            gated: BTreeSet::from(["prod".to_string()]),
            bindings: BTreeMap::new(),
        }
    }
}

impl PromotionChain {
    pub fn new(
        next: BTreeMap<String, String>,
        gated: BTreeSet<String>,
        bindings: BTreeMap<String, String>,
    ) -> Result<Self, ChainError> {
        let mut successors = BTreeSet::new();
        for target in next.values() {
            if !successors.insert(target.as_str()) {
                return Err(ChainError::Branching(target.clone()));
            }
        }

        for start in next.keys() {
            let mut current = start.as_str();
            for _ in 0..next.len() {
                match next.get(current) {
                    Some(following) => current = following,
                    None => break,
                }
            }
            if next.contains_key(current) {
                return Err(ChainError::Cycle(start.clone()));
            }
        }

        Ok(Self {
            next,
            gated,
            bindings,
        })
    }

    pub fn with_bindings(mut self, bindings: BTreeMap<String, String>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn next_environment(&self, environment: &str) -> Option<&str> {
        self.next.get(environment).map(String::as_str)
    }

    /// Whether promoting *into* `environment` needs a registered approver.
    pub fn requires_approval(&self, environment: &str) -> bool {
        self.gated.contains(environment)
    }

    /// Deployment identity (e.g. cloud role) the CI workflow assumes in `environment`.
    pub fn identity_binding(&self, environment: &str) -> Option<&str> {
        self.bindings.get(environment).map(String::as_str)
    }
}
