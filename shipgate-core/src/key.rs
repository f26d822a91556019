//! Structured keys for the record store.
//!
//! Items are addressed by a partition key and a sort key. Deployment records
//! for one (repository, environment) pair share a partition; the approver
//! registry lives in its own singleton partition.

use std::fmt;

/// Identity of one deployment record: a repository in an environment.
///
/// Key serialization upper-cases both parts, so `Blog`/`blog` address the
/// same partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub repository: String,
    pub environment: String,
}

impl RecordKey {
    pub fn new(repository: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            environment: environment.into(),
        }
    }

    pub fn partition_key(&self) -> String {
        format!("REPO#{}#ENV#{}", self.repository, self.environment).to_uppercase()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.environment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// The current record of a partition.
    Latest,
    /// An archived record, keyed by its deployment id.
    Deployment(u64),
    /// Singleton metadata item.
    Meta,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "LATEST"),
            Self::Deployment(id) => write!(f, "DEPLOYMENT#{}", id),
            Self::Meta => write!(f, "META"),
        }
    }
}

/// Fully serialized store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sort_key: SortKey) -> Self {
        Self {
            pk: pk.into(),
            sk: sort_key.to_string(),
        }
    }

    pub fn latest(key: &RecordKey) -> Self {
        Self::new(key.partition_key(), SortKey::Latest)
    }

    pub fn history(key: &RecordKey, deployment_id: u64) -> Self {
        Self::new(key.partition_key(), SortKey::Deployment(deployment_id))
    }

    pub fn approvers() -> Self {
        Self::new("APPROVERS", SortKey::Meta)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}
