//! Registry of accounts allowed to approve gated promotions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: String,
    pub name: String,
    /// Avatar URL shown in approver rosters.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyApprover,
    /// The requester is not an approver and the registry is not empty.
    NotAuthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotApprover,
    /// The requester is not an approver.
    NotAuthorized,
}

/// Mapping from chat user id to approver profile.
///
/// Once the registry has a member, only members may change it. The very
/// first addition is unconditional so that the registry can be bootstrapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverRegistry {
    #[serde(default)]
    approvers: BTreeMap<String, Approver>,
}

impl ApproverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.approvers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.approvers.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.approvers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Approver> {
        self.approvers.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &Approver> {
        self.approvers.values()
    }

    /// Whether `requester` may add members right now.
    pub fn may_add(&self, requester: &str) -> bool {
        self.is_empty() || self.contains(requester)
    }

    pub fn add(&mut self, requester: &str, approver: Approver) -> AddOutcome {
        if !self.may_add(requester) {
            return AddOutcome::NotAuthorized;
        }
        if self.contains(&approver.id) {
            return AddOutcome::AlreadyApprover;
        }
        self.approvers.insert(approver.id.clone(), approver);
        AddOutcome::Added
    }

    /// Remove `target` on behalf of `requester`.
    ///
    /// Authorization looks at the requester while the deletion applies to the
    /// target, so an approver may remove anyone, themselves included. Removing
    /// the last approver re-opens the bootstrap path of [`Self::add`].
    pub fn remove(&mut self, requester: &str, target: &str) -> RemoveOutcome {
        if !self.contains(requester) {
            return RemoveOutcome::NotAuthorized;
        }
        match self.approvers.remove(target) {
            Some(_) => RemoveOutcome::Removed,
            None => RemoveOutcome::NotApprover,
        }
    }
}

/// Extract the user id from a Slack mention token such as `<@U123|ada>`.
pub fn parse_mention(text: &str) -> Option<&str> {
    let start = text.find("<@")? + 2;
    let rest = &text[start..];
    let end = rest.find(['|', '>'])?;
    let id = rest[..end].trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
