//! Effects (side effects as data).
//!
//! Transitions describe what should happen; the interpreter makes it happen.

use shipgate_core::{Block, DeploymentRecord, MessageRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Replace the blocks of an existing message.
    UpdateMessage {
        message: MessageRef,
        blocks: Vec<Block>,
    },

    /// Post the record's message (or update it when one exists), then store
    /// the record as the latest for its pair.
    Publish { record: DeploymentRecord },

    /// Store the record as the latest for its pair, leaving its message alone.
    Store { record: DeploymentRecord },

    /// Write the record to its history slot with the configured expiry.
    Archive { record: DeploymentRecord },

    /// Find the repository's deployment workflow. Fails with NotFound when it
    /// is missing, so it runs before anything is written.
    LocateWorkflow { owner: String, repository: String },

    /// Trigger the deployment workflow for the next environment, using the
    /// workflow located earlier in the same run.
    Dispatch {
        owner: String,
        repository: String,
        branch: String,
        environment: String,
        binding: Option<String>,
    },

    Log { level: LogLevel, message: String },
}

impl Effect {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
