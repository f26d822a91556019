pub mod anchors;
pub mod approvers;
pub mod blocks;
pub mod builder;
pub mod chain;
pub mod event;
pub mod key;
pub mod record;

pub use anchors::{recover_target, MessageTarget, StateToken};
pub use approvers::{parse_mention, AddOutcome, Approver, ApproverRegistry, RemoveOutcome};
pub use blocks::{Block, ContextElement, Text, Verdict};
pub use builder::{BlockError, Voter, AUTO_REJECTION_NOTE};
pub use chain::{ChainError, PromotionChain};
pub use event::{normalize, DeploymentEvent, IgnoreReason, Normalized, DEFAULT_DEPLOY_WORKFLOWS};
pub use key::{ItemKey, RecordKey, SortKey};
pub use record::{ApprovalState, DeploymentRecord, DeploymentStatus, MessageRef};
