//! Rendering and mutation of deployment messages.
//!
//! A deployment message is a header, two field sections and, while a
//! promotion is on offer, an approve/reject affordance pair followed by a
//! roster context. Votes are tallied in a context block directly after the
//! affordance that was clicked. Once a binding vote lands, the whole
//! promotion area is replaced by a single terminal context line.

use thiserror::Error;

use crate::anchors::{field_text, header_text, StateToken, BRANCH_LABEL, REPO_LABEL};
use crate::approvers::ApproverRegistry;
use crate::blocks::{Accessory, Block, ContextElement, Text, Verdict};
use crate::chain::PromotionChain;
use crate::record::{ApprovalState, DeploymentRecord};

pub const AUTO_REJECTION_NOTE: &str = "Automatic rejection by subsequent deployment";
pub const ROSTER_LABEL: &str = "Current approvers:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("message has no '{}' affordance", .0.as_value())]
    MissingAffordance(Verdict),
}

/// Someone clicking an affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub id: String,
    pub name: String,
    /// Avatar URL; also the identity used to de-duplicate tallies.
    pub avatar_url: String,
}

/// Positions of the two affordances in a block sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub approve: usize,
    pub reject: usize,
}

impl Affordances {
    pub fn locate(blocks: &[Block]) -> Result<Self, BlockError> {
        let approve = find_affordance(blocks, Verdict::Approved)
            .ok_or(BlockError::MissingAffordance(Verdict::Approved))?;
        let reject = find_affordance(blocks, Verdict::Rejected)
            .ok_or(BlockError::MissingAffordance(Verdict::Rejected))?;
        Ok(Self { approve, reject })
    }

    pub fn index(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Approved => self.approve,
            Verdict::Rejected => self.reject,
        }
    }
}

pub fn find_affordance(blocks: &[Block], verdict: Verdict) -> Option<usize> {
    blocks
        .iter()
        .position(|block| block.affordance() == Some(verdict))
}

/// The approver roster, or the "no approver required" note.
fn is_roster(block: &Block) -> bool {
    match block {
        Block::Context { elements } => elements
            .iter()
            .find_map(ContextElement::text)
            .is_some_and(|text| text.to_lowercase().contains("approver")),
        _ => false,
    }
}

fn is_tally(block: &Block) -> bool {
    block.is_context() && !is_roster(block)
}

fn is_auto_rejection(block: &Block) -> bool {
    block.is_context() && block.texts().contains(&AUTO_REJECTION_NOTE)
}

/// Tallied avatars carry the voter id in their alt text, `"{name} ({id})"`.
fn tally_alt_text(voter: &Voter) -> String {
    format!("{} ({})", voter.name, voter.id)
}

fn cast_by(element: &ContextElement, voter: &Voter) -> bool {
    match element {
        ContextElement::Image { alt_text, .. } => alt_text
            .strip_suffix(')')
            .and_then(|rest| rest.rsplit_once(" ("))
            .is_some_and(|(_, id)| id == voter.id),
        _ => false,
    }
}

/// Avatar URLs tallied for `verdict`, most recent first.
pub fn tally(blocks: &[Block], verdict: Verdict) -> Vec<&str> {
    let Some(index) = find_affordance(blocks, verdict) else {
        return Vec::new();
    };
    match blocks.get(index + 1) {
        Some(block @ Block::Context { elements }) if is_tally(block) => {
            elements.iter().filter_map(ContextElement::image_url).collect()
        }
        _ => Vec::new(),
    }
}

fn affordance(token: StateToken, label: String, button: &str, style: &str) -> Block {
    let verdict = token.verdict;
    Block::Section {
        block_id: Some(token.encode()),
        text: Some(Text::mrkdwn(label)),
        fields: Vec::new(),
        accessory: Some(Accessory::Button {
            text: Text::plain(button),
            action_id: Some(format!("promote-{}", verdict.as_value())),
            style: Some(style.to_string()),
            value: Some(verdict.as_value().to_string()),
        }),
    }
}

fn promotion_blocks(
    record: &DeploymentRecord,
    next: &str,
    gated: bool,
    approvers: &ApproverRegistry,
) -> Vec<Block> {
    let token = |verdict| StateToken {
        verdict,
        deployment_id: record.deployment_id,
        repository: record.repository.clone(),
        environment: record.environment.clone(),
    };

    let roster = if gated {
        let mut elements = vec![ContextElement::mrkdwn(ROSTER_LABEL)];
        elements.extend(
            approvers
                .list()
                .map(|approver| ContextElement::image(&approver.image, &approver.name)),
        );
        Block::context(elements)
    } else {
        Block::note(format!("No approver is required for deployment to {}", next))
    };

    vec![
        Block::Divider,
        affordance(
            token(Verdict::Approved),
            format!(":ship: *Deploy to {}*", next),
            "Deploy",
            "primary",
        ),
        affordance(
            token(Verdict::Rejected),
            ":octagonal_sign: *Do not deploy to higher envs*".to_string(),
            "Reject",
            "danger",
        ),
        Block::Divider,
        roster,
    ]
}

fn terminal_block(verdict: Verdict, authority: &str) -> Block {
    Block::context(vec![ContextElement::plain(format!(
        "{} by {}",
        verdict, authority
    ))])
}

/// Render a record from scratch.
pub fn render(
    record: &DeploymentRecord,
    chain: &PromotionChain,
    approvers: &ApproverRegistry,
) -> Vec<Block> {
    let commit = if record.target_url.is_empty() {
        record.sha.clone()
    } else {
        format!("<{}|{}>", record.target_url, record.sha)
    };

    let mut blocks = vec![
        Block::header(header_text(
            &record.repository,
            &record.environment,
            &record.author,
            record.status.as_str(),
        )),
        Block::fields(vec![
            Text::mrkdwn(field_text("When", &record.created_at)),
            Text::mrkdwn(field_text("Updated", &record.updated_at)),
        ]),
        Block::fields(vec![
            Text::mrkdwn(field_text(REPO_LABEL, &record.repository)),
            Text::mrkdwn(field_text(BRANCH_LABEL, &record.branch)),
            Text::mrkdwn(field_text("Commit", &commit)),
            Text::mrkdwn(field_text("Deployment", &record.deployment_id.to_string())),
        ]),
    ];

    match &record.approval {
        ApprovalState::AwaitingStatus => {}
        ApprovalState::AwaitingApproval => {
            if let Some(next) = chain.next_environment(&record.environment) {
                blocks.extend(promotion_blocks(
                    record,
                    next,
                    chain.requires_approval(next),
                    approvers,
                ));
            }
        }
        ApprovalState::Approved { authority } => {
            blocks.push(terminal_block(Verdict::Approved, authority))
        }
        ApprovalState::Rejected {
            superseded_by: Some(_),
            ..
        } => blocks.push(Block::note(AUTO_REJECTION_NOTE)),
        ApprovalState::Rejected { authority, .. } => {
            blocks.push(terminal_block(Verdict::Rejected, authority))
        }
    }

    blocks
}

/// Mark a message obsolete because a newer deployment arrived first.
///
/// Everything from the approve affordance onwards is dropped and the
/// automatic-rejection note appended. Applying it twice changes nothing.
pub fn supersede(blocks: &mut Vec<Block>) {
    if let Some(index) = find_affordance(blocks, Verdict::Approved) {
        blocks.truncate(index);
    }
    if blocks.last().is_some_and(is_auto_rejection) {
        return;
    }
    while blocks.last().is_some_and(Block::is_divider) {
        blocks.pop();
    }
    blocks.push(Block::note(AUTO_REJECTION_NOTE));
}

/// Tally a vote next to the affordance it was cast on.
///
/// The voter's avatar is added once to the tally after the chosen
/// affordance and taken off the opposing tally, which disappears when its
/// last avatar goes.
pub fn record_vote(
    blocks: &mut Vec<Block>,
    voter: &Voter,
    verdict: Verdict,
) -> Result<(), BlockError> {
    let tally_at = Affordances::locate(blocks)?.index(verdict) + 1;
    if !blocks.get(tally_at).is_some_and(is_tally) {
        blocks.insert(
            tally_at,
            Block::context(vec![ContextElement::mrkdwn(format!(
                "thinks we should *{}* this deployment",
                verdict.verb()
            ))]),
        );
    }
    if let Some(Block::Context { elements }) = blocks.get_mut(tally_at) {
        if !elements.iter().any(|e| cast_by(e, voter)) {
            elements.insert(
                0,
                ContextElement::image(&voter.avatar_url, tally_alt_text(voter)),
            );
        }
    }

    let opposing_at = Affordances::locate(blocks)?.index(verdict.opposite()) + 1;
    if !blocks.get(opposing_at).is_some_and(is_tally) {
        return Ok(());
    }
    let emptied = match blocks.get_mut(opposing_at) {
        Some(Block::Context { elements }) => {
            elements.retain(|e| !cast_by(e, voter));
            !elements.iter().any(|e| e.image_url().is_some())
        }
        _ => false,
    };
    if emptied {
        blocks.remove(opposing_at);
    }
    Ok(())
}

/// Replace the promotion area with the terminal "{verdict} by {authority}" line.
pub fn resolve(
    blocks: &mut Vec<Block>,
    verdict: Verdict,
    authority: &str,
) -> Result<(), BlockError> {
    Affordances::locate(blocks)?;

    let mut kept: Vec<Block> = Vec::with_capacity(blocks.len());
    let mut after_affordance = false;
    for mut block in blocks.drain(..) {
        let follows_affordance = after_affordance;
        after_affordance = block.affordance().is_some();
        if after_affordance || (block.is_context() && (follows_affordance || is_roster(&block)))
        {
            continue;
        }
        if block.is_divider() && kept.last().map_or(true, Block::is_divider) {
            continue;
        }
        if let Block::Section { accessory, .. } = &mut block {
            *accessory = None;
        }
        kept.push(block);
    }
    while kept.last().is_some_and(Block::is_divider) {
        kept.pop();
    }
    kept.push(terminal_block(verdict, authority));

    *blocks = kept;
    Ok(())
}
