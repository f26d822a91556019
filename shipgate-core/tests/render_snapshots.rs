use insta::{assert_debug_snapshot, with_settings};
use shipgate_core::builder::{record_vote, render, resolve, supersede};
use shipgate_core::{
    Approver, ApprovalState, ApproverRegistry, Block, DeploymentRecord, DeploymentStatus,
    PromotionChain, Verdict, Voter,
};

fn record(environment: &str, approval: ApprovalState) -> DeploymentRecord {
    DeploymentRecord {
        repository: "blog".to_string(),
        owner: "octo".to_string(),
        environment: environment.to_string(),
        deployment_id: 42,
        status: DeploymentStatus::Success,
        branch: "main".to_string(),
        sha: "abc1234".to_string(),
        author: "octocat".to_string(),
        target_url: "https://github.com/octo/blog/actions/runs/1".to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:05:00Z".to_string(),
        approval,
        message: None,
        blocks: Vec::new(),
    }
}

fn approvers() -> ApproverRegistry {
    let mut registry = ApproverRegistry::new();
    registry.add(
        "U-ADA",
        Approver {
            id: "U-ADA".to_string(),
            name: "Ada".to_string(),
            image: "https://avatars.example/U-ADA.png".to_string(),
            email: None,
        },
    );
    registry
}

fn texts(blocks: &[Block]) -> Vec<&str> {
    blocks.iter().flat_map(Block::texts).collect()
}

#[test]
fn snapshot_gated_promotion() {
    let blocks = render(
        &record("test", ApprovalState::AwaitingApproval),
        &PromotionChain::default(),
        &approvers(),
    );

    with_settings!({ omit_expression => true }, {
        assert_debug_snapshot!(texts(&blocks), @r###"
        [
            "blog deployment to test by octocat: success",
            "*When:*\n2024-01-01T00:00:00Z",
            "*Updated:*\n2024-01-01T00:05:00Z",
            "*Repo:*\nblog",
            "*Branch:*\nmain",
            "*Commit:*\n<https://github.com/octo/blog/actions/runs/1|abc1234>",
            "*Deployment:*\n42",
            ":ship: *Deploy to prod*",
            ":octagonal_sign: *Do not deploy to higher envs*",
            "Current approvers:",
        ]
        "###);
    });
}

#[test]
fn snapshot_superseded_after_vote() {
    let chain = PromotionChain::default();
    let mut blocks = render(
        &record("dev", ApprovalState::AwaitingApproval),
        &chain,
        &ApproverRegistry::new(),
    );
    record_vote(
        &mut blocks,
        &Voter {
            id: "U-BOB".to_string(),
            name: "Bob".to_string(),
            avatar_url: "https://avatars.example/U-BOB.png".to_string(),
        },
        Verdict::Approved,
    )
    .unwrap();
    supersede(&mut blocks);

    with_settings!({ omit_expression => true }, {
        assert_debug_snapshot!(texts(&blocks), @r###"
        [
            "blog deployment to dev by octocat: success",
            "*When:*\n2024-01-01T00:00:00Z",
            "*Updated:*\n2024-01-01T00:05:00Z",
            "*Repo:*\nblog",
            "*Branch:*\nmain",
            "*Commit:*\n<https://github.com/octo/blog/actions/runs/1|abc1234>",
            "*Deployment:*\n42",
            "Automatic rejection by subsequent deployment",
        ]
        "###);
    });
}

#[test]
fn snapshot_resolved_rejection() {
    let chain = PromotionChain::default();
    let mut blocks = render(
        &record("test", ApprovalState::AwaitingApproval),
        &chain,
        &approvers(),
    );
    resolve(&mut blocks, Verdict::Rejected, "Ada").unwrap();

    with_settings!({ omit_expression => true }, {
        assert_debug_snapshot!(texts(&blocks[3..]), @r###"
        [
            "Rejected by Ada",
        ]
        "###);
    });
}
