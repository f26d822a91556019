//! In-process fakes of the chat and CI platforms.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shipgate_core::{
    Approver, ApproverRegistry, Block, DeploymentEvent, DeploymentStatus, MessageRef,
    PromotionChain,
};
use shipgate_server::github::{CiPlatform, Workflow};
use shipgate_server::secrets::StaticSecrets;
use shipgate_server::slack::{ChatPlatform, UserProfile};
use shipgate_server::state_machine::InterpreterContext;
use shipgate_server::{AppState, GateError, RecordStore};

pub const CHANNEL: &str = "C-DEPLOYS";
pub const PROD_BINDING: &str = "arn:aws:iam::123456789012:role/ProdDeploy";

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Post { channel: String, blocks: Vec<Block> },
    Update { message: MessageRef, blocks: Vec<Block> },
}

#[derive(Default)]
pub struct FakeChat {
    pub calls: Mutex<Vec<ChatCall>>,
    pub profiles: Mutex<HashMap<String, UserProfile>>,
    /// When set, posts and updates answer like Slack's `ok: false`.
    pub failing: AtomicBool,
    next_ts: Mutex<u64>,
}

impl FakeChat {
    pub fn with_profile(self, user_id: &str, name: &str) -> Self {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            UserProfile {
                name: name.to_string(),
                avatar_url: avatar(user_id),
                email: Some(format!("{}@example.com", user_id.to_lowercase())),
            },
        );
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, method: &str) -> Result<(), GateError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GateError::upstream(
                "slack",
                Some(200),
                format!("{{\"ok\":false,\"error\":\"{} unavailable\"}}", method),
            ));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(MessageRef, Vec<Block>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChatCall::Update { message, blocks } => Some((message, blocks)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn post_message(
        &self,
        _correlation_id: Option<&str>,
        _token: &str,
        channel: &str,
        blocks: &[Block],
    ) -> Result<MessageRef, GateError> {
        self.check("chat.postMessage")?;
        self.calls.lock().unwrap().push(ChatCall::Post {
            channel: channel.to_string(),
            blocks: blocks.to_vec(),
        });
        let mut next_ts = self.next_ts.lock().unwrap();
        *next_ts += 1;
        Ok(MessageRef {
            channel: channel.to_string(),
            ts: format!("1700000000.{:06}", *next_ts),
        })
    }

    async fn update_message(
        &self,
        _correlation_id: Option<&str>,
        _token: &str,
        message: &MessageRef,
        blocks: &[Block],
    ) -> Result<(), GateError> {
        self.check("chat.update")?;
        self.calls.lock().unwrap().push(ChatCall::Update {
            message: message.clone(),
            blocks: blocks.to_vec(),
        });
        Ok(())
    }

    async fn get_user_profile(
        &self,
        _correlation_id: Option<&str>,
        _token: &str,
        user_id: &str,
    ) -> Result<Option<UserProfile>, GateError> {
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub owner: String,
    pub repo: String,
    pub workflow_id: u64,
    pub git_ref: String,
    pub inputs: BTreeMap<String, String>,
}

pub struct FakeCi {
    pub workflows: Vec<Workflow>,
    pub dispatched: Mutex<Vec<Dispatched>>,
    /// When set, dispatches fail as a GitHub 5xx would.
    pub failing: AtomicBool,
}

impl FakeCi {
    pub fn with_workflows(names: &[&str]) -> Self {
        Self {
            workflows: names
                .iter()
                .enumerate()
                .map(|(n, name)| Workflow {
                    id: 100 + n as u64,
                    name: name.to_string(),
                    path: format!(".github/workflows/{}.yml", name),
                })
                .collect(),
            dispatched: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl CiPlatform for FakeCi {
    async fn list_workflows(
        &self,
        _correlation_id: Option<&str>,
        _token: &str,
        _owner: &str,
        _repo: &str,
    ) -> Result<Vec<Workflow>, GateError> {
        Ok(self.workflows.clone())
    }

    async fn dispatch_workflow(
        &self,
        _correlation_id: Option<&str>,
        _token: &str,
        owner: &str,
        repo: &str,
        workflow_id: u64,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), GateError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GateError::upstream("github", Some(502), "Bad Gateway"));
        }
        self.dispatched.lock().unwrap().push(Dispatched {
            owner: owner.to_string(),
            repo: repo.to_string(),
            workflow_id,
            git_ref: git_ref.to_string(),
            inputs: inputs.clone(),
        });
        Ok(())
    }
}

pub fn avatar(user_id: &str) -> String {
    format!("https://avatars.example/{}.png", user_id)
}

pub fn chain() -> PromotionChain {
    PromotionChain::default().with_bindings(BTreeMap::from([(
        "prod".to_string(),
        PROD_BINDING.to_string(),
    )]))
}

pub fn approvers(members: &[(&str, &str)]) -> ApproverRegistry {
    let mut registry = ApproverRegistry::new();
    for (id, name) in members {
        registry.add(
            members[0].0,
            Approver {
                id: id.to_string(),
                name: name.to_string(),
                image: avatar(id),
                email: None,
            },
        );
    }
    registry
}

pub fn deployment(environment: &str, deployment_id: u64, status: DeploymentStatus) -> DeploymentEvent {
    DeploymentEvent {
        repository: "blog".to_string(),
        owner: "octo".to_string(),
        environment: environment.to_string(),
        deployment_id,
        branch: "main".to_string(),
        sha: "abc1234".to_string(),
        status,
        actor: "octocat".to_string(),
        target_url: "https://github.com/octo/blog/actions/runs/1".to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:05:00Z".to_string(),
    }
}

/// Everything a test needs to drive the resolver.
pub struct Harness {
    pub chat: Arc<FakeChat>,
    pub ci: Arc<FakeCi>,
    pub records: RecordStore,
    pub chain: PromotionChain,
}

impl Harness {
    pub fn new(chat: FakeChat, ci: FakeCi) -> Self {
        Self {
            chat: Arc::new(chat),
            ci: Arc::new(ci),
            records: RecordStore::in_memory(),
            chain: chain(),
        }
    }

    pub fn ctx(&self) -> InterpreterContext {
        InterpreterContext {
            chat: self.chat.clone(),
            ci: self.ci.clone(),
            records: self.records.clone(),
            credentials: shipgate_server::Credentials {
                chat_token: "xoxb-test".to_string(),
                ci_token: "ghp-test".to_string(),
            },
            channel: CHANNEL.to_string(),
            dispatch_workflow: "deploy-to-env".to_string(),
            correlation_id: Some("test-correlation".to_string()),
        }
    }

    pub fn app_state(&self, github_secret: &str, slack_secret: &str) -> Arc<AppState> {
        Arc::new(AppState {
            chain: self.chain.clone(),
            records: self.records.clone(),
            chat: self.chat.clone(),
            ci: self.ci.clone(),
            secrets: Arc::new(StaticSecrets::new("xoxb-test", "ghp-test")),
            channel: CHANNEL.to_string(),
            deploy_workflows: vec!["Deploy".to_string(), "deploy-to-env".to_string()],
            dispatch_workflow: "deploy-to-env".to_string(),
            github_webhook_secret: github_secret.to_string(),
            slack_signing_secret: slack_secret.to_string(),
            recording_logger: None,
        })
    }
}
