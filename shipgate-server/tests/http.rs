//! Requests through the full router, signatures included.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use common::*;
use shipgate_core::{DeploymentStatus, RecordKey};
use shipgate_server::app;

const GITHUB_SECRET: &str = "gh-webhook-secret";
const SLACK_SECRET: &str = "slack-signing-secret";

fn hmac_hex(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn github_request(body: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    Request::post("/github/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", "deployment_status")
        .header(
            "x-hub-signature-256",
            format!("sha256={}", hmac_hex(GITHUB_SECRET, &bytes)),
        )
        .body(Body::from(bytes))
        .unwrap()
}

fn slack_request(path: &str, form: &str) -> Request<Body> {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = hmac_hex(
        SLACK_SECRET,
        format!("v0:{}:{}", timestamp, form).as_bytes(),
    );
    Request::post(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-slack-request-timestamp", timestamp)
        .header("x-slack-signature", format!("v0={}", signature))
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn deployment_payload(workflow: &str, environment: &str, id: u64, state: &str) -> Value {
    json!({
        "action": "created",
        "deployment_status": {
            "state": state,
            "environment": environment,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:05:00Z",
            "target_url": "https://github.com/octo/blog/actions/runs/1",
            "creator": {"login": "octocat"}
        },
        "deployment": {"id": id, "ref": "main", "sha": "abc1234"},
        "repository": {"name": "blog", "owner": {"login": "octo"}},
        "workflow": {"name": workflow}
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new(FakeChat::default(), FakeCi::with_workflows(&[]));
    let response = app(harness.app_state(GITHUB_SECRET, SLACK_SECRET))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_signed_webhook_posts_message() {
    let harness = Harness::new(FakeChat::default(), FakeCi::with_workflows(&[]));
    let response = app(harness.app_state(GITHUB_SECRET, SLACK_SECRET))
        .oneshot(github_request(&deployment_payload("Deploy", "dev", 5, "success")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.chat.calls().len(), 1);
    let stored = harness
        .records
        .get_latest(&RecordKey::new("blog", "dev"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DeploymentStatus::Success);
}

#[tokio::test]
async fn test_unsigned_webhook_is_rejected() {
    let harness = Harness::new(FakeChat::default(), FakeCi::with_workflows(&[]));
    let request = Request::post("/github/webhook")
        .header("x-hub-signature-256", "sha256=00")
        .body(Body::from(
            serde_json::to_vec(&deployment_payload("Deploy", "dev", 5, "success")).unwrap(),
        ))
        .unwrap();

    let response = app(harness.app_state(GITHUB_SECRET, SLACK_SECRET))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.chat.calls().is_empty());
}

#[tokio::test]
async fn test_other_workflow_is_acknowledged_and_ignored() {
    let harness = Harness::new(FakeChat::default(), FakeCi::with_workflows(&[]));
    let response = app(harness.app_state(GITHUB_SECRET, SLACK_SECRET))
        .oneshot(github_request(&deployment_payload("CI", "dev", 5, "success")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().starts_with("ignored:"));
    assert!(harness.chat.calls().is_empty());
}

#[tokio::test]
async fn test_first_approver_bootstraps_registry() {
    let harness = Harness::new(
        FakeChat::default().with_profile("U-ADA", "Ada"),
        FakeCi::with_workflows(&[]),
    );
    let state = harness.app_state(GITHUB_SECRET, SLACK_SECRET);

    let response = app(state.clone())
        .oneshot(slack_request(
            "/slack/approvers/add",
            "text=%3C%40U-ADA%7Cada%3E&user_id=U-ANYONE",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["blocks"][0]["text"]["text"]
        .as_str()
        .unwrap()
        .contains("U-ADA"));

    let registry = harness.records.get_approvers().await.unwrap().unwrap();
    assert!(registry.contains("U-ADA"));

    // Once populated, non-members cannot add.
    let response = app(state)
        .oneshot(slack_request(
            "/slack/approvers/add",
            "text=%3C%40U-BOB%7Cbob%3E&user_id=U-MALLORY",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let registry = harness.records.get_approvers().await.unwrap().unwrap();
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_stale_slack_timestamp_is_rejected() {
    let harness = Harness::new(FakeChat::default(), FakeCi::with_workflows(&[]));
    let form = "text=&user_id=U1";
    let timestamp = (chrono::Utc::now().timestamp() - 600).to_string();
    let signature = hmac_hex(SLACK_SECRET, format!("v0:{}:{}", timestamp, form).as_bytes());
    let request = Request::post("/slack/approvers/list")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-slack-request-timestamp", timestamp)
        .header("x-slack-signature", format!("v0={}", signature))
        .body(Body::from(form))
        .unwrap();

    let response = app(harness.app_state(GITHUB_SECRET, SLACK_SECRET))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_button_click_resolves_through_token() {
    let harness = Harness::new(
        FakeChat::default().with_profile("U-ANY", "Anyone"),
        FakeCi::with_workflows(&["deploy-to-env"]),
    );
    let state = harness.app_state(GITHUB_SECRET, SLACK_SECRET);

    app(state.clone())
        .oneshot(github_request(&deployment_payload("Deploy", "dev", 9, "success")))
        .await
        .unwrap();
    let record = harness
        .records
        .get_latest(&RecordKey::new("blog", "dev"))
        .await
        .unwrap()
        .unwrap();
    let message = record.message.clone().unwrap();

    let payload = json!({
        "type": "block_actions",
        "user": {"id": "U-ANY", "username": "anyone"},
        "channel": {"id": message.channel},
        "message": {"ts": message.ts, "blocks": record.blocks},
        "actions": [{
            "action_id": "promote-approved",
            "block_id": "gate|approved|9|blog|dev",
            "value": "approved",
            "type": "button"
        }]
    });
    let mut encoder = reqwest::Url::parse("http://localhost/").unwrap();
    encoder
        .query_pairs_mut()
        .append_pair("payload", &payload.to_string());
    let form = encoder.query().unwrap().to_string();

    let response = app(state)
        .oneshot(slack_request("/slack/interaction", &form))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // dev -> test is ungated, so anyone's approval is binding.
    let dispatched = harness.ci.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].inputs["deploy_env"], "test");
    assert!(!dispatched[0].inputs.contains_key("oidc_role"));
}
