//! Shared test helpers

#![allow(dead_code)]

mod mock_platform;

pub use mock_platform::{
    CreateCommentCall, CreatePullRequestCall, FIRST_CREATED_PR, MergeBranchCall, MergePrCall,
    MergeResponse, MockPlatformService, ci_pending, make_details, ready,
};

use mergequeue::config::{Config, ConfigOverrides, FileConfig};
use mergequeue::dispatch::InboundEvent;
use mergequeue::merge::RetryPolicy;
use mergequeue::types::{PermissionLevel, PlatformConfig};
use mergequeue::webhook::SignatureVerifier;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

/// Shared webhook secret used by every test
pub const SECRET: &str = "it-is-a-secret-to-everybody-0123456789";

/// Repository the tests pretend to serve
pub const REPO: &str = "acme/widgets";

/// Platform config for `acme/widgets` on github.com
pub fn github_config() -> PlatformConfig {
    PlatformConfig {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        host: None,
    }
}

/// Mock platform where `alice` has write access and `mallory` read access
pub fn mock_platform() -> Arc<MockPlatformService> {
    let mock = MockPlatformService::with_config(github_config());
    mock.grant("alice", PermissionLevel::Write);
    mock.grant("mallory", PermissionLevel::Read);
    Arc::new(mock)
}

/// Retry policy with millisecond delays
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        attempt_timeout: Duration::from_millis(500),
        ci_wait: Duration::from_secs(2),
        ci_poll_interval: Duration::from_millis(5),
    }
}

/// Validated config for `acme/widgets` with fast retries
pub fn test_config(capacity: usize) -> Config {
    let file = FileConfig::parse(&format!(
        r#"
repo_owner = "acme"
repo_name = "widgets"
webhook_secret = "{SECRET}"
queue_capacity = {capacity}
"#
    ))
    .unwrap();
    let mut config = Config::resolve(file, ConfigOverrides::default(), |_| None).unwrap();
    config.retry = fast_policy();
    config
}

/// Verifier for [`SECRET`]
pub fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(SecretString::from(SECRET)).unwrap()
}

/// `X-Hub-Signature-256` value for a body
pub fn sign(body: &[u8]) -> String {
    verifier().sign(body)
}

/// JSON body of an `issue_comment` delivery on a pull request
pub fn comment_payload(pr_number: u64, login: &str, body: &str) -> Vec<u8> {
    comment_payload_full("created", REPO, pr_number, true, login, body)
}

/// JSON body of an `issue_comment` delivery with every knob exposed
pub fn comment_payload_full(
    action: &str,
    repository: &str,
    number: u64,
    on_pull_request: bool,
    login: &str,
    body: &str,
) -> Vec<u8> {
    let mut issue = serde_json::json!({ "number": number });
    if on_pull_request {
        issue["pull_request"] = serde_json::json!({
            "url": format!("https://api.github.com/repos/{repository}/pulls/{number}")
        });
    }
    serde_json::to_vec(&serde_json::json!({
        "action": action,
        "issue": issue,
        "comment": { "id": 1000 + number, "body": body, "user": { "login": login } },
        "repository": { "full_name": repository },
    }))
    .unwrap()
}

/// Signed `issue_comment` delivery
pub fn signed_event<'a>(body: &'a [u8], signature: &'a str) -> InboundEvent<'a> {
    InboundEvent {
        event: Some("issue_comment"),
        signature: Some(signature),
        delivery: Some("test-delivery"),
        body,
    }
}
