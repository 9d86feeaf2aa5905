//! Mock platform service for testing
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use mergequeue::error::{Error, Result};
use mergequeue::platform::PlatformService;
use mergequeue::types::{
    CiStatus, MergeMethod, MergeReadiness, MergeResult, PermissionLevel, PlatformConfig, PrState,
    PullRequestDetails,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Call record for `create_pr_comment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommentCall {
    pub pr_number: u64,
    pub body: String,
}

/// Call record for `merge_pr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePrCall {
    pub pr_number: u64,
    pub method: MergeMethod,
    pub expected_head_sha: Option<String>,
}

/// Call record for `merge_branch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeBranchCall {
    pub base: String,
    pub head: String,
}

/// Call record for `create_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePullRequestCall {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// First number handed out to pull requests opened through the mock
pub const FIRST_CREATED_PR: u64 = 900;

/// Scripted answer for one `merge_pr` call
#[derive(Debug, Clone)]
pub enum MergeResponse {
    /// Merge succeeds
    Merged,
    /// Fails with a retryable error
    Transient(String),
    /// Fails with a non-retryable error
    Blocked(String),
    /// API answers but reports the PR was not merged
    NotMerged(String),
    /// Takes this long, then succeeds
    Hang(Duration),
}

/// Decrements the in-flight counter even when the call is cancelled by a timeout
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Simple mock platform service for testing
///
/// This manually implements `PlatformService` rather than using mockall,
/// because mockall has issues with methods returning references.
///
/// Features:
/// - Call tracking for verification
/// - Per-PR scripted merge responses, consumed in order
/// - Error injection for failure path testing
/// - Tracking of how many merges ran at the same time
pub struct MockPlatformService {
    config: PlatformConfig,
    pr_details_responses: Mutex<HashMap<u64, PullRequestDetails>>,
    merge_readiness_responses: Mutex<HashMap<u64, MergeReadiness>>,
    readiness_scripts: Mutex<HashMap<u64, VecDeque<MergeReadiness>>>,
    merge_scripts: Mutex<HashMap<u64, VecDeque<MergeResponse>>>,
    permissions: Mutex<HashMap<String, PermissionLevel>>,
    merge_delay: Mutex<Option<Duration>>,
    // Call tracking
    get_pr_details_calls: Mutex<Vec<u64>>,
    check_merge_readiness_calls: Mutex<Vec<u64>>,
    merge_pr_calls: Mutex<Vec<MergePrCall>>,
    create_comment_calls: Mutex<Vec<CreateCommentCall>>,
    permission_calls: Mutex<Vec<String>>,
    create_branch_calls: Mutex<Vec<(String, String)>>,
    merge_branch_calls: Mutex<Vec<MergeBranchCall>>,
    create_pull_request_calls: Mutex<Vec<CreatePullRequestCall>>,
    next_pr_number: AtomicU64,
    // Error injection
    conflicting_heads: Mutex<HashSet<String>>,
    error_on_comment: Mutex<Option<String>>,
    error_on_permission: Mutex<Option<String>>,
    // Concurrency tracking
    merges_in_flight: AtomicUsize,
    max_merges_in_flight: AtomicUsize,
}

impl MockPlatformService {
    /// Create a new mock with the given config
    pub fn with_config(config: PlatformConfig) -> Self {
        Self {
            config,
            pr_details_responses: Mutex::new(HashMap::new()),
            merge_readiness_responses: Mutex::new(HashMap::new()),
            readiness_scripts: Mutex::new(HashMap::new()),
            merge_scripts: Mutex::new(HashMap::new()),
            permissions: Mutex::new(HashMap::new()),
            merge_delay: Mutex::new(None),
            get_pr_details_calls: Mutex::new(Vec::new()),
            check_merge_readiness_calls: Mutex::new(Vec::new()),
            merge_pr_calls: Mutex::new(Vec::new()),
            create_comment_calls: Mutex::new(Vec::new()),
            permission_calls: Mutex::new(Vec::new()),
            create_branch_calls: Mutex::new(Vec::new()),
            merge_branch_calls: Mutex::new(Vec::new()),
            create_pull_request_calls: Mutex::new(Vec::new()),
            next_pr_number: AtomicU64::new(FIRST_CREATED_PR),
            conflicting_heads: Mutex::new(HashSet::new()),
            error_on_comment: Mutex::new(None),
            error_on_permission: Mutex::new(None),
            merges_in_flight: AtomicUsize::new(0),
            max_merges_in_flight: AtomicUsize::new(0),
        }
    }

    // === Error injection methods ===

    /// Make `create_pr_comment` return an error
    pub fn fail_comments(&self, msg: &str) {
        *self.error_on_comment.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `get_permission` return an error
    pub fn fail_permission(&self, msg: &str) {
        *self.error_on_permission.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `merge_branch` report a conflict for this head ref
    pub fn conflict_on(&self, head_ref: &str) {
        self.conflicting_heads
            .lock()
            .unwrap()
            .insert(head_ref.to_string());
    }

    // === Response setup ===

    /// Set the response for `get_pr_details` for a specific PR
    pub fn set_pr_details_response(&self, pr_number: u64, details: PullRequestDetails) {
        self.pr_details_responses
            .lock()
            .unwrap()
            .insert(pr_number, details);
    }

    /// Set the response for `check_merge_readiness` for a specific PR
    pub fn set_merge_readiness_response(&self, pr_number: u64, readiness: MergeReadiness) {
        self.merge_readiness_responses
            .lock()
            .unwrap()
            .insert(pr_number, readiness);
    }

    /// Queue readiness answers for a PR; once used up, the configured response is returned
    pub fn script_readiness(&self, pr_number: u64, responses: Vec<MergeReadiness>) {
        self.readiness_scripts
            .lock()
            .unwrap()
            .entry(pr_number)
            .or_default()
            .extend(responses);
    }

    /// Queue scripted `merge_pr` responses for a PR; once used up, merges succeed
    pub fn script_merges(&self, pr_number: u64, responses: Vec<MergeResponse>) {
        self.merge_scripts
            .lock()
            .unwrap()
            .entry(pr_number)
            .or_default()
            .extend(responses);
    }

    /// Make every merge take this long
    pub fn set_merge_delay(&self, delay: Duration) {
        *self.merge_delay.lock().unwrap() = Some(delay);
    }

    /// Give a user a permission level (unknown users have none)
    pub fn grant(&self, login: &str, level: PermissionLevel) {
        self.permissions
            .lock()
            .unwrap()
            .insert(login.to_string(), level);
    }

    /// Helper to set up an open, green, conflict-free PR
    pub fn setup_mergeable_pr(&self, pr_number: u64, head_ref: &str) {
        self.set_pr_details_response(pr_number, make_details(pr_number, head_ref, PrState::Open));
        self.set_merge_readiness_response(pr_number, ready());
    }

    /// Helper to set up an open PR with definitive blockers
    pub fn setup_blocked_pr(&self, pr_number: u64, head_ref: &str, reasons: Vec<String>) {
        self.set_pr_details_response(pr_number, make_details(pr_number, head_ref, PrState::Open));
        self.set_merge_readiness_response(
            pr_number,
            MergeReadiness {
                ci: CiStatus::Failed,
                blocking_reasons: reasons,
                ..ready()
            },
        );
    }

    /// Helper to set up a PR in a given state (merged, closed)
    pub fn setup_pr_in_state(&self, pr_number: u64, head_ref: &str, state: PrState) {
        self.set_pr_details_response(pr_number, make_details(pr_number, head_ref, state));
        self.set_merge_readiness_response(pr_number, ready());
    }

    // === Call verification methods ===

    /// Get all `get_pr_details` calls
    pub fn get_pr_details_calls(&self) -> Vec<u64> {
        self.get_pr_details_calls.lock().unwrap().clone()
    }

    /// Get all `check_merge_readiness` calls
    pub fn get_merge_readiness_calls(&self) -> Vec<u64> {
        self.check_merge_readiness_calls.lock().unwrap().clone()
    }

    /// Get all `merge_pr` calls
    pub fn get_merge_pr_calls(&self) -> Vec<MergePrCall> {
        self.merge_pr_calls.lock().unwrap().clone()
    }

    /// PR numbers in the order `merge_pr` was called
    pub fn merge_order(&self) -> Vec<u64> {
        self.get_merge_pr_calls()
            .iter()
            .map(|c| c.pr_number)
            .collect()
    }

    /// Get all `create_pr_comment` calls
    pub fn get_create_comment_calls(&self) -> Vec<CreateCommentCall> {
        self.create_comment_calls.lock().unwrap().clone()
    }

    /// Comment bodies posted on one PR
    pub fn comments_for(&self, pr_number: u64) -> Vec<String> {
        self.get_create_comment_calls()
            .into_iter()
            .filter(|c| c.pr_number == pr_number)
            .map(|c| c.body)
            .collect()
    }

    /// Get all `get_permission` calls
    pub fn get_permission_calls(&self) -> Vec<String> {
        self.permission_calls.lock().unwrap().clone()
    }

    /// Get all `create_branch` calls as (name, sha)
    pub fn get_create_branch_calls(&self) -> Vec<(String, String)> {
        self.create_branch_calls.lock().unwrap().clone()
    }

    /// Get all `merge_branch` calls
    pub fn get_merge_branch_calls(&self) -> Vec<MergeBranchCall> {
        self.merge_branch_calls.lock().unwrap().clone()
    }

    /// Get all `create_pull_request` calls
    pub fn get_create_pull_request_calls(&self) -> Vec<CreatePullRequestCall> {
        self.create_pull_request_calls.lock().unwrap().clone()
    }

    /// Get count of `merge_pr` calls
    pub fn merge_call_count(&self) -> usize {
        self.merge_pr_calls.lock().unwrap().len()
    }

    /// Highest number of `merge_pr` calls that were running at once
    pub fn max_merges_in_flight(&self) -> usize {
        self.max_merges_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` comments were posted (spawned replies land asynchronously)
    pub async fn wait_for_comments(&self, count: usize) -> Vec<CreateCommentCall> {
        for _ in 0..400 {
            let calls = self.get_create_comment_calls();
            if calls.len() >= count {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} comments, got {:?}",
            self.get_create_comment_calls()
        );
    }

    /// Assert that `merge_pr` was called for a specific PR
    pub fn assert_merge_called(&self, pr_number: u64) {
        let calls = self.get_merge_pr_calls();
        assert!(
            calls.iter().any(|c| c.pr_number == pr_number),
            "Expected merge_pr({pr_number}) but got: {calls:?}"
        );
    }

    /// Assert that `merge_pr` was NOT called for a specific PR
    pub fn assert_merge_not_called(&self, pr_number: u64) {
        let calls = self.get_merge_pr_calls();
        assert!(
            !calls.iter().any(|c| c.pr_number == pr_number),
            "Expected merge_pr({pr_number}) NOT to be called but it was: {calls:?}"
        );
    }
}

/// PR details with predictable refs and SHA
pub fn make_details(pr_number: u64, head_ref: &str, state: PrState) -> PullRequestDetails {
    PullRequestDetails {
        number: pr_number,
        title: format!("PR {pr_number}"),
        state,
        is_draft: false,
        mergeable: Some(true),
        head_ref: head_ref.to_string(),
        head_sha: format!("sha_{pr_number}"),
        base_ref: "main".to_string(),
        html_url: format!("https://github.com/acme/widgets/pull/{pr_number}"),
    }
}

/// Readiness with CI still running
pub fn ci_pending() -> MergeReadiness {
    MergeReadiness {
        ci: CiStatus::Pending,
        uncertainties: vec!["CI still running".to_string()],
        ..ready()
    }
}

/// Readiness with nothing in the way
pub fn ready() -> MergeReadiness {
    MergeReadiness {
        ci: CiStatus::Passed,
        is_mergeable: Some(true),
        is_draft: false,
        blocking_reasons: vec![],
        uncertainties: vec![],
    }
}

#[async_trait]
impl PlatformService for MockPlatformService {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }

    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails> {
        self.get_pr_details_calls.lock().unwrap().push(pr_number);

        let responses = self.pr_details_responses.lock().unwrap();
        responses.get(&pr_number).cloned().ok_or_else(|| {
            Error::GitHubApi(format!(
                "get_pr_details: no response configured for PR #{pr_number}"
            ))
        })
    }

    async fn check_merge_readiness(&self, pr_number: u64) -> Result<MergeReadiness> {
        self.check_merge_readiness_calls
            .lock()
            .unwrap()
            .push(pr_number);

        let scripted = self
            .readiness_scripts
            .lock()
            .unwrap()
            .get_mut(&pr_number)
            .and_then(VecDeque::pop_front);
        if let Some(readiness) = scripted {
            return Ok(readiness);
        }

        let responses = self.merge_readiness_responses.lock().unwrap();
        responses.get(&pr_number).cloned().ok_or_else(|| {
            Error::GitHubApi(format!(
                "check_merge_readiness: no response configured for PR #{pr_number}"
            ))
        })
    }

    async fn merge_pr(
        &self,
        pr_number: u64,
        method: MergeMethod,
        expected_head_sha: Option<&str>,
    ) -> Result<MergeResult> {
        self.merge_pr_calls.lock().unwrap().push(MergePrCall {
            pr_number,
            method,
            expected_head_sha: expected_head_sha.map(ToString::to_string),
        });

        let now = self.merges_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_merges_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.merges_in_flight);

        let delay = *self.merge_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .merge_scripts
            .lock()
            .unwrap()
            .get_mut(&pr_number)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MergeResponse::Merged);

        let merged = || MergeResult {
            merged: true,
            sha: Some(format!("merged_sha_{pr_number}")),
            message: None,
        };

        match response {
            MergeResponse::Merged => Ok(merged()),
            MergeResponse::Transient(msg) => Err(Error::Transient(msg)),
            MergeResponse::Blocked(msg) => Err(Error::MergeBlocked(msg)),
            MergeResponse::NotMerged(msg) => Ok(MergeResult {
                merged: false,
                sha: None,
                message: Some(msg),
            }),
            MergeResponse::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(merged())
            }
        }
    }

    async fn create_pr_comment(&self, pr_number: u64, body: &str) -> Result<()> {
        self.create_comment_calls
            .lock()
            .unwrap()
            .push(CreateCommentCall {
                pr_number,
                body: body.to_string(),
            });

        // Check for injected error
        if let Some(msg) = self.error_on_comment.lock().unwrap().as_ref() {
            return Err(Error::GitHubApi(msg.clone()));
        }
        Ok(())
    }

    async fn get_permission(&self, login: &str) -> Result<PermissionLevel> {
        self.permission_calls
            .lock()
            .unwrap()
            .push(login.to_string());

        // Check for injected error
        if let Some(msg) = self.error_on_permission.lock().unwrap().as_ref() {
            return Err(Error::GitHubApi(msg.clone()));
        }

        Ok(self
            .permissions
            .lock()
            .unwrap()
            .get(login)
            .copied()
            .unwrap_or(PermissionLevel::None))
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        self.create_branch_calls
            .lock()
            .unwrap()
            .push((name.to_string(), sha.to_string()));
        Ok(())
    }

    async fn merge_branch(&self, base: &str, head: &str) -> Result<()> {
        self.merge_branch_calls.lock().unwrap().push(MergeBranchCall {
            base: base.to_string(),
            head: head.to_string(),
        });

        if self.conflicting_heads.lock().unwrap().contains(head) {
            return Err(Error::MergeBlocked(format!("`{head}` conflicts with `{base}`")));
        }
        Ok(())
    }

    async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestDetails> {
        let number = self.next_pr_number.fetch_add(1, Ordering::SeqCst);
        self.create_pull_request_calls
            .lock()
            .unwrap()
            .push(CreatePullRequestCall {
                number,
                title: title.to_string(),
                body: body.to_string(),
                head: head.to_string(),
                base: base.to_string(),
            });

        let details = PullRequestDetails {
            base_ref: base.to_string(),
            title: title.to_string(),
            ..make_details(number, head, PrState::Open)
        };
        self.setup_mergeable_pr(number, head);
        self.set_pr_details_response(number, details.clone());
        Ok(details)
    }
}
