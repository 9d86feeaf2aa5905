//! Platform services
//!
//! The remote side of the merge queue: PR lookups, readiness checks, the merge
//! call itself, comments and commenter permissions.

mod github;

pub use github::GitHubService;

use crate::error::Result;
use crate::types::{
    MergeMethod, MergeReadiness, MergeResult, PermissionLevel, PlatformConfig, PullRequestDetails,
};
use async_trait::async_trait;

/// Platform service trait for PR operations
///
/// Everything the queue needs from the hosting platform goes through this
/// trait, so the executor and dispatcher can be driven by a mock in tests.
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Get the platform configuration
    fn config(&self) -> &PlatformConfig;

    /// Get PR details including refs, head SHA and state
    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails>;

    /// Check if PR is ready to merge
    ///
    /// Checks draft status, CI status, and merge conflicts.
    async fn check_merge_readiness(&self, pr_number: u64) -> Result<MergeReadiness>;

    /// Merge a PR with the specified method
    ///
    /// When `expected_head_sha` is set the platform refuses the merge if the
    /// head moved since the readiness check.
    async fn merge_pr(
        &self,
        pr_number: u64,
        method: MergeMethod,
        expected_head_sha: Option<&str>,
    ) -> Result<MergeResult>;

    /// Create a comment on a PR
    async fn create_pr_comment(&self, pr_number: u64, body: &str) -> Result<()>;

    /// Look up a user's permission level on the repository
    async fn get_permission(&self, login: &str) -> Result<PermissionLevel>;

    /// Create branch `name` pointing at `sha`
    async fn create_branch(&self, name: &str, sha: &str) -> Result<()>;

    /// Merge `head` into branch `base` on the server
    ///
    /// A conflict is reported as [`Error::MergeBlocked`](crate::error::Error::MergeBlocked).
    async fn merge_branch(&self, base: &str, head: &str) -> Result<()>;

    /// Open a pull request from `head` into `base`
    async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestDetails>;
}
