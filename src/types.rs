//! Core types for mergequeue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a merge request: repository full name plus PR number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId {
    /// Repository full name (`owner/name`)
    pub repo: String,
    /// Pull request number
    pub number: u64,
}

impl RequestId {
    /// Create a new request identifier
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Lifecycle status of a queued merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// Waiting in the queue
    Pending,
    /// Being executed by the drain worker
    InProgress,
    /// Merged into the target branch
    Merged,
    /// Gave up: merge blocked or retries exhausted
    Failed,
    /// Withdrawn before execution started
    Cancelled,
}

impl MergeStatus {
    /// Whether this status ends the request's life in the queue
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` respects the monotonic lifecycle
    ///
    /// Pending → InProgress → {Merged, Failed}, and Pending → Cancelled.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Cancelled)
                | (Self::InProgress, Self::Merged | Self::Failed)
        )
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in progress"),
            Self::Merged => write!(f, "merged"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A request to merge one pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Unique identifier
    pub id: RequestId,
    /// Head branch of the PR
    pub source_ref: String,
    /// Base branch the PR merges into
    pub target_ref: String,
    /// Login of the user who asked for the merge
    pub requester: String,
    /// When the request was admitted
    pub arrived_at: DateTime<Utc>,
    /// Current status
    pub status: MergeStatus,
}

impl MergeRequest {
    /// Create a pending request stamped with the current time
    pub fn new(
        id: RequestId,
        source_ref: impl Into<String>,
        target_ref: impl Into<String>,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
            requester: requester.into(),
            arrived_at: Utc::now(),
            status: MergeStatus::Pending,
        }
    }
}

/// Outcome of a single merge attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The PR is merged
    Merged,
    /// Nothing failed, but CI or GitHub has not finished yet
    Waiting(String),
    /// Failed in a way worth retrying
    Transient(String),
    /// Failed in a way retrying cannot fix
    Blocked(String),
}

/// Immutable record of one merge attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeAttempt {
    /// Request the attempt belongs to
    pub request_id: RequestId,
    /// 1-based attempt number
    pub attempt: u32,
    /// What happened
    pub outcome: AttemptOutcome,
    /// When the attempt finished
    pub at: DateTime<Utc>,
}

/// Platform configuration
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Custom API host (None for github.com)
    pub host: Option<String>,
}

impl PlatformConfig {
    /// `owner/name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// PR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrState {
    /// PR is open and can be merged
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// PR details needed to queue and merge a pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestDetails {
    /// PR number
    pub number: u64,
    /// PR title
    pub title: String,
    /// Current state of the PR
    pub state: PrState,
    /// Whether PR is a draft
    pub is_draft: bool,
    /// Whether PR can be merged (None while GitHub is still computing)
    pub mergeable: Option<bool>,
    /// Head branch name
    pub head_ref: String,
    /// Head commit SHA
    pub head_sha: String,
    /// Base branch name
    pub base_ref: String,
    /// Web URL for the PR
    pub html_url: String,
}

/// Aggregate CI state of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiStatus {
    /// All checks passed (or none configured)
    Passed,
    /// At least one check is still running
    Pending,
    /// At least one check failed
    Failed,
}

/// Merge readiness check result
#[derive(Debug, Clone)]
pub struct MergeReadiness {
    /// CI state of the head commit
    pub ci: CiStatus,
    /// Whether the PR can be merged (no conflicts)
    /// - `Some(true)` = mergeable
    /// - `Some(false)` = has conflicts
    /// - `None` = unknown (GitHub still computing)
    pub is_mergeable: Option<bool>,
    /// Whether the PR is a draft
    pub is_draft: bool,
    /// Human-readable reasons why the PR cannot be merged (definitive blockers)
    pub blocking_reasons: Vec<String>,
    /// Reasons why merge status is uncertain (may resolve by waiting)
    pub uncertainties: Vec<String>,
}

impl MergeReadiness {
    /// Check if there are definitive blockers preventing merge.
    pub fn is_blocked(&self) -> bool {
        !self.blocking_reasons.is_empty()
    }

    /// Returns the first uncertainty reason, if any.
    pub fn uncertainty(&self) -> Option<&str> {
        self.uncertainties.first().map(String::as_str)
    }
}

/// Result of a merge operation
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}

/// Merge strategy/method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    /// Squash all commits into one
    Squash,
    /// Create a merge commit
    Merge,
    /// Rebase commits onto base branch
    #[default]
    Rebase,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

/// Repository permission level, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// No access
    None,
    /// Read-only
    Read,
    /// Can manage issues and PRs without write access
    Triage,
    /// Can push
    #[default]
    Write,
    /// Can manage the repository without admin rights
    Maintain,
    /// Full control
    Admin,
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "read" | "pull" => Ok(Self::Read),
            "triage" => Ok(Self::Triage),
            "write" | "push" => Ok(Self::Write),
            "maintain" => Ok(Self::Maintain),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown permission level `{other}`")),
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Read => write!(f, "read"),
            Self::Triage => write!(f, "triage"),
            Self::Write => write!(f, "write"),
            Self::Maintain => write!(f, "maintain"),
            Self::Admin => write!(f, "admin"),
        }
    }
}
