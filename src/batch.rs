//! Batch merges
//!
//! `try-batchmerge` collects pull requests until the batch is full. A full
//! batch becomes one branch holding every member's head, and one pull request
//! for that branch. The batch pull request then goes through the regular
//! merge queue like any other.

use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::report::APP_PREFIX;
use crate::types::PullRequestDetails;
use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Pull requests collected per batch unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// One pull request waiting in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMember {
    /// Pull request number
    pub number: u64,
    /// Branch to merge into the batch branch
    pub head_ref: String,
    /// Head commit when the member was added
    pub head_sha: String,
    /// Branch the pull request targets
    pub base_ref: String,
    /// Web link, listed in the batch pull request body
    pub html_url: String,
}

impl From<&PullRequestDetails> for BatchMember {
    fn from(details: &PullRequestDetails) -> Self {
        Self {
            number: details.number,
            head_ref: details.head_ref.clone(),
            head_sha: details.head_sha.clone(),
            base_ref: details.base_ref.clone(),
            html_url: details.html_url.clone(),
        }
    }
}

/// Result of adding a pull request to the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAdd {
    /// Added; the batch is still filling
    Waiting {
        /// Members collected so far
        collected: usize,
    },
    /// Already collected
    Duplicate,
    /// Targets a different branch than the batch being collected
    TargetMismatch {
        /// Target of the batch being collected
        expected: String,
    },
    /// Added and the batch is complete; the collector starts over empty
    Full(Vec<BatchMember>),
}

/// Collects pull requests for the next batch
#[derive(Debug)]
pub struct BatchCollector {
    size: usize,
    members: Mutex<Vec<BatchMember>>,
}

impl BatchCollector {
    /// Collector that fills at `size` members (at least one)
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            members: Mutex::new(Vec::new()),
        }
    }

    /// Members per batch
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this pull request is waiting in the current batch
    #[must_use]
    pub fn contains(&self, number: u64) -> bool {
        self.lock().iter().any(|m| m.number == number)
    }

    /// Add a member, handing back the whole batch once it is full
    pub fn add(&self, member: BatchMember) -> BatchAdd {
        let mut members = self.lock();
        if members.iter().any(|m| m.number == member.number) {
            return BatchAdd::Duplicate;
        }
        if let Some(first) = members.first()
            && first.base_ref != member.base_ref
        {
            return BatchAdd::TargetMismatch {
                expected: first.base_ref.clone(),
            };
        }

        members.push(member);
        if members.len() >= self.size {
            BatchAdd::Full(std::mem::take(&mut *members))
        } else {
            BatchAdd::Waiting {
                collected: members.len(),
            }
        }
    }

    /// Drop a pull request from the current batch
    ///
    /// Returns whether it was there.
    pub fn remove(&self, number: u64) -> bool {
        let mut members = self.lock();
        let before = members.len();
        members.retain(|m| m.number != number);
        members.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BatchMember>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A member whose branch could not be merged into the batch branch
#[derive(Debug, Clone)]
pub struct SkippedMember {
    /// The member left out
    pub member: BatchMember,
    /// Why its branch could not be merged
    pub reason: String,
}

/// What assembling a batch produced
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    /// Name of the batch branch
    pub branch: String,
    /// Batch pull request; `None` when no member could be merged
    pub pull_request: Option<PullRequestDetails>,
    /// Members merged into the batch branch
    pub included: Vec<BatchMember>,
    /// Members left out because their branch did not merge
    pub skipped: Vec<SkippedMember>,
}

/// Name of the branch for a batch: `batch-<unix time>-<member numbers>`
#[must_use]
pub fn branch_name(members: &[BatchMember]) -> String {
    let numbers: Vec<String> = members.iter().map(|m| m.number.to_string()).collect();
    format!("batch-{}-{}", Utc::now().timestamp(), numbers.join("-"))
}

/// Body of the batch pull request
#[must_use]
pub fn pull_request_body(members: &[BatchMember]) -> String {
    let list: String = members
        .iter()
        .map(|m| format!("- [#{}]({})\n", m.number, m.html_url))
        .collect();
    format!("{APP_PREFIX} Batch merge attempt for the following pull requests:\n{list}")
}

/// Create the batch branch, merge every member into it and open the batch pull request
///
/// The branch starts at the first member's head. A member whose branch does
/// not merge is skipped; only when every member is skipped does no pull
/// request get opened.
///
/// # Errors
///
/// Fails when the branch or the pull request cannot be created, or when a
/// member merge fails for a reason other than a conflict.
pub async fn assemble(
    platform: &dyn PlatformService,
    mention: &str,
    members: Vec<BatchMember>,
) -> Result<AssembledBatch> {
    let Some(first) = members.first() else {
        return Err(Error::Internal("cannot assemble an empty batch".to_string()));
    };
    let base = first.base_ref.clone();
    let branch = branch_name(&members);

    platform.create_branch(&branch, &first.head_sha).await?;
    debug!(branch = %branch, sha = %first.head_sha, "created batch branch");

    let mut included = Vec::new();
    let mut skipped = Vec::new();
    for member in members {
        match platform.merge_branch(&branch, &member.head_ref).await {
            Ok(()) => {
                debug!(branch = %branch, pr_number = member.number, "added to batch branch");
                included.push(member);
            }
            Err(Error::MergeBlocked(reason)) => {
                info!(branch = %branch, pr_number = member.number, reason = %reason, "left out of batch");
                skipped.push(SkippedMember { member, reason });
            }
            Err(e) => return Err(e),
        }
    }

    if included.is_empty() {
        warn!(branch = %branch, "no pull request could be added to the batch");
        return Ok(AssembledBatch {
            branch,
            pull_request: None,
            included,
            skipped,
        });
    }

    let title = format!("{mention} Batch merge with `{branch}`");
    let pull_request = platform
        .create_pull_request(&title, &pull_request_body(&included), &branch, &base)
        .await?;
    info!(pr_number = pull_request.number, branch = %branch, "opened batch pull request");

    Ok(AssembledBatch {
        branch,
        pull_request: Some(pull_request),
        included,
        skipped,
    })
}
