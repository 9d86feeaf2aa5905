//! Status reporting back to the pull request
//!
//! Reporting is best-effort: a failed comment is logged and never changes
//! the outcome of a merge or the answer to a webhook.

use crate::merge::ExecutionOutcome;
use crate::platform::PlatformService;
use crate::types::{MergeRequest, MergeStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix on every comment the app writes; comments starting with it are ignored on ingress
pub const APP_PREFIX: &str = "***[from mergequeue]***";

/// Posts status comments on pull requests
#[derive(Clone)]
pub struct StatusReporter {
    platform: Arc<dyn PlatformService>,
}

impl StatusReporter {
    /// Reporter posting through the given platform
    pub fn new(platform: Arc<dyn PlatformService>) -> Self {
        Self { platform }
    }

    /// Post `message` on the pull request, prefixed with [`APP_PREFIX`]
    ///
    /// Returns whether the comment was delivered.
    pub async fn post(&self, pr_number: u64, message: &str) -> bool {
        let body = format!("{APP_PREFIX} {message}");
        match self.platform.create_pr_comment(pr_number, &body).await {
            Ok(()) => {
                debug!(pr_number, "status comment posted");
                true
            }
            Err(e) => {
                warn!(pr_number, error = %e, "failed to post status comment");
                false
            }
        }
    }

    /// Tell the requester how their merge ended
    pub async fn report_outcome(&self, request: &MergeRequest, outcome: &ExecutionOutcome) {
        self.post(request.id.number, &outcome_message(request, outcome))
            .await;
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").finish_non_exhaustive()
    }
}

/// Comment text for a terminal outcome
#[must_use]
pub fn outcome_message(request: &MergeRequest, outcome: &ExecutionOutcome) -> String {
    let attempts = outcome.attempts.len();
    let plural = if attempts == 1 { "" } else { "s" };
    match outcome.status {
        MergeStatus::Merged => match &outcome.sha {
            Some(sha) => format!(
                "`{}` successfully merged into `{}` ({sha})",
                request.source_ref, request.target_ref
            ),
            None => format!(
                "`{}` successfully merged into `{}`",
                request.source_ref, request.target_ref
            ),
        },
        _ => format!(
            "Merging `{}` into `{}` failed after {attempts} attempt{plural}: {}",
            request.source_ref,
            request.target_ref,
            outcome.reason.as_deref().unwrap_or("unknown error")
        ),
    }
}
