//! Merge execution - effectful operations
//!
//! One request at a time: fetch the PR, check readiness, merge at the head
//! SHA we just looked at. Pending CI is polled until `ci_wait` runs out.
//! Transient failures back off and retry; anything else fails the request.
//! Every attempt is recorded, and the reporter hears about the terminal
//! outcome exactly once.

use super::retry::{Classifier, ErrorClass, RetryPolicy, classify};
use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::report::StatusReporter;
use crate::types::{
    AttemptOutcome, MergeAttempt, MergeMethod, MergeRequest, MergeStatus, PrState, RequestId,
};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Number of attempt records kept for inspection.
const AUDIT_CAPACITY: usize = 256;

/// Terminal result of processing one request
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Request processed
    pub request_id: RequestId,
    /// `Merged` or `Failed`
    pub status: MergeStatus,
    /// Every attempt made, in order
    pub attempts: Vec<MergeAttempt>,
    /// Why the request failed
    pub reason: Option<String>,
    /// Merge commit SHA, when GitHub reported one
    pub sha: Option<String>,
}

impl ExecutionOutcome {
    /// Check if the request ended merged
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.status == MergeStatus::Merged
    }
}

/// What a successful attempt produced
#[derive(Debug)]
struct AttemptSuccess {
    sha: Option<String>,
    already_merged: bool,
}

/// Where one attempt left the request
#[derive(Debug)]
enum Step {
    Merged(AttemptSuccess),
    /// CI or mergeability not settled yet
    Waiting(String),
}

/// Performs merges for the drain worker
pub struct MergeExecutor {
    platform: Arc<dyn PlatformService>,
    reporter: StatusReporter,
    policy: RetryPolicy,
    method: MergeMethod,
    classify: Classifier,
    audit: Mutex<VecDeque<MergeAttempt>>,
}

impl MergeExecutor {
    /// Create an executor using the default error classification
    pub fn new(
        platform: Arc<dyn PlatformService>,
        reporter: StatusReporter,
        policy: RetryPolicy,
        method: MergeMethod,
    ) -> Self {
        Self {
            platform,
            reporter,
            policy,
            method,
            classify,
            audit: Mutex::new(VecDeque::with_capacity(AUDIT_CAPACITY)),
        }
    }

    /// Replace the error classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classify = classifier;
        self
    }

    /// Retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Most recent attempt records, oldest first
    pub fn audit_trail(&self) -> Vec<MergeAttempt> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, attempts: &mut Vec<MergeAttempt>, attempt: MergeAttempt) {
        {
            let mut audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
            if audit.len() == AUDIT_CAPACITY {
                audit.pop_front();
            }
            audit.push_back(attempt.clone());
        }
        attempts.push(attempt);
    }

    /// Merge one request, retrying transient failures, then report the outcome
    ///
    /// Never returns an error: every failure ends as a `Failed` outcome.
    /// While CI is still running the request waits, polling readiness, for up
    /// to `ci_wait`; those polls do not use up the retry budget.
    pub async fn process(&self, request: &MergeRequest) -> ExecutionOutcome {
        let pr_number = request.id.number;
        let max_attempts = self.policy.attempts();
        info!(id = %request.id, source = %request.source_ref, target = %request.target_ref, "merging");

        let started = Instant::now();
        let mut attempts = Vec::new();
        let mut failures = 0;
        let mut attempt = 0;

        let (status, reason, sha) = loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.attempt_once(pr_number),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(self.policy.attempt_timeout)),
            };

            let (outcome, finished) = match result {
                Ok(Step::Merged(success)) => {
                    if success.already_merged {
                        info!(id = %request.id, "pull request was already merged");
                    }
                    (
                        AttemptOutcome::Merged,
                        Some((MergeStatus::Merged, None, success.sha)),
                    )
                }
                Ok(Step::Waiting(reason)) => {
                    let finished = (started.elapsed() >= self.policy.ci_wait).then(|| {
                        let reason = format!(
                            "gave up waiting after {}s: {reason}",
                            self.policy.ci_wait.as_secs()
                        );
                        warn!(id = %request.id, reason = %reason, "CI wait exceeded");
                        (MergeStatus::Failed, Some(reason), None)
                    });
                    (AttemptOutcome::Waiting(reason), finished)
                }
                Err(e) => {
                    let reason = e.to_string();
                    match (self.classify)(&e) {
                        ErrorClass::Blocked => {
                            warn!(id = %request.id, attempt, reason = %reason, "merge blocked");
                            (
                                AttemptOutcome::Blocked(reason.clone()),
                                Some((MergeStatus::Failed, Some(reason), None)),
                            )
                        }
                        ErrorClass::Transient => {
                            failures += 1;
                            let finished = (failures >= max_attempts).then(|| {
                                let reason =
                                    format!("gave up after {max_attempts} attempts: {reason}");
                                warn!(id = %request.id, reason = %reason, "retries exhausted");
                                (MergeStatus::Failed, Some(reason), None)
                            });
                            (AttemptOutcome::Transient(reason), finished)
                        }
                    }
                }
            };

            let delay = match &outcome {
                AttemptOutcome::Waiting(reason) => {
                    debug!(id = %request.id, attempt, reason = %reason, "waiting for CI");
                    self.policy.ci_poll_interval
                }
                AttemptOutcome::Transient(reason) => {
                    let delay = self.policy.delay_after(failures);
                    if finished.is_none() {
                        warn!(
                            id = %request.id,
                            attempt = failures,
                            max_attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            reason = %reason,
                            "merge attempt failed, retrying"
                        );
                    }
                    delay
                }
                AttemptOutcome::Merged | AttemptOutcome::Blocked(_) => Duration::ZERO,
            };

            self.record(
                &mut attempts,
                MergeAttempt {
                    request_id: request.id.clone(),
                    attempt,
                    outcome,
                    at: Utc::now(),
                },
            );

            if let Some(finished) = finished {
                break finished;
            }
            tokio::time::sleep(delay).await;
        };

        let outcome = ExecutionOutcome {
            request_id: request.id.clone(),
            status,
            attempts,
            reason,
            sha,
        };

        self.reporter.report_outcome(request, &outcome).await;
        outcome
    }

    async fn attempt_once(&self, pr_number: u64) -> Result<Step> {
        let details = self.platform.get_pr_details(pr_number).await?;
        match details.state {
            PrState::Merged => {
                return Ok(Step::Merged(AttemptSuccess {
                    sha: None,
                    already_merged: true,
                }));
            }
            PrState::Closed => {
                return Err(Error::MergeBlocked("pull request is closed".to_string()));
            }
            PrState::Open => {}
        }

        let readiness = self.platform.check_merge_readiness(pr_number).await?;
        if readiness.is_blocked() {
            return Err(Error::MergeBlocked(readiness.blocking_reasons.join(", ")));
        }
        if let Some(reason) = readiness.uncertainty() {
            return Ok(Step::Waiting(reason.to_string()));
        }

        debug!(pr_number, head_sha = %details.head_sha, method = %self.method, "calling merge API");
        let result = self
            .platform
            .merge_pr(pr_number, self.method, Some(&details.head_sha))
            .await?;

        if !result.merged {
            return Err(Error::MergeBlocked(
                result
                    .message
                    .unwrap_or_else(|| "merge was not performed".to_string()),
            ));
        }

        Ok(Step::Merged(AttemptSuccess {
            sha: result.sha,
            already_merged: false,
        }))
    }
}

impl std::fmt::Debug for MergeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeExecutor")
            .field("policy", &self.policy)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}
