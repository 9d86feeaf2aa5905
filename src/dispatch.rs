//! Webhook dispatch: from a verified delivery to a queue operation
//!
//! Order of checks for every delivery:
//! 1. signature (nothing else runs on a bad one)
//! 2. event type and payload shape
//! 3. repository, author and command
//! 4. commenter permission
//! 5. exactly one queue operation (a full batch assembles its branch and
//!    pull request first)
//!
//! Replies to the pull request are spawned so the HTTP answer never waits on
//! them.

use crate::batch::{self, BatchAdd, BatchCollector, BatchMember, DEFAULT_BATCH_SIZE};
use crate::platform::PlatformService;
use crate::queue::{CancelOutcome, EnqueueOutcome, MergeQueue, RejectReason};
use crate::report::{APP_PREFIX, StatusReporter};
use crate::types::{MergeRequest, PermissionLevel, PrState, RequestId};
use crate::webhook::{
    CommandParser, EventKind, IssueCommentPayload, ParsedComment, PullRequestComment,
    QueueCommand, SignatureVerifier, WebhookError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw inbound delivery as taken off the wire
#[derive(Debug, Clone, Copy)]
pub struct InboundEvent<'a> {
    /// `X-GitHub-Event`
    pub event: Option<&'a str>,
    /// `X-Hub-Signature-256`
    pub signature: Option<&'a str>,
    /// `X-GitHub-Delivery`, for logs only
    pub delivery: Option<&'a str>,
    /// Unparsed request body
    pub body: &'a [u8],
}

/// What a successfully handled delivery did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Answered a `ping`
    Pong,
    /// Valid delivery the queue does not act on
    Ignored(String),
    /// New request admitted
    Enqueued {
        /// 1-based queue position
        position: usize,
    },
    /// Request was already queued
    Duplicate {
        /// 1-based queue position
        position: usize,
    },
    /// Pending request withdrawn
    Cancelled,
    /// Nothing to cancel
    CancelNotFound,
    /// Request already being merged
    CancelTooLate,
    /// Collected for the next batch, which is not full yet
    Batched {
        /// Members collected so far
        collected: usize,
    },
    /// Already waiting in the current batch
    BatchDuplicate,
    /// Batch was full; its pull request is now queued
    BatchEnqueued {
        /// Number of the batch pull request
        pr_number: u64,
        /// 1-based queue position
        position: usize,
        /// Pull requests merged into the batch branch
        members: Vec<u64>,
    },
}

impl DispatchOutcome {
    /// Stable machine-readable name used in response bodies
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Ignored(_) => "ignored",
            Self::Enqueued { .. } => "enqueued",
            Self::Duplicate { .. } => "duplicate",
            Self::Cancelled => "cancelled",
            Self::CancelNotFound => "not_found",
            Self::CancelTooLate => "too_late",
            Self::Batched { .. } => "batched",
            Self::BatchDuplicate => "batch_duplicate",
            Self::BatchEnqueued { .. } => "batch_enqueued",
        }
    }
}

/// Routes verified comment commands to the queue
pub struct Dispatcher {
    verifier: SignatureVerifier,
    parser: CommandParser,
    queue: Arc<MergeQueue>,
    platform: Arc<dyn PlatformService>,
    reporter: StatusReporter,
    required_permission: PermissionLevel,
    batch: BatchCollector,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        verifier: SignatureVerifier,
        parser: CommandParser,
        queue: Arc<MergeQueue>,
        platform: Arc<dyn PlatformService>,
        reporter: StatusReporter,
        required_permission: PermissionLevel,
    ) -> Self {
        Self {
            verifier,
            parser,
            queue,
            platform,
            reporter,
            required_permission,
            batch: BatchCollector::new(DEFAULT_BATCH_SIZE),
        }
    }

    /// Set how many pull requests make up one batch merge
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch = BatchCollector::new(size);
        self
    }

    /// Queue this dispatcher feeds
    pub fn queue(&self) -> &Arc<MergeQueue> {
        &self.queue
    }

    /// Handle one delivery
    ///
    /// # Errors
    ///
    /// Returns the rejection to send back: bad signature, malformed payload,
    /// unauthorized commenter, or a queue that cannot admit.
    pub async fn handle(
        &self,
        event: InboundEvent<'_>,
    ) -> std::result::Result<DispatchOutcome, WebhookError> {
        let delivery = event.delivery.unwrap_or("-");

        if let Err(e) = self.verifier.verify(event.body, event.signature) {
            warn!(delivery, error = %e, "rejected webhook delivery");
            return Err(e);
        }

        let kind = event
            .event
            .map(EventKind::from_header)
            .ok_or_else(|| WebhookError::InvalidPayload("missing X-GitHub-Event header".into()))?;

        match kind {
            EventKind::Ping => {
                info!(delivery, "received ping");
                Ok(DispatchOutcome::Pong)
            }
            EventKind::Other(name) => {
                debug!(delivery, event = %name, "ignoring event");
                Ok(DispatchOutcome::Ignored(format!("event `{name}` is not handled")))
            }
            EventKind::IssueComment => {
                let payload = IssueCommentPayload::parse(event.body)?;
                match payload.into_pull_request_comment() {
                    Ok(comment) => self.on_pull_request_comment(delivery, comment).await,
                    Err(reason) => {
                        debug!(delivery, reason, "ignoring comment");
                        Ok(DispatchOutcome::Ignored(reason.to_string()))
                    }
                }
            }
        }
    }

    async fn on_pull_request_comment(
        &self,
        delivery: &str,
        comment: PullRequestComment,
    ) -> std::result::Result<DispatchOutcome, WebhookError> {
        let repository = self.platform.config().full_name();
        if !comment.repository.eq_ignore_ascii_case(&repository) {
            return Err(WebhookError::InvalidPayload(format!(
                "repository {} is not served here",
                comment.repository
            )));
        }

        if comment.body.trim_start().starts_with(APP_PREFIX) {
            return Ok(DispatchOutcome::Ignored("comment written by mergequeue".into()));
        }

        let pr_number = comment.pr_number;
        let command = match self.parser.parse(&comment.body) {
            ParsedComment::NotAddressed => {
                return Ok(DispatchOutcome::Ignored(format!(
                    "comment does not mention {}",
                    self.parser.mention()
                )));
            }
            ParsedComment::Unknown(word) => {
                let reason = match word {
                    Some(word) => format!("unknown command `{word}`"),
                    None => "no command provided".to_string(),
                };
                info!(delivery, pr_number, reason = %reason, "unrecognized command");
                self.reply(pr_number, format!("Failed to process command (reason: {reason})"));
                return Err(WebhookError::InvalidPayload(reason));
            }
            ParsedComment::Command(command) => command,
        };

        self.authorize(pr_number, &comment.author).await?;
        info!(delivery, pr_number, author = %comment.author, %command, "processing command");

        let id = RequestId::new(repository, pr_number);
        match command {
            QueueCommand::Merge => self.on_merge(id, &comment.author).await,
            QueueCommand::BatchMerge => self.on_batch_merge(id, &comment.author).await,
            QueueCommand::Cancel => Ok(self.on_cancel(&id)),
        }
    }

    async fn authorize(&self, pr_number: u64, login: &str) -> std::result::Result<(), WebhookError> {
        let level = match self.platform.get_permission(login).await {
            Ok(level) => level,
            Err(e) => {
                warn!(login, error = %e, "permission lookup failed, denying");
                PermissionLevel::None
            }
        };

        if level >= self.required_permission {
            return Ok(());
        }

        info!(login, %level, required = %self.required_permission, "unauthorized command");
        self.reply(
            pr_number,
            format!(
                "User @{login} doesn't have `{}` permission on `{}`.",
                self.required_permission,
                self.platform.config().full_name()
            ),
        );
        Err(WebhookError::Unauthorized(login.to_string()))
    }

    async fn on_merge(
        &self,
        id: RequestId,
        requester: &str,
    ) -> std::result::Result<DispatchOutcome, WebhookError> {
        let pr_number = id.number;

        // Duplicate requests must not wait on the API.
        if let Some(position) = self.queue.position(&id) {
            self.reply(pr_number, already_queued(position));
            return Ok(DispatchOutcome::Duplicate { position });
        }

        let details = self.platform.get_pr_details(pr_number).await.map_err(|e| {
            warn!(pr_number, error = %e, "failed to fetch pull request");
            WebhookError::Internal(format!("failed to fetch pull request #{pr_number}"))
        })?;

        if details.state != PrState::Open {
            let reason = format!("pull request is {}", details.state);
            self.reply(pr_number, format!("Nothing to merge ({reason})."));
            return Ok(DispatchOutcome::Ignored(reason));
        }

        let request = MergeRequest::new(id, details.head_ref, details.base_ref, requester);
        match self.queue.enqueue(request) {
            EnqueueOutcome::Admitted { position } => {
                self.reply(
                    pr_number,
                    format!("Pull request added to the merge queue (position {position})."),
                );
                Ok(DispatchOutcome::Enqueued { position })
            }
            EnqueueOutcome::Duplicate { position } => {
                self.reply(pr_number, already_queued(position));
                Ok(DispatchOutcome::Duplicate { position })
            }
            EnqueueOutcome::Rejected(RejectReason::QueueFull { capacity }) => {
                self.reply(
                    pr_number,
                    format!("Merge queue is full ({capacity} pending), try again later."),
                );
                Err(WebhookError::QueueFull(capacity))
            }
            EnqueueOutcome::Rejected(RejectReason::Closed) => Err(WebhookError::QueueClosed),
        }
    }

    async fn on_batch_merge(
        &self,
        id: RequestId,
        requester: &str,
    ) -> std::result::Result<DispatchOutcome, WebhookError> {
        let pr_number = id.number;

        if self.batch.contains(pr_number) {
            self.reply(pr_number, BATCH_DUPLICATE.to_string());
            return Ok(DispatchOutcome::BatchDuplicate);
        }

        let details = self.platform.get_pr_details(pr_number).await.map_err(|e| {
            warn!(pr_number, error = %e, "failed to fetch pull request");
            WebhookError::Internal(format!("failed to fetch pull request #{pr_number}"))
        })?;

        if details.state != PrState::Open {
            let reason = format!("pull request is {}", details.state);
            self.reply(pr_number, format!("Nothing to merge ({reason})."));
            return Ok(DispatchOutcome::Ignored(reason));
        }

        let members = match self.batch.add(BatchMember::from(&details)) {
            BatchAdd::Waiting { collected } => {
                info!(pr_number, collected, size = self.batch.size(), "added to batch");
                self.reply(
                    pr_number,
                    "Pull request added to the batch merge queue. It will be processed soon."
                        .to_string(),
                );
                return Ok(DispatchOutcome::Batched { collected });
            }
            BatchAdd::Duplicate => {
                self.reply(pr_number, BATCH_DUPLICATE.to_string());
                return Ok(DispatchOutcome::BatchDuplicate);
            }
            BatchAdd::TargetMismatch { expected } => {
                let reason = format!(
                    "batch being collected targets `{expected}`, not `{}`",
                    details.base_ref
                );
                self.reply(pr_number, format!("Failed to process command (reason: {reason})"));
                return Ok(DispatchOutcome::Ignored(reason));
            }
            BatchAdd::Full(members) => members,
        };

        let numbers: Vec<u64> = members.iter().map(|m| m.number).collect();
        let assembled = batch::assemble(self.platform.as_ref(), self.parser.mention(), members)
            .await
            .map_err(|e| {
                warn!(members = ?numbers, error = %e, "failed to assemble batch");
                for number in &numbers {
                    self.reply(*number, format!("Batch merge could not be prepared: {e}"));
                }
                WebhookError::Internal("failed to assemble batch merge".to_string())
            })?;

        for skipped in &assembled.skipped {
            self.reply(
                skipped.member.number,
                format!(
                    "Batch branch `{}` could not take `{}` ({}); left out of the batch.",
                    assembled.branch, skipped.member.head_ref, skipped.reason
                ),
            );
        }

        let Some(batch_pr) = assembled.pull_request else {
            return Ok(DispatchOutcome::Ignored(format!(
                "no pull request could be added to `{}`",
                assembled.branch
            )));
        };

        let members: Vec<u64> = assembled.included.iter().map(|m| m.number).collect();
        let request = MergeRequest::new(
            RequestId::new(id.repo, batch_pr.number),
            batch_pr.head_ref,
            batch_pr.base_ref,
            requester,
        );
        match self.queue.enqueue(request) {
            EnqueueOutcome::Admitted { position } | EnqueueOutcome::Duplicate { position } => {
                info!(pr_number = batch_pr.number, position, ?members, "batch queued");
                for number in &members {
                    self.reply(
                        *number,
                        format!(
                            "Commits added to `{}` branch. Check batch merge pull request [#{}]({}) associated with this branch to know merge status.",
                            assembled.branch, batch_pr.number, batch_pr.html_url
                        ),
                    );
                }
                Ok(DispatchOutcome::BatchEnqueued {
                    pr_number: batch_pr.number,
                    position,
                    members,
                })
            }
            EnqueueOutcome::Rejected(RejectReason::QueueFull { capacity }) => {
                for number in members.iter().copied().chain([batch_pr.number]) {
                    self.reply(
                        number,
                        format!(
                            "Merge queue is full ({capacity} pending), batch pull request #{} was not queued.",
                            batch_pr.number
                        ),
                    );
                }
                Err(WebhookError::QueueFull(capacity))
            }
            EnqueueOutcome::Rejected(RejectReason::Closed) => Err(WebhookError::QueueClosed),
        }
    }

    fn on_cancel(&self, id: &RequestId) -> DispatchOutcome {
        if self.batch.remove(id.number) {
            self.reply(
                id.number,
                "Pull request removed from the batch merge queue.".to_string(),
            );
            return DispatchOutcome::Cancelled;
        }

        let (outcome, message) = match self.queue.cancel(id) {
            CancelOutcome::Cancelled => (
                DispatchOutcome::Cancelled,
                "Pull request removed from the merge queue.",
            ),
            CancelOutcome::NotFound => (
                DispatchOutcome::CancelNotFound,
                "Pull request is not in the merge queue.",
            ),
            CancelOutcome::TooLate => (
                DispatchOutcome::CancelTooLate,
                "Pull request is already being merged and cannot be cancelled.",
            ),
        };
        self.reply(id.number, message.to_string());
        outcome
    }

    fn reply(&self, pr_number: u64, message: String) {
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            reporter.post(pr_number, &message).await;
        });
    }
}

const BATCH_DUPLICATE: &str = "Pull request already added to batch merge queue.";

fn already_queued(position: usize) -> String {
    format!("Pull request is already in the merge queue (position {position}).")
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mention", &self.parser.mention())
            .field("required_permission", &self.required_permission)
            .field("batch_size", &self.batch.size())
            .finish_non_exhaustive()
    }
}
