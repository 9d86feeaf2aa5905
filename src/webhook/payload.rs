//! GitHub webhook payload types for `issue_comment` events.
//!
//! GitHub sends a JSON payload with the following relevant fields:
//!
//! ```json
//! {
//!   "action": "created",
//!   "issue": { "number": 12, "pull_request": { "url": "..." } },
//!   "comment": { "id": 1, "body": "@mergequeue try-merge", "user": { "login": "octocat" } },
//!   "repository": { "full_name": "owner/repo" }
//! }
//! ```
//!
//! `issue.pull_request` is only present when the comment was made on a
//! pull request rather than a plain issue.

use serde::{Deserialize, Serialize};

use super::error::WebhookError;

/// Webhook event types the ingress distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Sent by GitHub when a hook is first configured.
    Ping,
    /// A comment was created, edited or deleted on an issue or PR.
    IssueComment,
    /// Anything else; acknowledged and dropped.
    Other(String),
}

impl EventKind {
    /// Classifies the value of the `X-GitHub-Event` header.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        match value {
            "ping" => Self::Ping,
            "issue_comment" => Self::IssueComment,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The payload of an `issue_comment` webhook.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IssueCommentPayload {
    /// `created`, `edited` or `deleted`.
    pub action: String,
    /// The issue or pull request the comment belongs to.
    pub issue: Issue,
    /// The comment itself.
    pub comment: Comment,
    /// The repository the event came from.
    pub repository: Repository,
}

/// Issue (or pull request) details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Issue {
    /// Issue / PR number.
    pub number: u64,
    /// Present only for pull requests.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

/// Comment details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Comment {
    /// Comment ID.
    pub id: u64,
    /// Comment text. GitHub sends `null` for empty bodies.
    #[serde(default)]
    pub body: Option<String>,
    /// Comment author.
    pub user: User,
}

/// A GitHub user reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    /// Login name.
    pub login: String,
}

/// Repository reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Repository {
    /// `owner/name`.
    pub full_name: String,
}

/// A normalized comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestComment {
    /// Repository full name.
    pub repository: String,
    /// Pull request number.
    pub pr_number: u64,
    /// Comment ID.
    pub comment_id: u64,
    /// Comment author login.
    pub author: String,
    /// Comment text.
    pub body: String,
}

impl IssueCommentPayload {
    /// Parses an `issue_comment` payload from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the JSON is malformed or required fields are
    /// missing.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(format!("JSON parse error: {e}")))
    }

    /// Extracts a newly created pull request comment.
    ///
    /// Returns `Err` with the reason for events the queue does not act on:
    /// edits, deletions and comments on plain issues.
    pub fn into_pull_request_comment(self) -> Result<PullRequestComment, &'static str> {
        if self.action != "created" {
            return Err("comment was not newly created");
        }
        if self.issue.pull_request.is_none() {
            return Err("comment is not on a pull request");
        }

        Ok(PullRequestComment {
            repository: self.repository.full_name,
            pr_number: self.issue.number,
            comment_id: self.comment.id,
            author: self.comment.user.login,
            body: self.comment.body.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payload(action: &str, on_pr: bool, body: &str) -> Vec<u8> {
        let pull_request = if on_pr {
            r#""pull_request": {"url": "https://api.github.com/repos/o/r/pulls/12"},"#
        } else {
            ""
        };
        format!(
            r#"{{
                "action": "{action}",
                "issue": {{ {pull_request} "number": 12 }},
                "comment": {{ "id": 99, "body": "{body}", "user": {{ "login": "octocat" }} }},
                "repository": {{ "full_name": "o/r" }}
            }}"#
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_pr_comment() {
        let payload = IssueCommentPayload::parse(&make_payload("created", true, "hi")).unwrap();
        let comment = payload.into_pull_request_comment().unwrap();

        assert_eq!(comment.repository, "o/r");
        assert_eq!(comment.pr_number, 12);
        assert_eq!(comment.comment_id, 99);
        assert_eq!(comment.author, "octocat");
        assert_eq!(comment.body, "hi");
    }

    #[test]
    fn test_plain_issue_comment_skipped() {
        let payload = IssueCommentPayload::parse(&make_payload("created", false, "hi")).unwrap();
        assert!(payload.into_pull_request_comment().is_err());
    }

    #[test]
    fn test_deleted_comment_skipped() {
        let payload = IssueCommentPayload::parse(&make_payload("deleted", true, "hi")).unwrap();
        assert!(payload.into_pull_request_comment().is_err());
    }

    #[test]
    fn test_null_body_is_empty() {
        let body = br#"{
            "action": "created",
            "issue": { "number": 3, "pull_request": {} },
            "comment": { "id": 1, "body": null, "user": { "login": "a" } },
            "repository": { "full_name": "o/r" }
        }"#;
        let comment = IssueCommentPayload::parse(body)
            .unwrap()
            .into_pull_request_comment()
            .unwrap();
        assert_eq!(comment.body, "");
    }

    #[test]
    fn test_reject_malformed_json() {
        assert!(matches!(
            IssueCommentPayload::parse(b"not valid json"),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_reject_missing_fields() {
        assert!(matches!(
            IssueCommentPayload::parse(br#"{"action": "created"}"#),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_event_kind_from_header() {
        assert_eq!(EventKind::from_header("ping"), EventKind::Ping);
        assert_eq!(EventKind::from_header("issue_comment"), EventKind::IssueComment);
        assert_eq!(
            EventKind::from_header("push"),
            EventKind::Other("push".to_string())
        );
    }
}
