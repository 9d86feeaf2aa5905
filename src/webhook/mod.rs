//! Webhook authentication and parsing
//!
//! Turns raw GitHub deliveries into queue commands: signature check first,
//! then payload parsing, then command extraction.

mod command;
mod error;
mod payload;
mod signature;

pub use command::{CommandParser, DEFAULT_MENTION, ParsedComment, QueueCommand};
pub use error::WebhookError;
pub use payload::{EventKind, IssueCommentPayload, PullRequestComment};
pub use signature::SignatureVerifier;
