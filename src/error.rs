//! Error types for mergequeue

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the merge pipeline and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing startup configuration (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable API credential could be resolved
    #[error("authentication error: {0}")]
    Auth(String),

    /// GitHub API returned something we could not use
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// Error surfaced by octocrab
    #[error("GitHub API error: {0}")]
    Octocrab(#[from] octocrab::Error),

    /// Raw HTTP error (CI status and permission lookups)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue snapshot could not be read or written
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The pull request cannot be merged as it stands (conflict, failing checks, closed)
    #[error("merge blocked: {0}")]
    MergeBlocked(String),

    /// A failure that may go away on its own (rate limit, CI still running)
    #[error("transient failure: {0}")]
    Transient(String),

    /// A merge attempt exceeded its time budget
    #[error("merge attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Queue operation violated the single-consumer contract
    #[error("queue state error: {0}")]
    QueueState(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}
