//! mergequeue - serialized merge queue for GitHub pull requests
//!
//! Collaborators ask for a merge by commenting `@mergequeue try-merge` on a
//! pull request. Verified requests are queued in arrival order and a single
//! worker merges them one at a time, retrying transient failures and
//! reporting the result back on the pull request.
//!
//! The pieces, from the wire inward:
//! - [`server`]: HTTP ingress (axum)
//! - [`dispatch`]: signature, payload, permission and command handling
//! - [`queue`]: the FIFO queue, its snapshot file and the drain worker
//! - [`merge`]: retry policy and merge execution
//! - [`batch`]: `try-batchmerge` collection and batch branches
//! - [`report`]: status comments
//! - [`platform`]: the GitHub API behind a trait

pub mod auth;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod merge;
pub mod platform;
pub mod queue;
pub mod report;
pub mod server;
pub mod types;
pub mod webhook;
