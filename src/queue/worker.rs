//! The drain worker: the single consumer of the merge queue.

use super::MergeQueue;
use crate::error::Result;
use crate::merge::MergeExecutor;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Take requests off the queue one at a time and merge them.
///
/// Each request is completed before the next one is taken, so at most one
/// merge is ever in flight. Returns when the queue is closed; a merge that is
/// already running finishes first.
pub async fn run_drain_loop(queue: Arc<MergeQueue>, executor: Arc<MergeExecutor>) -> Result<()> {
    info!("drain worker started");

    while let Some(request) = queue.next().await {
        let outcome = executor.process(&request).await;
        let done = queue.complete(&outcome.request_id, outcome.status)?;
        debug!(id = %done.id, status = %done.status, attempts = outcome.attempts.len(), "request removed from queue");
    }

    info!("drain worker stopped");
    Ok(())
}

/// Spawn [`run_drain_loop`] on the runtime.
pub fn spawn_drain_worker(
    queue: Arc<MergeQueue>,
    executor: Arc<MergeExecutor>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let result = run_drain_loop(queue, executor).await;
        if let Err(e) = &result {
            error!(error = %e, "drain worker failed");
        }
        result
    })
}
