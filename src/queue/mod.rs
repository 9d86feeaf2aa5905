//! FIFO merge queue
//!
//! The queue is the only shared mutable state in the service. Admission
//! (`enqueue`, `cancel`) and consumption (`next`, `complete`) all go through a
//! single mutex, and exactly one drain worker consumes it, so merges run one
//! at a time in arrival order. Snapshot writes happen after that mutex is
//! released.
//!
//! The in-progress request stays at the head of the queue until it reaches a
//! terminal status. That keeps duplicate detection and `TooLate` cancellation
//! answers correct while a merge is running.

mod snapshot;
mod worker;

pub use snapshot::{SNAPSHOT_VERSION, SnapshotEntry, SnapshotStore, default_snapshot_path};
pub use worker::{run_drain_loop, spawn_drain_worker};

use crate::error::{Error, Result};
use crate::types::{MergeRequest, MergeStatus, RequestId};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Why an enqueue was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Pending entries already fill the configured capacity
    QueueFull {
        /// Configured capacity
        capacity: usize,
    },
    /// The queue is shutting down
    Closed,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull { capacity } => write!(f, "queue is full ({capacity} pending)"),
            Self::Closed => write!(f, "queue is closed"),
        }
    }
}

/// Result of [`MergeQueue::enqueue`]
///
/// Positions are 1-based and count the in-progress head, so position 1 is
/// "running now or next".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Added at the tail
    Admitted {
        /// Position of the new entry
        position: usize,
    },
    /// Already pending or in progress; nothing changed
    Duplicate {
        /// Position of the existing entry
        position: usize,
    },
    /// Refused
    Rejected(RejectReason),
}

/// Result of [`MergeQueue::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed before execution started
    Cancelled,
    /// Not in the queue
    NotFound,
    /// Already being merged; merges run to completion once started
    TooLate,
}

#[derive(Debug)]
struct QueueState {
    entries: VecDeque<MergeRequest>,
    capacity: usize,
    /// Request currently handed to the drain worker
    active: Option<RequestId>,
    closed: bool,
    /// Bumped on every change that must reach the snapshot
    revision: u64,
}

impl QueueState {
    fn position(&self, id: &RequestId) -> Option<usize> {
        self.entries.iter().position(|r| &r.id == id).map(|i| i + 1)
    }

    fn pending_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|r| r.status == MergeStatus::Pending)
            .count()
    }
}

/// Queue contents taken under the lock, written after it is released
#[derive(Debug)]
struct PendingWrite {
    revision: u64,
    entries: Vec<MergeRequest>,
}

/// Ordered, deduplicated merge queue with a single consumer
#[derive(Debug)]
pub struct MergeQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    snapshot: Option<SnapshotStore>,
    /// Revision last written to the snapshot; held while writing
    written: Mutex<u64>,
}

impl MergeQueue {
    /// Create an empty in-memory queue
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                capacity,
                active: None,
                closed: false,
                revision: 0,
            }),
            ready: Notify::new(),
            snapshot: None,
            written: Mutex::new(0),
        }
    }

    /// Create a queue backed by a snapshot file, restoring any saved entries
    ///
    /// A recovered in-progress entry is handed out first by [`next`](Self::next).
    pub fn with_snapshot(capacity: usize, store: SnapshotStore) -> Result<Self> {
        let entries = store.load()?;
        let mut queue = Self::new(capacity);
        queue.restore(entries)?;
        queue.snapshot = Some(store);
        Ok(queue)
    }

    /// Replace the queue contents with previously saved entries
    ///
    /// Terminal entries are dropped. At most one entry may be in progress and
    /// it must be at the head; identifiers must be unique.
    pub fn restore(&mut self, entries: Vec<MergeRequest>) -> Result<()> {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        let mut restored: VecDeque<MergeRequest> = VecDeque::with_capacity(entries.len());
        for entry in entries {
            if entry.status.is_terminal() {
                debug!(id = %entry.id, status = %entry.status, "dropping terminal snapshot entry");
                continue;
            }
            if entry.status == MergeStatus::InProgress && !restored.is_empty() {
                return Err(Error::Snapshot(format!(
                    "in-progress entry {} is not at the head of the queue",
                    entry.id
                )));
            }
            if restored.iter().any(|r| r.id == entry.id) {
                return Err(Error::Snapshot(format!("duplicate entry {}", entry.id)));
            }
            restored.push_back(entry);
        }

        if !restored.is_empty() {
            info!(entries = restored.len(), "restored merge queue from snapshot");
        }
        state.entries = restored;
        state.active = None;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the entries for the snapshot while the state lock is held
    fn capture(&self, state: &mut QueueState) -> Option<PendingWrite> {
        self.snapshot.as_ref()?;
        state.revision += 1;
        Some(PendingWrite {
            revision: state.revision,
            entries: state.entries.iter().cloned().collect(),
        })
    }

    /// Write a capture taken by [`capture`](Self::capture), after the state lock is released
    ///
    /// Writes are serialized, and a capture older than the last one written is
    /// dropped, so the file always ends at the newest revision.
    fn persist(&self, pending: Option<PendingWrite>) {
        let (Some(store), Some(pending)) = (&self.snapshot, pending) else {
            return;
        };
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.revision <= *written {
            debug!(revision = pending.revision, "skipping stale queue snapshot");
            return;
        }
        match store.save(&pending.entries) {
            Ok(()) => *written = pending.revision,
            Err(e) => warn!(error = %e, "failed to write queue snapshot"),
        }
    }

    /// Admit a request at the tail of the queue
    ///
    /// Duplicates are reported with the existing entry's position and never
    /// change the queue. Capacity bounds pending entries only.
    pub fn enqueue(&self, mut request: MergeRequest) -> EnqueueOutcome {
        let mut state = self.lock();

        if state.closed {
            return EnqueueOutcome::Rejected(RejectReason::Closed);
        }
        if let Some(position) = state.position(&request.id) {
            debug!(id = %request.id, position, "duplicate merge request");
            return EnqueueOutcome::Duplicate { position };
        }
        if state.pending_len() >= state.capacity {
            let capacity = state.capacity;
            debug!(id = %request.id, capacity, "merge queue full");
            return EnqueueOutcome::Rejected(RejectReason::QueueFull { capacity });
        }

        request.status = MergeStatus::Pending;
        info!(id = %request.id, requester = %request.requester, "merge request queued");
        state.entries.push_back(request);
        let position = state.entries.len();
        let pending = self.capture(&mut state);
        drop(state);

        self.persist(pending);
        self.ready.notify_one();
        EnqueueOutcome::Admitted { position }
    }

    /// Withdraw a pending request
    pub fn cancel(&self, id: &RequestId) -> CancelOutcome {
        let mut state = self.lock();

        let Some(index) = state.entries.iter().position(|r| &r.id == id) else {
            return CancelOutcome::NotFound;
        };
        if state.entries[index].status != MergeStatus::Pending {
            return CancelOutcome::TooLate;
        }

        if let Some(mut removed) = state.entries.remove(index) {
            removed.status = MergeStatus::Cancelled;
            info!(id = %removed.id, "merge request cancelled");
        }
        let pending = self.capture(&mut state);
        drop(state);

        self.persist(pending);
        CancelOutcome::Cancelled
    }

    /// Wait for the next request to execute and mark it in progress
    ///
    /// Only the drain worker may call this. Returns `None` once the queue is
    /// closed. While a previously returned request has not been completed,
    /// this waits rather than handing out a second one.
    pub async fn next(&self) -> Option<MergeRequest> {
        loop {
            let taken = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if state.active.is_none()
                    && let Some(head) = state.entries.front_mut()
                {
                    // A head recovered from a snapshot may already be in progress.
                    if head.status == MergeStatus::Pending {
                        head.status = MergeStatus::InProgress;
                    }
                    let request = head.clone();
                    state.active = Some(request.id.clone());
                    Some((request, self.capture(&mut state)))
                } else {
                    None
                }
            };

            if let Some((request, pending)) = taken {
                self.persist(pending);
                debug!(id = %request.id, "dequeued merge request");
                return Some(request);
            }
            self.ready.notified().await;
        }
    }

    /// Record the terminal status of the active request and remove it
    ///
    /// # Errors
    ///
    /// Fails if `id` is not the active request or `status` is not a valid
    /// terminal transition from in progress.
    pub fn complete(&self, id: &RequestId, status: MergeStatus) -> Result<MergeRequest> {
        let mut state = self.lock();

        if state.active.as_ref() != Some(id) {
            return Err(Error::QueueState(format!("{id} is not the active request")));
        }
        let Some(head) = state.entries.front() else {
            return Err(Error::QueueState("queue is empty".to_string()));
        };
        if &head.id != id {
            return Err(Error::QueueState(format!("{id} is not at the head of the queue")));
        }
        if !head.status.can_transition_to(status) {
            return Err(Error::QueueState(format!(
                "invalid transition for {id}: {} -> {status}",
                head.status
            )));
        }

        let mut request = state
            .entries
            .pop_front()
            .ok_or_else(|| Error::QueueState("queue is empty".to_string()))?;
        request.status = status;
        state.active = None;
        let pending = self.capture(&mut state);
        drop(state);

        self.persist(pending);
        info!(id = %request.id, %status, "merge request finished");
        Ok(request)
    }

    /// Stop admitting requests and wake the drain worker so it can exit
    ///
    /// A request already handed out keeps running; pending entries stay in
    /// the snapshot for the next start.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// 1-based position of a request, if queued
    pub fn position(&self, id: &RequestId) -> Option<usize> {
        self.lock().position(id)
    }

    /// Copy of all entries in processing order
    pub fn entries(&self) -> Vec<MergeRequest> {
        self.lock().entries.iter().cloned().collect()
    }

    /// The request currently being merged, if any
    pub fn in_progress(&self) -> Option<MergeRequest> {
        self.lock()
            .entries
            .front()
            .filter(|r| r.status == MergeStatus::InProgress)
            .cloned()
    }

    /// Number of entries (pending and in progress)
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Number of pending entries
    pub fn pending_len(&self) -> usize {
        self.lock().pending_len()
    }

    /// Configured capacity for pending entries
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}
