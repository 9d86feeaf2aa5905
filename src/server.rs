//! HTTP ingress
//!
//! - `POST /` and `POST /webhook`: GitHub deliveries
//! - `GET /health`: liveness
//! - `GET /queue`: read-only view of the queue and recent attempts

use crate::config::Config;
use crate::dispatch::{DispatchOutcome, Dispatcher, InboundEvent};
use crate::error::Result;
use crate::merge::MergeExecutor;
use crate::platform::PlatformService;
use crate::queue::{MergeQueue, SnapshotStore};
use crate::report::StatusReporter;
use crate::types::{MergeAttempt, MergeRequest};
use crate::webhook::{CommandParser, SignatureVerifier};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for request handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Routes deliveries
    pub dispatcher: Arc<Dispatcher>,
    /// Queue, for the status view
    pub queue: Arc<MergeQueue>,
    /// Executor, for the attempt log
    pub executor: Arc<MergeExecutor>,
}

impl AppState {
    /// Wire queue, executor and dispatcher together around `platform`
    ///
    /// Restores the queue from the configured snapshot file, if any.
    pub fn assemble(config: &Config, platform: Arc<dyn PlatformService>) -> Result<Self> {
        let verifier = SignatureVerifier::new(config.webhook_secret.clone())?;

        let queue = match &config.snapshot_path {
            Some(path) => MergeQueue::with_snapshot(config.queue_capacity, SnapshotStore::new(path))?,
            None => MergeQueue::new(config.queue_capacity),
        };
        let queue = Arc::new(queue);

        let reporter = StatusReporter::new(Arc::clone(&platform));
        let executor = Arc::new(MergeExecutor::new(
            Arc::clone(&platform),
            reporter.clone(),
            config.retry,
            config.merge_method,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            verifier,
            CommandParser::new(&config.bot_mention),
            Arc::clone(&queue),
            platform,
            reporter,
            config.required_permission,
        )
        .with_batch_size(config.batch_size));

        Ok(Self {
            dispatcher,
            queue,
            executor,
        })
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Enqueued { .. } | Self::Batched { .. } | Self::BatchEnqueued { .. } => {
                StatusCode::ACCEPTED
            }
            _ => StatusCode::OK,
        };
        let body = match &self {
            Self::Enqueued { position } | Self::Duplicate { position } => {
                serde_json::json!({ "outcome": self.kind(), "position": position })
            }
            Self::Ignored(reason) => serde_json::json!({ "outcome": self.kind(), "reason": reason }),
            Self::Batched { collected } => {
                serde_json::json!({ "outcome": self.kind(), "collected": collected })
            }
            Self::BatchEnqueued {
                pr_number,
                position,
                members,
            } => serde_json::json!({
                "outcome": self.kind(),
                "pull_request": pr_number,
                "position": position,
                "members": members,
            }),
            _ => serde_json::json!({ "outcome": self.kind() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook))
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .route("/queue", get(queue_status))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening for webhooks");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let event = InboundEvent {
        event: header(&headers, "x-github-event"),
        signature: header(&headers, "x-hub-signature-256"),
        delivery: header(&headers, "x-github-delivery"),
        body: &body,
    };

    match state.dispatcher.handle(event).await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Body of `GET /queue`
#[derive(Debug, Serialize)]
struct QueueView {
    capacity: usize,
    closed: bool,
    entries: Vec<MergeRequest>,
    recent_attempts: Vec<MergeAttempt>,
}

async fn queue_status(State(state): State<AppState>) -> Json<QueueView> {
    Json(QueueView {
        capacity: state.queue.capacity(),
        closed: state.queue.is_closed(),
        entries: state.queue.entries(),
        recent_attempts: state.executor.audit_trail(),
    })
}
