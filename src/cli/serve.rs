//! Serve command - run the webhook service and the drain worker

use crate::cli::context::ServiceContext;
use mergequeue::config::Config;
use mergequeue::error::{Error, Result};
use mergequeue::queue::spawn_drain_worker;
use mergequeue::server;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long an in-flight merge may run after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

/// Run the serve command
///
/// Returns once a shutdown signal has been handled and the drain worker has
/// stopped (or the grace period ran out).
pub async fn run_serve(config: Config) -> Result<()> {
    let ctx = ServiceContext::new(config).await?;
    info!(token_source = ?ctx.auth_source, "authenticated with GitHub");

    let listener = TcpListener::bind((ctx.config.host.as_str(), ctx.config.port))
        .await
        .map_err(|e| {
            Error::Config(format!(
                "cannot listen on {}:{}: {e}",
                ctx.config.host, ctx.config.port
            ))
        })?;

    let worker = spawn_drain_worker(
        Arc::clone(&ctx.state.queue),
        Arc::clone(&ctx.state.executor),
    );

    let queue = Arc::clone(&ctx.state.queue);
    server::serve(listener, ctx.state.clone(), async move {
        shutdown_signal().await;
        info!("shutdown requested, no longer accepting merge requests");
        queue.close();
    })
    .await?;

    ctx.state.queue.close();
    match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(Error::Internal(format!("drain worker panicked: {e}"))),
        Err(_) => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "in-flight merge did not finish before shutdown"
        ),
    }

    info!(pending = ctx.state.queue.pending_len(), "stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
