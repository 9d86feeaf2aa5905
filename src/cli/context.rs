//! Shared service context for the serve command
//!
//! Extracts the setup between "configuration loaded" and "ready to bind".

use mergequeue::auth::{AuthSource, get_github_auth};
use mergequeue::config::Config;
use mergequeue::error::Result;
use mergequeue::platform::GitHubService;
use mergequeue::server::AppState;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the running service needs
///
/// This struct encapsulates the setup needed before serving:
/// - Resolving the GitHub token
/// - Creating the platform service
/// - Restoring the queue and wiring executor and dispatcher
pub struct ServiceContext {
    /// Validated configuration
    pub config: Config,
    /// Where the GitHub token came from
    pub auth_source: AuthSource,
    /// Handler state shared with the HTTP layer and the drain worker
    pub state: AppState,
}

impl ServiceContext {
    /// Create a new service context
    pub async fn new(config: Config) -> Result<Self> {
        // Resolve credentials
        let auth = get_github_auth(config.token.as_ref()).await?;
        debug!(source = ?auth.source, "resolved GitHub token");

        // Create platform service
        let platform = GitHubService::new(
            auth.token.expose_secret(),
            config.repo_owner.clone(),
            config.repo_name.clone(),
            config.api_host.clone(),
        )?;

        let state = AppState::assemble(&config, Arc::new(platform))?;
        info!(
            repository = %config.platform_config().full_name(),
            queued = state.queue.len(),
            capacity = config.queue_capacity,
            "merge queue ready"
        );

        Ok(Self {
            config,
            auth_source: auth.source,
            state,
        })
    }
}
