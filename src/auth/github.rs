//! GitHub token resolution

use super::AuthSource;
use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::debug;

/// Environment variables checked for a token, in order
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Resolved GitHub credential
#[derive(Debug, Clone)]
pub struct GitHubAuthConfig {
    /// The access token
    pub token: SecretString,
    /// Where the token came from
    pub source: AuthSource,
}

/// Resolve a GitHub token.
///
/// Order: explicit token, `GITHUB_TOKEN`/`GH_TOKEN`, then `gh auth token`.
pub async fn get_github_auth(explicit: Option<&SecretString>) -> Result<GitHubAuthConfig> {
    if let Some(token) = explicit.filter(|t| !t.expose_secret().trim().is_empty()) {
        debug!("using token from configuration");
        return Ok(GitHubAuthConfig {
            token: token.clone(),
            source: AuthSource::Config,
        });
    }

    for var in TOKEN_ENV_VARS {
        if let Ok(value) = std::env::var(var)
            && !value.trim().is_empty()
        {
            debug!(var, "using token from environment");
            return Ok(GitHubAuthConfig {
                token: SecretString::from(value.trim().to_string()),
                source: AuthSource::EnvVar,
            });
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
        .map_err(|e| Error::Auth(format!("no token configured and `gh` is unavailable: {e}")))?;

    if !output.status.success() {
        return Err(Error::Auth(
            "no token configured; set GITHUB_TOKEN or run `gh auth login`".to_string(),
        ));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(Error::Auth("`gh auth token` returned an empty token".to_string()));
    }

    debug!("using token from gh CLI");
    Ok(GitHubAuthConfig {
        token: SecretString::from(token),
        source: AuthSource::Cli,
    })
}
