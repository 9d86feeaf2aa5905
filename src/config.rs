//! Service configuration
//!
//! Sources, lowest precedence first: the TOML file, environment variables,
//! command-line flags. Validation happens once, at startup; any error here is
//! fatal and the service never binds its port.

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::merge::RetryPolicy;
use crate::types::{MergeMethod, PermissionLevel, PlatformConfig};
use crate::webhook::DEFAULT_MENTION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the webhook secret
pub const SECRET_ENV: &str = "MERGEQUEUE_WEBHOOK_SECRET";

/// Environment variable holding the GitHub token
pub const TOKEN_ENV: &str = "MERGEQUEUE_TOKEN";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_CAPACITY: usize = 32;

/// `[retry]` table of the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryFileConfig {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Cap for any single delay
    pub max_delay_ms: u64,
    /// Time budget per attempt
    pub attempt_timeout_secs: u64,
    /// How long to wait for running CI before failing
    pub ci_wait_secs: u64,
    /// Pause between readiness checks while CI runs
    pub ci_poll_secs: u64,
}

impl Default for RetryFileConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
            attempt_timeout_secs: 60,
            ci_wait_secs: 30 * 60,
            ci_poll_secs: 30,
        }
    }
}

/// Config file contents, every field optional
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Repository owner (user or organization)
    pub repo_owner: Option<String>,
    /// Repository name
    pub repo_name: Option<String>,
    /// GitHub token
    pub token: Option<String>,
    /// Shared webhook secret
    pub webhook_secret: Option<String>,
    /// GitHub Enterprise API host
    pub api_host: Option<String>,
    /// Listen address
    pub host: Option<String>,
    /// Listen port
    pub port: Option<u16>,
    /// Mention that addresses the app, e.g. `@mergequeue`
    pub bot_mention: Option<String>,
    /// Maximum number of pending requests
    pub queue_capacity: Option<usize>,
    /// Pull requests collected per batch merge
    pub batch_size: Option<usize>,
    /// How pull requests are merged
    pub merge_method: Option<MergeMethod>,
    /// Minimum permission to issue commands
    pub required_permission: Option<PermissionLevel>,
    /// Where the queue snapshot lives; no persistence when unset
    pub snapshot_path: Option<PathBuf>,
    /// Retry settings
    pub retry: RetryFileConfig,
}

impl std::fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfig")
            .field("repo_owner", &self.repo_owner)
            .field("repo_name", &self.repo_name)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl FileConfig {
    /// Parse a config file
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Parse config file contents
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct ConfigOverrides {
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub queue_capacity: Option<usize>,
    pub snapshot_path: Option<PathBuf>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository owner
    pub repo_owner: String,
    /// Repository name
    pub repo_name: String,
    /// Explicit token; `None` defers to the auth fallbacks
    pub token: Option<SecretString>,
    /// Shared webhook secret, never empty
    pub webhook_secret: SecretString,
    /// GitHub Enterprise API host
    pub api_host: Option<String>,
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Mention that addresses the app
    pub bot_mention: String,
    /// Maximum number of pending requests
    pub queue_capacity: usize,
    /// Pull requests collected per batch merge
    pub batch_size: usize,
    /// How pull requests are merged
    pub merge_method: MergeMethod,
    /// Minimum permission to issue commands
    pub required_permission: PermissionLevel,
    /// Queue snapshot file
    pub snapshot_path: Option<PathBuf>,
    /// Retry policy for merges
    pub retry: RetryPolicy,
}

impl Config {
    /// Default config file location (`~/.config/mergequeue/config.toml` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mergequeue").join("config.toml"))
    }

    /// Load from the file, the process environment and `overrides`
    ///
    /// An explicit `path` must exist; a missing default file is treated as empty.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let file = match path {
            Some(path) => FileConfig::read(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => FileConfig::read(&path)?,
                None => FileConfig::default(),
            },
        };
        Self::resolve(file, overrides, |key| std::env::var(key).ok())
    }

    /// Merge the sources and validate the result
    pub fn resolve(
        file: FileConfig,
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let non_empty = |v: String| (!v.trim().is_empty()).then_some(v);

        let repo_owner = overrides
            .repo_owner
            .or(file.repo_owner)
            .and_then(non_empty)
            .ok_or_else(|| Error::Config("repo_owner is required".to_string()))?;
        let repo_name = overrides
            .repo_name
            .or(file.repo_name)
            .and_then(non_empty)
            .ok_or_else(|| Error::Config("repo_name is required".to_string()))?;

        let webhook_secret = env(SECRET_ENV)
            .or(file.webhook_secret)
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config(format!("webhook_secret is required (or set {SECRET_ENV})"))
            })?;
        let token = env(TOKEN_ENV).or(file.token).and_then(non_empty);

        let queue_capacity = overrides
            .queue_capacity
            .or(file.queue_capacity)
            .unwrap_or(DEFAULT_CAPACITY);
        if queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }

        let batch_size = file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let bot_mention = file
            .bot_mention
            .unwrap_or_else(|| DEFAULT_MENTION.to_string());
        if bot_mention.trim().is_empty() || bot_mention.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "bot_mention must be a single word, got {bot_mention:?}"
            )));
        }

        let retry = &file.retry;
        if retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if retry.attempt_timeout_secs == 0 {
            return Err(Error::Config(
                "retry.attempt_timeout_secs must be at least 1".to_string(),
            ));
        }
        if retry.ci_poll_secs == 0 || retry.ci_poll_secs > retry.ci_wait_secs {
            return Err(Error::Config(
                "retry.ci_poll_secs must be between 1 and retry.ci_wait_secs".to_string(),
            ));
        }

        Ok(Self {
            repo_owner,
            repo_name,
            token: token.map(SecretString::from),
            webhook_secret: SecretString::from(webhook_secret),
            api_host: file.api_host.and_then(non_empty),
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            bot_mention,
            queue_capacity,
            batch_size,
            merge_method: file.merge_method.unwrap_or_default(),
            required_permission: file.required_permission.unwrap_or_default(),
            snapshot_path: overrides.snapshot_path.or(file.snapshot_path),
            retry: RetryPolicy {
                max_attempts: retry.max_attempts,
                base_delay: Duration::from_millis(retry.base_delay_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
                attempt_timeout: Duration::from_secs(retry.attempt_timeout_secs),
                ci_wait: Duration::from_secs(retry.ci_wait_secs),
                ci_poll_interval: Duration::from_secs(retry.ci_poll_secs),
            },
        })
    }

    /// Platform settings for the GitHub service
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            owner: self.repo_owner.clone(),
            repo: self.repo_name.clone(),
            host: self.api_host.clone(),
        }
    }

    /// Whether a token was configured explicitly
    pub fn has_token(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }
}
