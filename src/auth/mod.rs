//! Authentication for the GitHub API
//!
//! Supports an explicit token from configuration, environment variables and
//! the `gh` CLI.

mod github;

pub use github::{GitHubAuthConfig, get_github_auth};

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token given in the configuration file or on the command line
    Config,
    /// Token from CLI tool (gh)
    Cli,
    /// Token from environment variable
    EnvVar,
}
