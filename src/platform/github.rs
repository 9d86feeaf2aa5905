//! GitHub platform service implementation

use crate::error::{Error, Result};
use crate::merge::{ErrorClass, classify_status};
use crate::platform::PlatformService;
use crate::types::{
    CiStatus, MergeMethod, MergeReadiness, MergeResult, PermissionLevel, PlatformConfig, PrState,
    PullRequestDetails,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use octocrab::models::pulls::PullRequest;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default request timeout for raw REST calls
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// GitHub service using octocrab
pub struct GitHubService {
    client: Octocrab,
    config: PlatformConfig,
    /// Token for raw HTTP requests (CI status, permissions)
    token: String,
    /// HTTP client for raw requests
    http_client: Client,
    /// API base URL for raw requests, without trailing slash
    api_base: String,
}

impl GitHubService {
    /// Create a new GitHub service
    ///
    /// `host` selects a GitHub Enterprise server (`ghe.example.com` maps to
    /// `https://ghe.example.com/api/v3`); a value with a scheme is used as the
    /// API base URL verbatim.
    pub fn new(token: &str, owner: String, repo: String, host: Option<String>) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());

        let api_base = match host.as_deref() {
            Some(h) if h.starts_with("http://") || h.starts_with("https://") => {
                h.trim_end_matches('/').to_string()
            }
            Some(h) => format!("https://{h}/api/v3"),
            None => "https://api.github.com".to_string(),
        };
        if host.is_some() {
            builder = builder
                .base_uri(api_base.as_str())
                .map_err(|e| Error::GitHubApi(e.to_string()))?;
        }

        let client = builder
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        let http_client = Client::builder()
            .user_agent("mergequeue")
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::GitHubApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: PlatformConfig { owner, repo, host },
            token: token.to_string(),
            http_client,
            api_base,
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.config.owner, self.config.repo, path
        )
    }

    async fn get_raw(&self, url: &str) -> Result<reqwest::Response> {
        self.send_raw(self.http_client.get(url), url).await
    }

    async fn post_raw(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        self.send_raw(self.http_client.post(url).json(body), url).await
    }

    async fn send_raw(&self, request: RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::Transient(format!("GitHub returned {status} for {url}")));
        }
        Ok(response)
    }

    /// Check CI status by querying both commit statuses and check runs
    ///
    /// GitHub has two CI systems:
    /// 1. Commit Status API (legacy) - used by external CI services
    /// 2. Check Runs API (modern) - used by GitHub Actions
    ///
    /// A 404 from either API means nothing is configured there. Any other
    /// error status is returned as an error, never as a pass.
    pub async fn check_ci_status(&self, sha: &str) -> Result<CiStatus> {
        let statuses = self.check_commit_statuses(sha).await?;
        let check_runs = self.check_check_runs(sha).await?;
        Ok(combine_ci(statuses, check_runs))
    }

    /// Check legacy commit statuses via combined status API
    async fn check_commit_statuses(&self, sha: &str) -> Result<CiStatus> {
        #[derive(Deserialize)]
        struct CombinedStatus {
            state: String,
            total_count: u32,
        }

        let url = self.repo_url(&format!("/commits/{sha}/status"));
        let response = self.get_raw(&url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Commit status check returned 404, assuming no statuses configured");
            return Ok(CiStatus::Passed);
        }
        if !response.status().is_success() {
            return Err(response_error(response, "commit status lookup").await);
        }

        let status: CombinedStatus = response
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse commit status: {e}")))?;

        if status.total_count == 0 {
            debug!("No commit statuses configured");
            return Ok(CiStatus::Passed);
        }

        debug!(state = %status.state, count = status.total_count, "Commit status result");
        Ok(match status.state.as_str() {
            "success" => CiStatus::Passed,
            "pending" => CiStatus::Pending,
            _ => CiStatus::Failed,
        })
    }

    /// Check GitHub Actions check runs
    async fn check_check_runs(&self, sha: &str) -> Result<CiStatus> {
        #[derive(Deserialize)]
        struct CheckRunsResponse {
            total_count: u32,
            check_runs: Vec<CheckRun>,
        }

        #[derive(Deserialize)]
        struct CheckRun {
            status: String,
            conclusion: Option<String>,
        }

        let url = self.repo_url(&format!("/commits/{sha}/check-runs"));
        let response = self.get_raw(&url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Check runs returned 404, assuming no checks configured");
            return Ok(CiStatus::Passed);
        }
        if !response.status().is_success() {
            return Err(response_error(response, "check run lookup").await);
        }

        let check_runs: CheckRunsResponse = response
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse check runs: {e}")))?;

        if check_runs.total_count == 0 {
            debug!("No check runs configured");
            return Ok(CiStatus::Passed);
        }

        let mut result = CiStatus::Passed;
        for run in &check_runs.check_runs {
            if run.status != "completed" {
                debug!(status = %run.status, "Check run still in progress");
                result = CiStatus::Pending;
                continue;
            }

            match run.conclusion.as_deref() {
                Some("success" | "neutral" | "skipped") => {}
                Some(conclusion) => {
                    debug!(conclusion = %conclusion, "Check run failed");
                    return Ok(CiStatus::Failed);
                }
                None => {
                    debug!("Check run completed but no conclusion");
                    return Ok(CiStatus::Failed);
                }
            }
        }

        debug!(count = check_runs.total_count, ci = ?result, "Check runs evaluated");
        Ok(result)
    }
}

/// Error for a non-success API response
///
/// Rate limits become [`Error::Transient`]; anything else is a plain API error.
async fn response_error(response: reqwest::Response, what: &str) -> Error {
    #[derive(Deserialize)]
    struct ApiMessage {
        message: String,
    }

    let status = response.status();
    let message = response
        .json::<ApiMessage>()
        .await
        .map(|m| m.message)
        .unwrap_or_default();
    let description = format!("{what} returned {status}: {message}");

    match classify_status(status.as_u16(), &message) {
        ErrorClass::Transient => Error::Transient(description),
        ErrorClass::Blocked => Error::GitHubApi(description),
    }
}

fn to_details(pr: &PullRequest) -> PullRequestDetails {
    // Determine PR state from GitHub's state field and merged_at
    let state = match pr.state {
        Some(octocrab::models::IssueState::Open) => PrState::Open,
        Some(octocrab::models::IssueState::Closed) if pr.merged_at.is_some() => PrState::Merged,
        // IssueState is non-exhaustive, so use wildcard for Closed and any future variants
        Some(_) | None => PrState::Closed,
    };

    PullRequestDetails {
        number: pr.number,
        title: pr.title.clone().unwrap_or_default(),
        state,
        is_draft: pr.draft.unwrap_or(false),
        mergeable: pr.mergeable,
        head_ref: pr.head.ref_field.clone(),
        head_sha: pr.head.sha.clone(),
        base_ref: pr.base.ref_field.clone(),
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}

/// Failed wins over pending, pending wins over passed
fn combine_ci(a: CiStatus, b: CiStatus) -> CiStatus {
    match (a, b) {
        (CiStatus::Failed, _) | (_, CiStatus::Failed) => CiStatus::Failed,
        (CiStatus::Pending, _) | (_, CiStatus::Pending) => CiStatus::Pending,
        _ => CiStatus::Passed,
    }
}

#[async_trait]
impl PlatformService for GitHubService {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }

    async fn get_pr_details(&self, pr_number: u64) -> Result<PullRequestDetails> {
        debug!(pr_number, "getting PR details");

        let pr = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .get(pr_number)
            .await?;

        let details = to_details(&pr);

        debug!(pr_number, state = ?details.state, "got PR details");
        Ok(details)
    }

    async fn check_merge_readiness(&self, pr_number: u64) -> Result<MergeReadiness> {
        debug!(pr_number, "checking merge readiness");

        let details = self.get_pr_details(pr_number).await?;
        let ci = self.check_ci_status(&details.head_sha).await?;

        let mut blocking_reasons = Vec::new();
        let mut uncertainties = Vec::new();
        if details.is_draft {
            blocking_reasons.push("PR is a draft".to_string());
        }
        match ci {
            CiStatus::Failed => blocking_reasons.push("CI not passing".to_string()),
            CiStatus::Pending => uncertainties.push("CI still running".to_string()),
            CiStatus::Passed => {}
        }
        match details.mergeable {
            Some(false) => blocking_reasons.push("Has merge conflicts".to_string()),
            None => uncertainties.push("Merge status unknown (GitHub still computing)".to_string()),
            Some(true) => {}
        }

        let readiness = MergeReadiness {
            ci,
            is_mergeable: details.mergeable,
            is_draft: details.is_draft,
            blocking_reasons,
            uncertainties,
        };

        debug!(
            pr_number,
            is_blocked = readiness.is_blocked(),
            "checked merge readiness"
        );
        Ok(readiness)
    }

    async fn merge_pr(
        &self,
        pr_number: u64,
        method: MergeMethod,
        expected_head_sha: Option<&str>,
    ) -> Result<MergeResult> {
        debug!(pr_number, %method, "merging PR");

        let octocrab_method = match method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };

        let pulls = self.client.pulls(&self.config.owner, &self.config.repo);
        let mut builder = pulls.merge(pr_number).method(octocrab_method);
        if let Some(sha) = expected_head_sha {
            builder = builder.sha(sha);
        }

        // For squash, use the PR title as commit title
        let result = if method == MergeMethod::Squash {
            let details = self.get_pr_details(pr_number).await?;
            builder
                .title(format!("{} (#{})", details.title, pr_number))
                .send()
                .await?
        } else {
            builder.send().await?
        };

        let merge_result = MergeResult {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }

    async fn create_pr_comment(&self, pr_number: u64, body: &str) -> Result<()> {
        debug!(pr_number, "creating PR comment");
        self.client
            .issues(&self.config.owner, &self.config.repo)
            .create_comment(pr_number, body)
            .await?;
        debug!(pr_number, "created PR comment");
        Ok(())
    }

    async fn get_permission(&self, login: &str) -> Result<PermissionLevel> {
        #[derive(Deserialize)]
        struct CollaboratorPermission {
            permission: String,
            role_name: Option<String>,
        }

        debug!(login, "looking up collaborator permission");
        let url = self.repo_url(&format!("/collaborators/{login}/permission"));
        let response = self.get_raw(&url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(login, "user is not a collaborator");
            return Ok(PermissionLevel::None);
        }
        if !response.status().is_success() {
            return Err(response_error(response, &format!("permission lookup for {login}")).await);
        }

        let body: CollaboratorPermission = response
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse permission: {e}")))?;

        // role_name distinguishes maintain/triage, which `permission` folds into write/read
        let level = body
            .role_name
            .as_deref()
            .and_then(|r| r.parse().ok())
            .or_else(|| body.permission.parse().ok())
            .unwrap_or(PermissionLevel::None);

        debug!(login, %level, "got collaborator permission");
        Ok(level)
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        debug!(branch = name, sha, "creating branch");
        let url = self.repo_url("/git/refs");
        let body = serde_json::json!({ "ref": format!("refs/heads/{name}"), "sha": sha });
        let response = self.post_raw(&url, &body).await?;

        if !response.status().is_success() {
            return Err(response_error(response, &format!("creating branch {name}")).await);
        }
        debug!(branch = name, "created branch");
        Ok(())
    }

    async fn merge_branch(&self, base: &str, head: &str) -> Result<()> {
        debug!(base, head, "merging branch");
        let url = self.repo_url("/merges");
        let body = serde_json::json!({
            "base": base,
            "head": head,
            "commit_message": format!("Merge `{head}` into `{base}`"),
        });
        let response = self.post_raw(&url, &body).await?;

        match response.status() {
            // 204: head was already contained in base
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!(base, head, "merged branch");
                Ok(())
            }
            StatusCode::CONFLICT => Err(Error::MergeBlocked(format!(
                "`{head}` conflicts with `{base}`"
            ))),
            _ => Err(response_error(response, &format!("merging {head} into {base}")).await),
        }
    }

    async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestDetails> {
        debug!(head, base, "creating pull request");
        let pr = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .create(title, head, base)
            .body(body)
            .send()
            .await?;

        let details = to_details(&pr);
        debug!(pr_number = details.number, "created pull request");
        Ok(details)
    }
}
