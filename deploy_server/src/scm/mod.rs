//! Source-control verification: commit metadata, status and ancestry lookups.
//!
//! `SourceControl` is the raw, fallible adapter boundary (GitHub over HTTP in
//! production). `Verifier` wraps it and folds every failure, including
//! timeouts, into the "cannot confirm" values callers see: `None`, `false`,
//! an empty string or an empty list. Deployment bookkeeping never blocks on
//! source control being reachable.
//!
//! Note that `is_commit_status_successful` and `is_commit_in_branch_history`
//! return `false` both for a negative answer and for an unresolved commit.
//! Callers that must tell the two apart should use `fetch_commit_details`.

pub mod dto;
pub mod github;

#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::commit::{CommitDetails, CommitState};

/// Branch history is listed from this long before the commit's own date,
/// to tolerate skew between authoring time and history indexing.
pub const BRANCH_HISTORY_LOOKBACK: chrono::Duration = chrono::Duration::days(1);

/// Failures raised by a `SourceControl` adapter. Never escapes `Verifier`.
#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A repository, sha or branch that cannot be used as a path segment.
    #[error("invalid reference: {0:?}")]
    InvalidReference(String),

    /// Paging stopped at the cap before the listing was exhausted.
    #[error("history listing truncated after {pages} pages")]
    Truncated { pages: u32 },
}

/// Parameters for listing commit shas, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitQuery {
    /// Branch to walk; the repository's default branch when `None`.
    pub branch: Option<String>,
    /// Only commits at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Stop after this many commits; adapter page cap when `None`.
    pub limit: Option<usize>,
}

impl CommitQuery {
    pub fn on_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..Self::default()
        }
    }

    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Resolve one commit, including its latest status check.
    async fn commit(&self, repo: &str, sha: &str) -> Result<CommitDetails, ScmError>;

    /// List commit shas, most recent first.
    async fn list_commits(&self, repo: &str, query: &CommitQuery) -> Result<Vec<String>, ScmError>;

    /// Whether `sha` is among the commits `query` selects. Stops at the
    /// first page that contains it.
    async fn contains_commit(
        &self,
        repo: &str,
        query: &CommitQuery,
        sha: &str,
    ) -> Result<bool, ScmError>;

    /// Sha of the commit at the head of `branch`.
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, ScmError>;
}

/// Degrading front for a `SourceControl` adapter.
///
/// Built once at start-up and handed to whoever needs it.
#[derive(Clone)]
pub struct Verifier {
    scm: Arc<dyn SourceControl>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(scm: Arc<dyn SourceControl>, timeout: Duration) -> Self {
        Self { scm, timeout }
    }

    /// Commit metadata, or `None` when the commit cannot be resolved.
    pub async fn fetch_commit_details(&self, repo: &str, sha: &str) -> Option<CommitDetails> {
        tracing::info!(repo, sha, "Getting commit details");
        self.resolve("commit_details", repo, self.scm.commit(repo, sha))
            .await
    }

    /// True only when the commit resolved and its latest status is success.
    pub async fn is_commit_status_successful(&self, repo: &str, sha: &str) -> bool {
        self.fetch_commit_details(repo, sha)
            .await
            .is_some_and(|details| details.verification_state == Some(CommitState::Success))
    }

    /// True when `sha` appears in `branch`'s history from one day before the
    /// commit's own date onward.
    pub async fn is_commit_in_branch_history(&self, repo: &str, branch: &str, sha: &str) -> bool {
        let Some(details) = self.fetch_commit_details(repo, sha).await else {
            return false;
        };

        let query = CommitQuery::on_branch(branch).since(details.commit_date - BRANCH_HISTORY_LOOKBACK);
        self.resolve(
            "branch_history",
            repo,
            self.scm.contains_commit(repo, &query, sha),
        )
        .await
        .unwrap_or(false)
    }

    /// Head sha of `branch`; empty when it cannot be retrieved.
    pub async fn latest_commit_sha_on_branch(&self, repo: &str, branch: &str) -> String {
        self.resolve("branch_head", repo, self.scm.branch_head(repo, branch))
            .await
            .unwrap_or_default()
    }

    /// Up to `count` most recent shas on the default branch; empty when they
    /// cannot be retrieved.
    pub async fn latest_commit_shas(&self, repo: &str, count: usize) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let query = CommitQuery::latest(count);
        let mut shas = self
            .resolve("latest_commits", repo, self.scm.list_commits(repo, &query))
            .await
            .unwrap_or_default();
        shas.truncate(count);
        shas
    }

    async fn resolve<T>(
        &self,
        operation: &'static str,
        repo: &str,
        lookup: impl Future<Output = Result<T, ScmError>>,
    ) -> Option<T> {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(operation, repo, error = %e, "Source control lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    repo,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Source control lookup timed out"
                );
                None
            }
        };
        crate::metrics::scm_lookup(operation, outcome.is_some(), started.elapsed());
        outcome
    }
}

/// `owner/repo` identifier from a full repository URL.
///
/// Strips a leading `http://` or `https://`, the `github.com/` host, and a
/// trailing `/` or `.git`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let path = without_scheme
        .strip_prefix("github.com/")
        .unwrap_or(without_scheme);
    let path = path.trim_end_matches('/');
    path.strip_suffix(".git").unwrap_or(path).to_string()
}
