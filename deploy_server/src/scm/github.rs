//! GitHub REST adapter for `SourceControl`.
//!
//! Owns transport details only: URLs, auth header, paging and decoding.
//! Every failure comes back as `ScmError`; `Verifier` decides what it means.

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::config::DeployConfig;
use crate::models::commit::CommitDetails;

use super::dto::{BranchResponse, CommitResponse, CommitSummary, StatusResponse, UserResponse};
use super::{CommitQuery, ScmError, SourceControl};

/// GitHub caps `per_page` at this value.
const MAX_PER_PAGE: usize = 100;

pub struct GithubClient {
    client: reqwest::Client,
    api_url: Url,
    token: Option<String>,
    max_pages: u32,
}

impl GithubClient {
    /// Build the client. Requests are bounded by `config.scm_timeout`.
    pub fn new(config: &DeployConfig) -> Result<Self, ScmError> {
        tracing::info!("Initializing GitHub connector");

        let api_url = Url::parse(&config.github_api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ScmError::InvalidReference(config.github_api_url.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(config.scm_timeout)
            .user_agent(concat!("deploytrack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let token = if config.is_anonymous() {
            tracing::info!("Connecting anonymously to GitHub");
            None
        } else {
            tracing::info!(login = %config.github_login, "Connecting to GitHub");
            Some(config.github_oauth_token.clone())
        };

        Ok(Self {
            client,
            api_url,
            token,
            max_pages: config.branch_history_max_pages.max(1),
        })
    }

    /// API URL for `repos/{owner}/{repo}/{rest..}`. Each segment is
    /// percent-encoded on its own, so `#`, `?` or `/` inside a branch name or
    /// sha cannot change which endpoint is addressed.
    fn repo_endpoint(&self, repo: &str, rest: &[&str]) -> Result<Url, ScmError> {
        let mut segments = vec!["repos"];
        segments.extend(repo.split('/'));
        if segments.len() != 3 {
            return Err(ScmError::InvalidReference(repo.to_string()));
        }
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ScmError> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ScmError::InvalidReference((*bad).to_string()));
        }

        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| ScmError::InvalidReference(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ScmError> {
        let mut request = self
            .client
            .get(url.clone())
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScmError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ScmError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ScmError::Decode(format!("{url}: {e}")))
    }

    /// Profile name of a GitHub account. Best-effort.
    async fn display_name(&self, login: &str) -> Option<String> {
        let url = self.endpoint(&["users", login]).ok()?;
        match self.get_json::<UserResponse>(url, &[]).await {
            Ok(user) => user.name,
            Err(e) => {
                tracing::debug!(login, error = %e, "Could not resolve GitHub display name");
                None
            }
        }
    }

    /// One page of `GET /repos/{repo}/commits`.
    async fn commit_page(
        &self,
        repo: &str,
        query: &CommitQuery,
        page: u32,
        per_page: usize,
    ) -> Result<Vec<String>, ScmError> {
        let mut params = vec![
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(branch) = &query.branch {
            params.push(("sha", branch.clone()));
        }
        if let Some(since) = query.since {
            params.push(("since", since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }

        let batch: Vec<CommitSummary> = self
            .get_json(self.repo_endpoint(repo, &["commits"])?, &params)
            .await?;
        Ok(batch.into_iter().map(|c| c.sha).collect())
    }
}

#[async_trait]
impl SourceControl for GithubClient {
    async fn commit(&self, repo: &str, sha: &str) -> Result<CommitDetails, ScmError> {
        let commit: CommitResponse = self
            .get_json(self.repo_endpoint(repo, &["commits", sha])?, &[])
            .await?;

        let statuses: Vec<StatusResponse> = self
            .get_json(
                self.repo_endpoint(repo, &["commits", sha, "statuses"])?,
                &[("per_page", "1".to_string())],
            )
            .await?;
        let last_status = statuses.first().map(|s| s.state);

        let display_name = match &commit.author {
            Some(account) => self.display_name(&account.login).await,
            None => None,
        };

        commit
            .into_details(last_status, display_name)
            .ok_or_else(|| ScmError::Decode(format!("commit {sha} in {repo} has no date")))
    }

    /// Pages until `query.limit` is reached or the listing is exhausted.
    /// An unlimited listing that is still going at the page cap is `Truncated`.
    async fn list_commits(&self, repo: &str, query: &CommitQuery) -> Result<Vec<String>, ScmError> {
        let per_page = query.limit.map_or(MAX_PER_PAGE, |l| l.clamp(1, MAX_PER_PAGE));
        let mut shas = Vec::new();

        for page in 1..=self.max_pages {
            let batch = self.commit_page(repo, query, page, per_page).await?;
            let exhausted = batch.len() < per_page;
            shas.extend(batch);

            if let Some(limit) = query.limit {
                if shas.len() >= limit {
                    shas.truncate(limit);
                    return Ok(shas);
                }
            }
            if exhausted {
                return Ok(shas);
            }
        }

        if query.limit.is_some() {
            return Ok(shas);
        }
        Err(ScmError::Truncated {
            pages: self.max_pages,
        })
    }

    async fn contains_commit(
        &self,
        repo: &str,
        query: &CommitQuery,
        sha: &str,
    ) -> Result<bool, ScmError> {
        for page in 1..=self.max_pages {
            let batch = self.commit_page(repo, query, page, MAX_PER_PAGE).await?;
            if batch.iter().any(|candidate| candidate == sha) {
                return Ok(true);
            }
            if batch.len() < MAX_PER_PAGE {
                return Ok(false);
            }
        }
        Err(ScmError::Truncated {
            pages: self.max_pages,
        })
    }

    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, ScmError> {
        let branch: BranchResponse = self
            .get_json(self.repo_endpoint(repo, &["branches", branch])?, &[])
            .await?;
        Ok(branch.commit.sha)
    }
}
