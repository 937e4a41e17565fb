//! GitHub REST payload shapes, decoded with serde.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::commit::{CommitDetails, CommitState};

/// `GET /repos/{repo}/commits/{sha}`
#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub sha: String,
    pub html_url: String,
    pub commit: GitCommit,
    /// GitHub account linked to the commit author; absent for unlinked emails.
    pub author: Option<Account>,
}

#[derive(Debug, Deserialize)]
pub struct GitCommit {
    pub message: String,
    pub author: Option<GitSignature>,
    pub committer: Option<GitSignature>,
}

#[derive(Debug, Deserialize)]
pub struct GitSignature {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub login: String,
    pub avatar_url: Option<String>,
}

/// `GET /users/{login}`
#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub name: Option<String>,
}

/// Element of `GET /repos/{repo}/commits/{sha}/statuses`, newest first.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub state: CommitState,
}

/// Element of `GET /repos/{repo}/commits`.
#[derive(Debug, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
}

/// `GET /repos/{repo}/branches/{branch}`
#[derive(Debug, Deserialize)]
pub struct BranchResponse {
    pub commit: CommitSummary,
}

impl CommitResponse {
    /// Commit date as git records it for the committer, else the author.
    pub fn commit_date(&self) -> Option<DateTime<Utc>> {
        let signature_date = |sig: &Option<GitSignature>| sig.as_ref().and_then(|s| s.date);
        signature_date(&self.commit.committer).or_else(|| signature_date(&self.commit.author))
    }

    /// Build `CommitDetails`. `display_name` is the linked account's profile
    /// name when it could be fetched; otherwise the login, then the git
    /// author name, stand in.
    pub fn into_details(
        self,
        verification_state: Option<CommitState>,
        display_name: Option<String>,
    ) -> Option<CommitDetails> {
        let commit_date = self.commit_date()?;
        let login = self.author.as_ref().map(|a| a.login.clone());
        let git_author = self.commit.author.as_ref().and_then(|a| a.name.clone());
        let committer_name = display_name
            .filter(|n| !n.is_empty())
            .or(login)
            .or(git_author);

        Some(CommitDetails {
            sha: self.sha,
            html_url: self.html_url,
            message: self.commit.message,
            commit_date,
            verification_state,
            author_avatar_url: self.author.and_then(|a| a.avatar_url),
            committer_name,
        })
    }
}
