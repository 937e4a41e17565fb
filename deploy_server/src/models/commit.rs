//! Commit metadata fetched on demand from source control. Never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a commit status check, as reported by source control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Error,
    Failure,
    Pending,
    Success,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Failure => "failure",
            Self::Pending => "pending",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitDetails {
    pub sha: String,
    pub html_url: String,
    pub message: String,
    pub commit_date: DateTime<Utc>,
    /// Latest status check on the commit; `None` when no check has reported.
    pub verification_state: Option<CommitState>,
    pub author_avatar_url: Option<String>,
    pub committer_name: Option<String>,
}
