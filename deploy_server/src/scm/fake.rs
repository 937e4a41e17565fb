//! Scripted in-process `SourceControl` for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::commit::{CommitDetails, CommitState};

use super::{CommitQuery, ScmError, SourceControl};

#[derive(Default)]
struct Script {
    commits: HashMap<(String, String), CommitDetails>,
    branches: HashMap<(String, String), Vec<String>>,
    default_branches: HashMap<String, String>,
    queries: Vec<CommitQuery>,
    commit_lookups: usize,
}

impl Script {
    fn select(&self, repo: &str, query: &CommitQuery) -> Result<Vec<String>, ScmError> {
        let branch = match &query.branch {
            Some(branch) => branch.clone(),
            None => self
                .default_branches
                .get(repo)
                .cloned()
                .ok_or_else(|| ScmError::NotFound(format!("{repo} default branch")))?,
        };
        let shas = self
            .branches
            .get(&(repo.to_string(), branch.clone()))
            .ok_or_else(|| ScmError::NotFound(format!("{repo}:{branch}")))?;

        let since_filtered = shas.iter().filter(|sha| {
            match (query.since, self.commits.get(&(repo.to_string(), (*sha).clone()))) {
                (Some(since), Some(details)) => details.commit_date >= since,
                _ => true,
            }
        });
        Ok(since_filtered
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// Answers from a fixed script; anything not scripted is `NotFound`.
/// Records every history query and counts commit lookups.
#[derive(Default)]
pub struct ScriptedScm {
    script: Mutex<Script>,
}

impl ScriptedScm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_commit(
        &self,
        repo: &str,
        sha: &str,
        commit_date: DateTime<Utc>,
        state: Option<CommitState>,
    ) {
        let details = CommitDetails {
            sha: sha.to_string(),
            html_url: format!("https://github.com/{repo}/commit/{sha}"),
            message: format!("commit {sha}"),
            commit_date,
            verification_state: state,
            author_avatar_url: None,
            committer_name: Some("octocat".to_string()),
        };
        self.script
            .lock()
            .unwrap()
            .commits
            .insert((repo.to_string(), sha.to_string()), details);
    }

    /// Shas on `branch`, most recent first.
    pub fn set_branch(&self, repo: &str, branch: &str, shas: &[&str]) {
        self.script.lock().unwrap().branches.insert(
            (repo.to_string(), branch.to_string()),
            shas.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_default_branch(&self, repo: &str, branch: &str) {
        self.script
            .lock()
            .unwrap()
            .default_branches
            .insert(repo.to_string(), branch.to_string());
    }

    pub fn recorded_queries(&self) -> Vec<CommitQuery> {
        self.script.lock().unwrap().queries.clone()
    }

    pub fn commit_lookups(&self) -> usize {
        self.script.lock().unwrap().commit_lookups
    }
}

#[async_trait]
impl SourceControl for ScriptedScm {
    async fn commit(&self, repo: &str, sha: &str) -> Result<CommitDetails, ScmError> {
        let mut script = self.script.lock().unwrap();
        script.commit_lookups += 1;
        script
            .commits
            .get(&(repo.to_string(), sha.to_string()))
            .cloned()
            .ok_or_else(|| ScmError::NotFound(format!("{repo}@{sha}")))
    }

    async fn list_commits(&self, repo: &str, query: &CommitQuery) -> Result<Vec<String>, ScmError> {
        let mut script = self.script.lock().unwrap();
        script.queries.push(query.clone());
        script.select(repo, query)
    }

    async fn contains_commit(
        &self,
        repo: &str,
        query: &CommitQuery,
        sha: &str,
    ) -> Result<bool, ScmError> {
        let mut script = self.script.lock().unwrap();
        script.queries.push(query.clone());
        Ok(script.select(repo, query)?.iter().any(|candidate| candidate == sha))
    }

    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, ScmError> {
        self.script
            .lock()
            .unwrap()
            .branches
            .get(&(repo.to_string(), branch.to_string()))
            .and_then(|shas| shas.first().cloned())
            .ok_or_else(|| ScmError::NotFound(format!("{repo}:{branch}")))
    }
}
