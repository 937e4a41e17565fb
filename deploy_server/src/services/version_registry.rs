//! Deployable version registration, lookup, and source-control backed queries.

use std::sync::Arc;

use crate::error::{DeployError, DeployResult};
use crate::models::commit::CommitDetails;
use crate::models::deployable_version::{DeployableVersion, NewDeployableVersion};
use crate::scm::Verifier;
use crate::store::DeployStore;

#[derive(Clone)]
pub struct VersionRegistry {
    store: Arc<dyn DeployStore>,
    verifier: Verifier,
}

impl VersionRegistry {
    pub fn new(store: Arc<dyn DeployStore>, verifier: Verifier) -> Self {
        Self { store, verifier }
    }

    /// Register an immutable (service, commit) pair.
    ///
    /// Fails with `UnknownService` if the service does not exist and with
    /// `DuplicateVersion` if the pair is already registered.
    pub async fn register(
        &self,
        service_id: i64,
        commit_sha: &str,
        repository_url: &str,
    ) -> DeployResult<DeployableVersion> {
        let commit_sha = commit_sha.trim();
        if commit_sha.is_empty() {
            return Err(DeployError::Validation("commit sha must not be empty".into()));
        }
        if repository_url.trim().is_empty() {
            return Err(DeployError::Validation(
                "repository url must not be empty".into(),
            ));
        }
        self.require_service(service_id).await?;

        let version = self
            .store
            .insert_version(NewDeployableVersion {
                service_id,
                commit_sha: commit_sha.to_string(),
                repository_url: repository_url.trim().to_string(),
            })
            .await?;
        tracing::info!(
            version_id = version.id,
            service_id,
            sha = %version.commit_sha,
            "Deployable version registered"
        );
        Ok(version)
    }

    pub async fn lookup(
        &self,
        service_id: i64,
        commit_sha: &str,
    ) -> DeployResult<Option<DeployableVersion>> {
        self.store.find_version(service_id, commit_sha).await
    }

    /// Versions of a service, most recently registered first.
    pub async fn list(&self, service_id: i64) -> DeployResult<Vec<DeployableVersion>> {
        self.store.list_versions(service_id).await
    }

    /// Registered versions among the `count` latest commits on the default
    /// branch of the service's repository, most recent commit first.
    ///
    /// The repository is taken from the service's newest registered version.
    /// Empty when the service has no versions or source control cannot answer.
    /// Fails with `UnknownService` if the service does not exist.
    pub async fn latest_versions(
        &self,
        service_id: i64,
        count: usize,
    ) -> DeployResult<Vec<DeployableVersion>> {
        self.require_service(service_id).await?;
        let versions = self.store.list_versions(service_id).await?;
        let Some(newest) = versions.first() else {
            return Ok(Vec::new());
        };

        let shas = self
            .verifier
            .latest_commit_shas(&newest.repo_identifier(), count)
            .await;
        Ok(shas
            .iter()
            .filter_map(|sha| versions.iter().find(|v| &v.commit_sha == sha).cloned())
            .collect())
    }

    /// The registered version at the head of `branch`.
    pub async fn version_at_branch_head(
        &self,
        service_id: i64,
        branch: &str,
    ) -> DeployResult<DeployableVersion> {
        self.require_service(service_id).await?;
        let versions = self.store.list_versions(service_id).await?;
        let newest = versions
            .first()
            .ok_or_else(|| DeployError::not_found("deployable version", format!("service {service_id}")))?;

        let head = self
            .verifier
            .latest_commit_sha_on_branch(&newest.repo_identifier(), branch)
            .await;
        if head.is_empty() {
            return Err(DeployError::not_found("branch head", branch));
        }

        versions
            .into_iter()
            .find(|v| v.commit_sha == head)
            .ok_or(DeployError::UnknownVersion {
                service_id,
                commit_sha: head,
            })
    }

    async fn require_service(&self, service_id: i64) -> DeployResult<()> {
        match self.store.get_service(service_id).await? {
            Some(_) => Ok(()),
            None => Err(DeployError::UnknownService(service_id)),
        }
    }

    /// Commit metadata for a registered version.
    ///
    /// Unlike the boolean checks, an unresolvable commit surfaces as
    /// `VerificationUnavailable`.
    pub async fn commit_details(
        &self,
        service_id: i64,
        commit_sha: &str,
    ) -> DeployResult<CommitDetails> {
        let version = self
            .store
            .find_version(service_id, commit_sha)
            .await?
            .ok_or_else(|| DeployError::UnknownVersion {
                service_id,
                commit_sha: commit_sha.to_string(),
            })?;

        let repo = version.repo_identifier();
        self.verifier
            .fetch_commit_details(&repo, &version.commit_sha)
            .await
            .ok_or(DeployError::VerificationUnavailable {
                repo,
                sha: version.commit_sha,
            })
    }
}
