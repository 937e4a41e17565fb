//! Deployment tracker: creation, status transitions and readiness checks.
//!
//! Status changes go through `DeployStore::compare_and_set_status`, so two
//! concurrent `advance` calls on one deployment never both apply against
//! the same prior status. The loser re-reads and is validated against the
//! winner's status.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{DeployError, DeployResult};
use crate::models::commit::CommitState;
use crate::models::deployable_version::DeployableVersion;
use crate::models::deployment::{timestamp_now, Deployment, DeploymentStatus, NewDeployment};
use crate::scm::Verifier;
use crate::store::{DeployStore, DeploymentFilter};

/// Request to place one registered version into one environment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeployment {
    pub environment_name: String,
    pub service_id: i64,
    pub commit_sha: String,
    pub requested_by: String,
    #[serde(default)]
    pub source_version: String,
}

#[derive(Clone)]
pub struct DeploymentTracker {
    store: Arc<dyn DeployStore>,
    verifier: Verifier,
}

impl DeploymentTracker {
    pub fn new(store: Arc<dyn DeployStore>, verifier: Verifier) -> Self {
        Self { store, verifier }
    }

    /// Create a `PENDING` deployment.
    ///
    /// Fails with `UnknownEnvironment` or `UnknownVersion` when either
    /// reference cannot be resolved.
    pub async fn create(&self, request: CreateDeployment) -> DeployResult<Deployment> {
        let environment = self
            .store
            .find_environment_by_name(&request.environment_name)
            .await?
            .ok_or_else(|| DeployError::UnknownEnvironment(request.environment_name.clone()))?;
        let version = self
            .store
            .find_version(request.service_id, &request.commit_sha)
            .await?
            .ok_or_else(|| DeployError::UnknownVersion {
                service_id: request.service_id,
                commit_sha: request.commit_sha.clone(),
            })?;

        let deployment = self
            .store
            .insert_deployment(&NewDeployment {
                environment_id: environment.id,
                service_id: version.service_id,
                deployable_version_id: version.id,
                requested_by: request.requested_by,
                status: DeploymentStatus::Pending,
                source_version: request.source_version,
                started_at: timestamp_now(),
            })
            .await?;

        crate::metrics::deployment_created(&environment.name);
        tracing::info!(
            deployment_id = deployment.id,
            environment = %environment.name,
            service_id = deployment.service_id,
            sha = %version.commit_sha,
            requested_by = %deployment.requested_by,
            "Deployment created"
        );
        Ok(deployment)
    }

    /// Move a deployment forward to `next`.
    ///
    /// Fails with `NotFound` for an unknown id and with `InvalidTransition`
    /// when the current status does not allow `next`.
    pub async fn advance(&self, id: i64, next: DeploymentStatus) -> DeployResult<Deployment> {
        loop {
            let current = self.get(id).await?;
            if !current.status.can_transition_to(next) {
                crate::metrics::transition_rejected(current.status.as_str());
                tracing::info!(
                    deployment_id = id,
                    from = %current.status,
                    to = %next,
                    "Rejected status transition"
                );
                return Err(DeployError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }

            // Never stamp earlier than creation, even if the clock stepped back.
            let at = timestamp_now().max(current.started_at);
            match self
                .store
                .compare_and_set_status(id, current.status, next, at)
                .await?
            {
                Some(updated) => {
                    crate::metrics::deployment_status_changed(next.as_str());
                    tracing::info!(
                        deployment_id = id,
                        from = %current.status,
                        to = %next,
                        "Deployment status changed"
                    );
                    return Ok(updated);
                }
                None => {
                    tracing::debug!(deployment_id = id, "Status changed concurrently, re-reading");
                }
            }
        }
    }

    /// Whether the deployed commit's latest status check succeeded.
    ///
    /// Advisory only. `false` also covers a commit that source control could
    /// not resolve; use `readiness` to tell the two apart.
    pub async fn verify_readiness(&self, id: i64) -> DeployResult<bool> {
        let version = self.version_of(id).await?;
        Ok(self
            .verifier
            .is_commit_status_successful(&version.repo_identifier(), &version.commit_sha)
            .await)
    }

    /// Latest status check of the deployed commit, `None` when it has none.
    /// Fails with `VerificationUnavailable` when the commit cannot be resolved.
    pub async fn readiness(&self, id: i64) -> DeployResult<Option<CommitState>> {
        let version = self.version_of(id).await?;
        let repo = version.repo_identifier();
        self.verifier
            .fetch_commit_details(&repo, &version.commit_sha)
            .await
            .map(|details| details.verification_state)
            .ok_or(DeployError::VerificationUnavailable {
                repo,
                sha: version.commit_sha,
            })
    }

    /// Whether the deployed commit is in `branch`'s recent history.
    pub async fn is_in_branch_history(&self, id: i64, branch: &str) -> DeployResult<bool> {
        let version = self.version_of(id).await?;
        Ok(self
            .verifier
            .is_commit_in_branch_history(&version.repo_identifier(), branch, &version.commit_sha)
            .await)
    }

    pub async fn get(&self, id: i64) -> DeployResult<Deployment> {
        self.store
            .get_deployment(id)
            .await?
            .ok_or_else(|| DeployError::not_found("deployment", id))
    }

    pub async fn list(&self, filter: &DeploymentFilter) -> DeployResult<Vec<Deployment>> {
        self.store.list_deployments(filter).await
    }

    async fn version_of(&self, id: i64) -> DeployResult<DeployableVersion> {
        let deployment = self.get(id).await?;
        self.store
            .get_version(deployment.deployable_version_id)
            .await?
            .ok_or_else(|| {
                DeployError::storage(format!(
                    "deployment {id} references missing version {}",
                    deployment.deployable_version_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Fixture, CHECKOUT_REPO};

    fn checkout_request(service_id: i64) -> CreateDeployment {
        CreateDeployment {
            environment_name: "prod-us".into(),
            service_id,
            commit_sha: "abc123".into(),
            requested_by: "ops@acme.com".into(),
            source_version: "v1.4.0".into(),
        }
    }

    #[tokio::test]
    async fn create_starts_pending_with_equal_timestamps() {
        let fx = Fixture::new();
        let (service_id, version_id, env_id) = fx.seed_checkout().await;

        let deployment = fx.tracker.create(checkout_request(service_id)).await.unwrap();

        assert_eq!(deployment.status, DeploymentStatus::Pending);
        assert_eq!(deployment.environment_id, env_id);
        assert_eq!(deployment.deployable_version_id, version_id);
        assert_eq!(deployment.requested_by, "ops@acme.com");
        assert_eq!(deployment.started_at, deployment.last_updated_at);
    }

    #[tokio::test]
    async fn create_rejects_unknown_references() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;

        let mut request = checkout_request(service_id);
        request.environment_name = "staging".into();
        let err = fx.tracker.create(request).await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownEnvironment(name) if name == "staging"));

        let mut request = checkout_request(service_id);
        request.commit_sha = "fff999".into();
        let err = fx.tracker.create(request).await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownVersion { .. }));

        let err = fx.tracker.create(checkout_request(service_id + 1)).await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownVersion { .. }));
    }

    #[tokio::test]
    async fn in_progress_then_done_then_nothing() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;
        let created = fx.tracker.create(checkout_request(service_id)).await.unwrap();

        let running = fx
            .tracker
            .advance(created.id, DeploymentStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(running.status, DeploymentStatus::InProgress);
        let done = fx
            .tracker
            .advance(created.id, DeploymentStatus::Done)
            .await
            .unwrap();
        assert_eq!(done.status, DeploymentStatus::Done);
        assert_eq!(done.started_at, created.started_at);
        assert!(done.last_updated_at >= done.started_at);

        let err = fx
            .tracker
            .advance(created.id, DeploymentStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidTransition {
                from: DeploymentStatus::Done,
                to: DeploymentStatus::InProgress
            }
        ));
        assert_eq!(fx.tracker.get(created.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn terminal_deployments_reject_every_target() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;

        for terminal in [
            DeploymentStatus::Done,
            DeploymentStatus::Failed,
            DeploymentStatus::Canceled,
        ] {
            let d = fx.tracker.create(checkout_request(service_id)).await.unwrap();
            fx.tracker.advance(d.id, DeploymentStatus::InProgress).await.unwrap();
            fx.tracker.advance(d.id, terminal).await.unwrap();

            for target in DeploymentStatus::ALL {
                let err = fx.tracker.advance(d.id, target).await.unwrap_err();
                assert!(
                    matches!(err, DeployError::InvalidTransition { from, .. } if from == terminal),
                    "{terminal} -> {target} should be rejected"
                );
            }
        }
    }

    #[tokio::test]
    async fn pending_cannot_jump_to_done() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;
        let d = fx.tracker.create(checkout_request(service_id)).await.unwrap();

        let err = fx.tracker.advance(d.id, DeploymentStatus::Done).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidTransition { .. }));
        assert!(fx.tracker.advance(d.id, DeploymentStatus::Canceled).await.is_ok());
    }

    #[tokio::test]
    async fn advance_unknown_id_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .tracker
            .advance(42, DeploymentStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::NotFound { entity: "deployment", .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_advances_have_one_winner() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;
        let d = fx.tracker.create(checkout_request(service_id)).await.unwrap();
        fx.tracker.advance(d.id, DeploymentStatus::InProgress).await.unwrap();
        let id = d.id;

        let done = {
            let tracker = fx.tracker.clone();
            tokio::spawn(async move { tracker.advance(id, DeploymentStatus::Done).await })
        };
        let failed = {
            let tracker = fx.tracker.clone();
            tokio::spawn(async move { tracker.advance(id, DeploymentStatus::Failed).await })
        };
        let results = [done.await.unwrap(), failed.await.unwrap()];

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let stored = fx.tracker.get(id).await.unwrap();
        assert_eq!(stored.status, winners[0].status);
        assert_eq!(stored.last_updated_at, winners[0].last_updated_at);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(DeployError::InvalidTransition { .. }))));
    }

    #[tokio::test]
    async fn readiness_reports_status_and_unavailability() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;
        let d = fx.tracker.create(checkout_request(service_id)).await.unwrap();

        assert!(!fx.tracker.verify_readiness(d.id).await.unwrap());
        let err = fx.tracker.readiness(d.id).await.unwrap_err();
        assert!(matches!(err, DeployError::VerificationUnavailable { repo, .. } if repo == CHECKOUT_REPO));

        fx.scm.add_commit(
            CHECKOUT_REPO,
            "abc123",
            "2024-01-10T12:00:00Z".parse().unwrap(),
            Some(CommitState::Success),
        );
        assert!(fx.tracker.verify_readiness(d.id).await.unwrap());
        assert_eq!(
            fx.tracker.readiness(d.id).await.unwrap(),
            Some(CommitState::Success)
        );
    }

    #[tokio::test]
    async fn branch_history_check_uses_deployed_commit() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;
        let d = fx.tracker.create(checkout_request(service_id)).await.unwrap();
        fx.scm.add_commit(
            CHECKOUT_REPO,
            "abc123",
            "2024-01-10T12:00:00Z".parse().unwrap(),
            None,
        );
        fx.scm.set_branch(CHECKOUT_REPO, "main", &["fff999", "abc123"]);
        fx.scm.set_branch(CHECKOUT_REPO, "hotfix", &["0001aa"]);

        assert!(fx.tracker.is_in_branch_history(d.id, "main").await.unwrap());
        assert!(!fx.tracker.is_in_branch_history(d.id, "hotfix").await.unwrap());
        assert!(fx.tracker.is_in_branch_history(99, "main").await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let fx = Fixture::new();
        let (service_id, _, _) = fx.seed_checkout().await;
        let first = fx.tracker.create(checkout_request(service_id)).await.unwrap();
        let second = fx.tracker.create(checkout_request(service_id)).await.unwrap();
        fx.tracker.advance(first.id, DeploymentStatus::Canceled).await.unwrap();

        let pending = fx
            .tracker
            .list(&DeploymentFilter::new().with_status(DeploymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        let all = fx.tracker.list(&DeploymentFilter::new()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
