//! In-memory store for tests and database-less local runs.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DeployError, DeployResult};
use crate::models::deployable_version::{DeployableVersion, NewDeployableVersion};
use crate::models::deployment::{Deployment, DeploymentStatus, NewDeployment};
use crate::models::environment::{Environment, NewEnvironment};
use crate::models::service::{NewService, Service};

use super::{DeployStore, DeploymentFilter};

#[derive(Debug, Default)]
struct Tables {
    services: Vec<Service>,
    versions: Vec<DeployableVersion>,
    environments: Vec<Environment>,
    deployments: Vec<Deployment>,
}

/// Process-local store. Data is lost when the process exits.
///
/// Every table sits behind one lock, so each operation is atomic with
/// respect to every other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DeployResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| DeployError::storage("lock poisoned"))
    }

    fn write(&self) -> DeployResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| DeployError::storage("lock poisoned"))
    }
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX - 1) + 1
}

#[async_trait]
impl DeployStore for MemoryStore {
    async fn insert_service(&self, new: NewService) -> DeployResult<Service> {
        let mut tables = self.write()?;
        if tables.services.iter().any(|s| s.name == new.name) {
            return Err(DeployError::DuplicateService(new.name));
        }
        let service = Service {
            id: next_id(tables.services.len()),
            name: new.name,
        };
        tables.services.push(service.clone());
        Ok(service)
    }

    async fn get_service(&self, id: i64) -> DeployResult<Option<Service>> {
        Ok(self.read()?.services.iter().find(|s| s.id == id).cloned())
    }

    async fn find_service_by_name(&self, name: &str) -> DeployResult<Option<Service>> {
        Ok(self.read()?.services.iter().find(|s| s.name == name).cloned())
    }

    async fn list_services(&self) -> DeployResult<Vec<Service>> {
        Ok(self.read()?.services.clone())
    }

    async fn insert_version(&self, new: NewDeployableVersion) -> DeployResult<DeployableVersion> {
        let mut tables = self.write()?;
        if !tables.services.iter().any(|s| s.id == new.service_id) {
            return Err(DeployError::UnknownService(new.service_id));
        }
        if tables
            .versions
            .iter()
            .any(|v| v.service_id == new.service_id && v.commit_sha == new.commit_sha)
        {
            return Err(DeployError::DuplicateVersion {
                service_id: new.service_id,
                commit_sha: new.commit_sha,
            });
        }
        let version = DeployableVersion {
            id: next_id(tables.versions.len()),
            service_id: new.service_id,
            commit_sha: new.commit_sha,
            repository_url: new.repository_url,
        };
        tables.versions.push(version.clone());
        Ok(version)
    }

    async fn get_version(&self, id: i64) -> DeployResult<Option<DeployableVersion>> {
        Ok(self.read()?.versions.iter().find(|v| v.id == id).cloned())
    }

    async fn find_version(
        &self,
        service_id: i64,
        commit_sha: &str,
    ) -> DeployResult<Option<DeployableVersion>> {
        Ok(self
            .read()?
            .versions
            .iter()
            .find(|v| v.service_id == service_id && v.commit_sha == commit_sha)
            .cloned())
    }

    async fn list_versions(&self, service_id: i64) -> DeployResult<Vec<DeployableVersion>> {
        Ok(self
            .read()?
            .versions
            .iter()
            .rev()
            .filter(|v| v.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn insert_environment(&self, new: NewEnvironment) -> DeployResult<Environment> {
        let mut tables = self.write()?;
        if tables.environments.iter().any(|e| e.name == new.name) {
            return Err(DeployError::DuplicateEnvironment(new.name));
        }
        let environment = Environment {
            id: next_id(tables.environments.len()),
            name: new.name,
            geo_region: new.geo_region,
            availability: new.availability,
            cluster_endpoint: new.cluster_endpoint,
            cluster_credential: new.cluster_credential,
        };
        tables.environments.push(environment.clone());
        Ok(environment)
    }

    async fn get_environment(&self, id: i64) -> DeployResult<Option<Environment>> {
        Ok(self.read()?.environments.iter().find(|e| e.id == id).cloned())
    }

    async fn find_environment_by_name(&self, name: &str) -> DeployResult<Option<Environment>> {
        Ok(self
            .read()?
            .environments
            .iter()
            .find(|e| e.name == name)
            .cloned())
    }

    async fn list_environments(&self) -> DeployResult<Vec<Environment>> {
        Ok(self.read()?.environments.clone())
    }

    async fn insert_deployment(&self, new: &NewDeployment) -> DeployResult<Deployment> {
        let mut tables = self.write()?;
        if !tables.environments.iter().any(|e| e.id == new.environment_id) {
            return Err(DeployError::not_found("environment", new.environment_id));
        }
        let version = tables
            .versions
            .iter()
            .find(|v| v.id == new.deployable_version_id)
            .ok_or_else(|| DeployError::not_found("deployable version", new.deployable_version_id))?;
        if version.service_id != new.service_id {
            return Err(DeployError::Validation(format!(
                "version {} belongs to service {}, not {}",
                version.id, version.service_id, new.service_id
            )));
        }
        let deployment = Deployment {
            id: next_id(tables.deployments.len()),
            environment_id: new.environment_id,
            service_id: new.service_id,
            deployable_version_id: new.deployable_version_id,
            requested_by: new.requested_by.clone(),
            status: new.status,
            source_version: new.source_version.clone(),
            started_at: new.started_at,
            last_updated_at: new.started_at,
        };
        tables.deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, id: i64) -> DeployResult<Option<Deployment>> {
        Ok(self.read()?.deployments.iter().find(|d| d.id == id).cloned())
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> DeployResult<Vec<Deployment>> {
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        Ok(self
            .read()?
            .deployments
            .iter()
            .rev()
            .filter(|d| filter.matches(d))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: DeploymentStatus,
        next: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> DeployResult<Option<Deployment>> {
        let mut tables = self.write()?;
        let Some(deployment) = tables
            .deployments
            .iter_mut()
            .find(|d| d.id == id && d.status == expected)
        else {
            return Ok(None);
        };
        deployment.status = next;
        deployment.last_updated_at = at;
        Ok(Some(deployment.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::timestamp_now;

    async fn seeded() -> (MemoryStore, Service, DeployableVersion, Environment) {
        let store = MemoryStore::new();
        let service = store
            .insert_service(NewService {
                name: "checkout-api".into(),
            })
            .await
            .unwrap();
        let version = store
            .insert_version(NewDeployableVersion {
                service_id: service.id,
                commit_sha: "abc123".into(),
                repository_url: "https://github.com/acme/checkout-api".into(),
            })
            .await
            .unwrap();
        let environment = store
            .insert_environment(NewEnvironment {
                name: "prod-us".into(),
                geo_region: "us-east-1".into(),
                availability: "PROD".into(),
                cluster_endpoint: "https://k8s.prod-us".into(),
                cluster_credential: "token".into(),
            })
            .await
            .unwrap();
        (store, service, version, environment)
    }

    fn new_deployment(service: &Service, version: &DeployableVersion, env: &Environment) -> NewDeployment {
        NewDeployment {
            environment_id: env.id,
            service_id: service.id,
            deployable_version_id: version.id,
            requested_by: "ops@acme.com".into(),
            status: DeploymentStatus::Pending,
            source_version: String::new(),
            started_at: timestamp_now(),
        }
    }

    #[tokio::test]
    async fn duplicate_service_name_rejected() {
        let (store, ..) = seeded().await;
        let err = store
            .insert_service(NewService {
                name: "checkout-api".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::DuplicateService(name) if name == "checkout-api"));
    }

    #[tokio::test]
    async fn version_requires_existing_service() {
        let store = MemoryStore::new();
        let err = store
            .insert_version(NewDeployableVersion {
                service_id: 42,
                commit_sha: "abc123".into(),
                repository_url: "https://github.com/acme/x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UnknownService(42)));
    }

    #[tokio::test]
    async fn versions_listed_newest_first() {
        let (store, service, first, _) = seeded().await;
        let second = store
            .insert_version(NewDeployableVersion {
                service_id: service.id,
                commit_sha: "def456".into(),
                repository_url: first.repository_url.clone(),
            })
            .await
            .unwrap();
        let listed = store.list_versions(service.id).await.unwrap();
        assert_eq!(listed, vec![second, first]);
    }

    #[tokio::test]
    async fn deployment_version_must_match_service() {
        let (store, service, version, env) = seeded().await;
        let other = store
            .insert_service(NewService {
                name: "billing".into(),
            })
            .await
            .unwrap();
        let mut new = new_deployment(&service, &version, &env);
        new.service_id = other.id;
        let err = store.insert_deployment(&new).await.unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
    }

    #[tokio::test]
    async fn compare_and_set_has_one_winner() {
        let (store, service, version, env) = seeded().await;
        let created = store
            .insert_deployment(&new_deployment(&service, &version, &env))
            .await
            .unwrap();
        let at = timestamp_now();

        let first = store
            .compare_and_set_status(created.id, DeploymentStatus::Pending, DeploymentStatus::InProgress, at)
            .await
            .unwrap();
        let second = store
            .compare_and_set_status(created.id, DeploymentStatus::Pending, DeploymentStatus::Canceled, at)
            .await
            .unwrap();

        assert_eq!(first.unwrap().status, DeploymentStatus::InProgress);
        assert!(second.is_none());
        let stored = store.get_deployment(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::InProgress);
    }

    #[tokio::test]
    async fn list_deployments_filters_and_limits() {
        let (store, service, version, env) = seeded().await;
        for _ in 0..3 {
            store
                .insert_deployment(&new_deployment(&service, &version, &env))
                .await
                .unwrap();
        }
        store
            .compare_and_set_status(1, DeploymentStatus::Pending, DeploymentStatus::InProgress, timestamp_now())
            .await
            .unwrap();

        let pending = store
            .list_deployments(&DeploymentFilter::new().with_status(DeploymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.iter().map(|d| d.id).collect::<Vec<_>>(), vec![3, 2]);

        let limited = store
            .list_deployments(&DeploymentFilter::new().with_service(service.id).with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, 3);

        let none = store
            .list_deployments(&DeploymentFilter::new().with_environment(env.id + 1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
