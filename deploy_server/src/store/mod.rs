//! Storage backends for the registries and the deployment tracker.
//!
//! `PgStore` persists to PostgreSQL through diesel-async. `MemoryStore` keeps
//! everything in process and backs the test suite and database-less runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DeployResult;
use crate::models::deployable_version::{DeployableVersion, NewDeployableVersion};
use crate::models::deployment::{Deployment, DeploymentStatus, NewDeployment};
use crate::models::environment::{Environment, NewEnvironment};
use crate::models::service::{NewService, Service};

/// Default page size for deployment listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Filter criteria for listing deployments.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub environment_id: Option<i64>,
    pub service_id: Option<i64>,
    pub status: Option<DeploymentStatus>,
    pub limit: Option<u32>,
}

impl DeploymentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment_id: i64) -> Self {
        self.environment_id = Some(environment_id);
        self
    }

    pub fn with_service(mut self, service_id: i64) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }

    fn matches(&self, deployment: &Deployment) -> bool {
        self.environment_id.map_or(true, |id| deployment.environment_id == id)
            && self.service_id.map_or(true, |id| deployment.service_id == id)
            && self.status.map_or(true, |s| deployment.status == s)
    }
}

/// Persistence for services, versions, environments and deployments.
///
/// Inserts enforce uniqueness and referential integrity and report the
/// specific `DeployError` variant. Services, versions and environments are
/// append-only; deployments change only through `compare_and_set_status`.
#[async_trait]
pub trait DeployStore: Send + Sync {
    /// Fails with `DuplicateService` when the name is taken.
    async fn insert_service(&self, new: NewService) -> DeployResult<Service>;

    async fn get_service(&self, id: i64) -> DeployResult<Option<Service>>;

    async fn find_service_by_name(&self, name: &str) -> DeployResult<Option<Service>>;

    async fn list_services(&self) -> DeployResult<Vec<Service>>;

    /// Fails with `UnknownService` or `DuplicateVersion`.
    async fn insert_version(&self, new: NewDeployableVersion) -> DeployResult<DeployableVersion>;

    async fn get_version(&self, id: i64) -> DeployResult<Option<DeployableVersion>>;

    async fn find_version(
        &self,
        service_id: i64,
        commit_sha: &str,
    ) -> DeployResult<Option<DeployableVersion>>;

    /// Versions of a service, most recently registered first.
    async fn list_versions(&self, service_id: i64) -> DeployResult<Vec<DeployableVersion>>;

    /// Fails with `DuplicateEnvironment` when the name is taken.
    async fn insert_environment(&self, new: NewEnvironment) -> DeployResult<Environment>;

    async fn get_environment(&self, id: i64) -> DeployResult<Option<Environment>>;

    async fn find_environment_by_name(&self, name: &str) -> DeployResult<Option<Environment>>;

    async fn list_environments(&self) -> DeployResult<Vec<Environment>>;

    /// Insert a deployment. The referenced environment and version must exist
    /// and the version must belong to `new.service_id`.
    async fn insert_deployment(&self, new: &NewDeployment) -> DeployResult<Deployment>;

    async fn get_deployment(&self, id: i64) -> DeployResult<Option<Deployment>>;

    /// Deployments matching the filter, newest first.
    async fn list_deployments(&self, filter: &DeploymentFilter) -> DeployResult<Vec<Deployment>>;

    /// Atomically move deployment `id` from `expected` to `next`, stamping
    /// `last_updated_at = at`.
    ///
    /// Returns `None` when no deployment with that id is currently in
    /// `expected` (unknown id, or a concurrent writer got there first).
    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: DeploymentStatus,
        next: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> DeployResult<Option<Deployment>>;
}
