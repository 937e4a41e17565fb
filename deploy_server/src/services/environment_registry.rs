//! Environment registration and lookup. Environments are append-only.

use std::sync::Arc;

use crate::error::{DeployError, DeployResult};
use crate::models::environment::{Environment, NewEnvironment};
use crate::store::DeployStore;

#[derive(Clone)]
pub struct EnvironmentRegistry {
    store: Arc<dyn DeployStore>,
}

impl EnvironmentRegistry {
    pub fn new(store: Arc<dyn DeployStore>) -> Self {
        Self { store }
    }

    /// Register a target. Fails with `DuplicateEnvironment` if the name is taken.
    pub async fn register(&self, new: NewEnvironment) -> DeployResult<Environment> {
        if new.name.trim().is_empty() {
            return Err(DeployError::Validation(
                "environment name must not be empty".into(),
            ));
        }

        let environment = self.store.insert_environment(new).await?;
        tracing::info!(
            environment_id = environment.id,
            name = %environment.name,
            region = %environment.geo_region,
            "Environment registered"
        );
        Ok(environment)
    }

    pub async fn lookup(&self, name: &str) -> DeployResult<Option<Environment>> {
        self.store.find_environment_by_name(name).await
    }

    pub async fn list(&self) -> DeployResult<Vec<Environment>> {
        self.store.list_environments().await
    }
}
