//! Service registration and lookup. Services are append-only.

use std::sync::Arc;

use crate::error::{DeployError, DeployResult};
use crate::models::service::{NewService, Service};
use crate::store::DeployStore;

#[derive(Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn DeployStore>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn DeployStore>) -> Self {
        Self { store }
    }

    /// Register a service. Fails with `DuplicateService` if the name is taken.
    pub async fn create(&self, name: &str) -> DeployResult<Service> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DeployError::Validation("service name must not be empty".into()));
        }

        let service = self
            .store
            .insert_service(NewService {
                name: name.to_string(),
            })
            .await?;
        tracing::info!(service_id = service.id, name = %service.name, "Service registered");
        Ok(service)
    }

    pub async fn lookup(&self, id: i64) -> DeployResult<Option<Service>> {
        self.store.get_service(id).await
    }

    pub async fn find_by_name(&self, name: &str) -> DeployResult<Option<Service>> {
        self.store.find_service_by_name(name).await
    }

    pub async fn list(&self) -> DeployResult<Vec<Service>> {
        self.store.list_services().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn create_then_find() {
        let registry = ServiceRegistry::new(Arc::new(MemoryStore::new()));
        let created = registry.create("checkout-api").await.unwrap();

        assert_eq!(registry.lookup(created.id).await.unwrap(), Some(created.clone()));
        assert_eq!(
            registry.find_by_name("checkout-api").await.unwrap(),
            Some(created)
        );
        assert!(registry.find_by_name("billing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn names_are_unique_and_non_empty() {
        let registry = ServiceRegistry::new(Arc::new(MemoryStore::new()));
        registry.create("checkout-api").await.unwrap();

        let dup = registry.create("checkout-api").await.unwrap_err();
        assert!(matches!(dup, DeployError::DuplicateService(_)));

        let blank = registry.create("   ").await.unwrap_err();
        assert!(matches!(blank, DeployError::Validation(_)));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }
}
