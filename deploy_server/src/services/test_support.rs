//! Shared fixtures for service-layer and route tests.

use std::sync::Arc;
use std::time::Duration;

use crate::models::environment::NewEnvironment;
use crate::scm::fake::ScriptedScm;
use crate::scm::Verifier;
use crate::store::{DeployStore, MemoryStore};

use super::deployment_tracker::DeploymentTracker;
use super::environment_registry::EnvironmentRegistry;
use super::service_registry::ServiceRegistry;
use super::version_registry::VersionRegistry;

pub const CHECKOUT_URL: &str = "https://github.com/acme/checkout-api";
pub const CHECKOUT_REPO: &str = "acme/checkout-api";

pub fn prod_us() -> NewEnvironment {
    NewEnvironment {
        name: "prod-us".into(),
        geo_region: "us-east-1".into(),
        availability: "PROD".into(),
        cluster_endpoint: "https://k8s.prod-us.acme.internal".into(),
        cluster_credential: "s3cr3t-token".into(),
    }
}

/// In-memory store and scripted source control wired into every service.
pub struct Fixture {
    pub scm: Arc<ScriptedScm>,
    pub services: ServiceRegistry,
    pub environments: EnvironmentRegistry,
    pub versions: VersionRegistry,
    pub tracker: DeploymentTracker,
}

impl Fixture {
    pub fn new() -> Self {
        let store: Arc<dyn DeployStore> = Arc::new(MemoryStore::new());
        let scm = Arc::new(ScriptedScm::new());
        let verifier = Verifier::new(scm.clone(), Duration::from_secs(5));

        Self {
            services: ServiceRegistry::new(store.clone()),
            environments: EnvironmentRegistry::new(store.clone()),
            versions: VersionRegistry::new(store.clone(), verifier.clone()),
            tracker: DeploymentTracker::new(store, verifier),
            scm,
        }
    }

    /// `checkout-api` at `abc123` plus the `prod-us` environment.
    /// Returns `(service_id, version_id, environment_id)`.
    pub async fn seed_checkout(&self) -> (i64, i64, i64) {
        let service = self.services.create("checkout-api").await.unwrap();
        let version = self
            .versions
            .register(service.id, "abc123", CHECKOUT_URL)
            .await
            .unwrap();
        let env = self.environments.register(prod_us()).await.unwrap();
        (service.id, version.id, env.id)
    }
}
