//! Registries and the deployment tracker: business logic over `DeployStore`.

pub mod deployment_tracker;
pub mod environment_registry;
pub mod service_registry;
pub mod version_registry;

#[cfg(test)]
pub(crate) mod test_support;
