//! Deployment tracking data models.

pub mod commit;
pub mod deployable_version;
pub mod deployment;
pub mod environment;
pub mod service;
