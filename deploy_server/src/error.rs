//! Error taxonomy for the deployment tracker.

use crate::models::deployment::DeploymentStatus;

/// Result alias used by the store, registries and tracker.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors raised by registry and tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("unknown service: {0}")]
    UnknownService(i64),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("unknown version {commit_sha} for service {service_id}")]
    UnknownVersion { service_id: i64, commit_sha: String },

    #[error("service already exists: {0}")]
    DuplicateService(String),

    #[error("version {commit_sha} already registered for service {service_id}")]
    DuplicateVersion { service_id: i64, commit_sha: String },

    #[error("environment already exists: {0}")]
    DuplicateEnvironment(String),

    /// Status change that is not a forward move in the lifecycle.
    #[error("invalid transition: cannot move deployment from {from} to {to}")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// Source control could not produce an answer.
    #[error("source control verification unavailable for {repo}@{sha}")]
    VerificationUnavailable { repo: String, sha: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Coarse error categories, used by callers that only care about the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateEntity,
    InvalidTransition,
    VerificationUnavailable,
    Invalid,
    Storage,
}

impl DeployError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::UnknownService(_)
            | Self::UnknownEnvironment(_)
            | Self::UnknownVersion { .. } => ErrorKind::NotFound,
            Self::DuplicateService(_)
            | Self::DuplicateVersion { .. }
            | Self::DuplicateEnvironment(_) => ErrorKind::DuplicateEntity,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::VerificationUnavailable { .. } => ErrorKind::VerificationUnavailable,
            Self::Validation(_) => ErrorKind::Invalid,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}
