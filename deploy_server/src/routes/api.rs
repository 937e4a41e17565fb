//! Request/response bodies for the REST API and the error-to-status mapping.

use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, ErrorKind};
use crate::models::commit::CommitState;
use crate::store::DeploymentFilter;

/// Error body returned by every failing handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error: status plus JSON body.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub const fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateEntity => StatusCode::CONFLICT,
        ErrorKind::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::VerificationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DeployError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: DeployError) -> Self {
        let status = error_status(err.kind());
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        } else {
            tracing::debug!(error = %err, status = status.as_u16(), "Request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
    }
}

// ── Services ──

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListServicesQuery {
    /// Exact-name filter.
    pub name: Option<String>,
}

// ── Versions ──

#[derive(Debug, Deserialize)]
pub struct RegisterVersionRequest {
    pub commit_sha: String,
    pub repository_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestVersionsQuery {
    pub count: Option<usize>,
}

pub const DEFAULT_LATEST_COUNT: usize = 10;

// ── Deployments ──

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    /// Target status, e.g. `IN_PROGRESS`.
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDeploymentsQuery {
    pub environment_id: Option<i64>,
    pub service_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl ListDeploymentsQuery {
    pub fn into_filter(self) -> Result<DeploymentFilter, DeployError> {
        let mut filter = DeploymentFilter::new();
        if let Some(id) = self.environment_id {
            filter = filter.with_environment(id);
        }
        if let Some(id) = self.service_id {
            filter = filter.with_service(id);
        }
        if let Some(status) = self.status {
            filter = filter.with_status(status.parse()?);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}

/// Readiness of a deployment's commit.
///
/// Advisory readiness: true only when the deployed commit's latest status
/// check is success.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub deployment_id: i64,
    pub ready: bool,
}

/// `ready` is the advisory boolean. `state` and `verification_available`
/// separate a failed check from a commit source control could not resolve.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub deployment_id: i64,
    pub ready: bool,
    pub verification_available: bool,
    pub state: Option<CommitState>,
}

#[derive(Debug, Deserialize)]
pub struct BranchCheckQuery {
    pub branch: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BranchCheckResponse {
    pub deployment_id: i64,
    pub branch: String,
    pub in_history: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
