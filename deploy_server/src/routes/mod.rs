//! Deployment tracker HTTP routes: services, versions, environments, deployments.

pub mod api;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use crate::error::DeployError;
use crate::models::commit::{CommitDetails, CommitState};
use crate::models::deployable_version::DeployableVersion;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::models::environment::{Environment, NewEnvironment};
use crate::models::service::Service;
use crate::services::deployment_tracker::{CreateDeployment, DeploymentTracker};
use crate::services::environment_registry::EnvironmentRegistry;
use crate::services::service_registry::ServiceRegistry;
use crate::services::version_registry::VersionRegistry;

use api::ApiError;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct DeployRouterState {
    pub services: ServiceRegistry,
    pub environments: EnvironmentRegistry,
    pub versions: VersionRegistry,
    pub tracker: DeploymentTracker,
}

/// Build the deployment tracker's Axum router.
pub fn deploy_router(state: DeployRouterState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Service API
        .route("/api/services", post(create_service).get(list_services))
        .route("/api/services/{id}", get(get_service))
        // Version API
        .route(
            "/api/services/{id}/versions",
            post(register_version).get(list_versions),
        )
        .route("/api/services/{id}/versions/latest", get(latest_versions))
        .route("/api/services/{id}/versions/{sha}", get(get_version))
        .route("/api/services/{id}/versions/{sha}/commit", get(commit_details))
        .route(
            "/api/services/{id}/branches/{branch}/version",
            get(version_at_branch_head),
        )
        // Environment API
        .route(
            "/api/environments",
            post(create_environment).get(list_environments),
        )
        .route("/api/environments/{name}", get(get_environment))
        // Deployment API
        .route(
            "/api/deployments",
            post(create_deployment).get(list_deployments),
        )
        .route("/api/deployments/{id}", get(get_deployment))
        .route("/api/deployments/{id}/status", post(advance_deployment))
        .route("/api/deployments/{id}/ready", get(deployment_ready))
        .route("/api/deployments/{id}/readiness", get(deployment_readiness))
        .route("/api/deployments/{id}/branch-check", get(branch_check))
        .with_state(state)
}

async fn health() -> Json<api::HealthResponse> {
    Json(api::HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Service API ──

async fn create_service(
    State(state): State<DeployRouterState>,
    Json(req): Json<api::CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let service = state.services.create(&req.name).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn list_services(
    State(state): State<DeployRouterState>,
    Query(query): Query<api::ListServicesQuery>,
) -> Result<Json<Vec<Service>>, ApiError> {
    let services = match query.name {
        Some(name) => state.services.find_by_name(&name).await?.into_iter().collect(),
        None => state.services.list().await?,
    };
    Ok(Json(services))
}

async fn get_service(
    State(state): State<DeployRouterState>,
    Path(id): Path<i64>,
) -> Result<Json<Service>, ApiError> {
    let service = state
        .services
        .lookup(id)
        .await?
        .ok_or(DeployError::UnknownService(id))?;
    Ok(Json(service))
}

// ── Version API ──

async fn register_version(
    State(state): State<DeployRouterState>,
    Path(service_id): Path<i64>,
    Json(req): Json<api::RegisterVersionRequest>,
) -> Result<(StatusCode, Json<DeployableVersion>), ApiError> {
    let version = state
        .versions
        .register(service_id, &req.commit_sha, &req.repository_url)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

async fn list_versions(
    State(state): State<DeployRouterState>,
    Path(service_id): Path<i64>,
) -> Result<Json<Vec<DeployableVersion>>, ApiError> {
    if state.services.lookup(service_id).await?.is_none() {
        return Err(DeployError::UnknownService(service_id).into());
    }
    Ok(Json(state.versions.list(service_id).await?))
}

async fn get_version(
    State(state): State<DeployRouterState>,
    Path((service_id, sha)): Path<(i64, String)>,
) -> Result<Json<DeployableVersion>, ApiError> {
    let version = state
        .versions
        .lookup(service_id, &sha)
        .await?
        .ok_or(DeployError::UnknownVersion {
            service_id,
            commit_sha: sha,
        })?;
    Ok(Json(version))
}

async fn latest_versions(
    State(state): State<DeployRouterState>,
    Path(service_id): Path<i64>,
    Query(query): Query<api::LatestVersionsQuery>,
) -> Result<Json<Vec<DeployableVersion>>, ApiError> {
    let count = query.count.unwrap_or(api::DEFAULT_LATEST_COUNT);
    Ok(Json(state.versions.latest_versions(service_id, count).await?))
}

async fn version_at_branch_head(
    State(state): State<DeployRouterState>,
    Path((service_id, branch)): Path<(i64, String)>,
) -> Result<Json<DeployableVersion>, ApiError> {
    Ok(Json(
        state
            .versions
            .version_at_branch_head(service_id, &branch)
            .await?,
    ))
}

async fn commit_details(
    State(state): State<DeployRouterState>,
    Path((service_id, sha)): Path<(i64, String)>,
) -> Result<Json<CommitDetails>, ApiError> {
    Ok(Json(state.versions.commit_details(service_id, &sha).await?))
}

// ── Environment API ──

async fn create_environment(
    State(state): State<DeployRouterState>,
    Json(req): Json<NewEnvironment>,
) -> Result<(StatusCode, Json<Environment>), ApiError> {
    let environment = state.environments.register(req).await?;
    Ok((StatusCode::CREATED, Json(environment)))
}

async fn list_environments(
    State(state): State<DeployRouterState>,
) -> Result<Json<Vec<Environment>>, ApiError> {
    Ok(Json(state.environments.list().await?))
}

async fn get_environment(
    State(state): State<DeployRouterState>,
    Path(name): Path<String>,
) -> Result<Json<Environment>, ApiError> {
    let environment = state
        .environments
        .lookup(&name)
        .await?
        .ok_or(DeployError::UnknownEnvironment(name))?;
    Ok(Json(environment))
}

// ── Deployment API ──

async fn create_deployment(
    State(state): State<DeployRouterState>,
    Json(req): Json<CreateDeployment>,
) -> Result<(StatusCode, Json<Deployment>), ApiError> {
    let deployment = state.tracker.create(req).await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

async fn list_deployments(
    State(state): State<DeployRouterState>,
    Query(query): Query<api::ListDeploymentsQuery>,
) -> Result<Json<Vec<Deployment>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.tracker.list(&filter).await?))
}

async fn get_deployment(
    State(state): State<DeployRouterState>,
    Path(id): Path<i64>,
) -> Result<Json<Deployment>, ApiError> {
    Ok(Json(state.tracker.get(id).await?))
}

async fn advance_deployment(
    State(state): State<DeployRouterState>,
    Path(id): Path<i64>,
    Json(req): Json<api::AdvanceRequest>,
) -> Result<Json<Deployment>, ApiError> {
    let next: DeploymentStatus = req.status.parse()?;
    Ok(Json(state.tracker.advance(id, next).await?))
}

async fn deployment_ready(
    State(state): State<DeployRouterState>,
    Path(id): Path<i64>,
) -> Result<Json<api::ReadyResponse>, ApiError> {
    let ready = state.tracker.verify_readiness(id).await?;
    Ok(Json(api::ReadyResponse {
        deployment_id: id,
        ready,
    }))
}

async fn deployment_readiness(
    State(state): State<DeployRouterState>,
    Path(id): Path<i64>,
) -> Result<Json<api::ReadinessResponse>, ApiError> {
    let (verification_available, commit_state): (bool, Option<CommitState>) =
        match state.tracker.readiness(id).await {
            Ok(commit_state) => (true, commit_state),
            Err(DeployError::VerificationUnavailable { .. }) => (false, None),
            Err(e) => return Err(e.into()),
        };

    Ok(Json(api::ReadinessResponse {
        deployment_id: id,
        ready: commit_state == Some(CommitState::Success),
        verification_available,
        state: commit_state,
    }))
}

async fn branch_check(
    State(state): State<DeployRouterState>,
    Path(id): Path<i64>,
    Query(query): Query<api::BranchCheckQuery>,
) -> Result<Json<api::BranchCheckResponse>, ApiError> {
    let in_history = state.tracker.is_in_branch_history(id, &query.branch).await?;
    Ok(Json(api::BranchCheckResponse {
        deployment_id: id,
        branch: query.branch,
        in_history,
    }))
}
