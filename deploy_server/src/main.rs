//! Deploytrack server: tracks which service versions are deployed where.
//!
//! Registers services, their deployable commits and target environments,
//! records deployments through their lifecycle, and checks deployed commits
//! against GitHub (status checks, branch history).

mod config;
mod error;
mod metrics;
mod migration;
mod models;
mod routes;
mod schema;
mod scm;
mod services;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::scm::github::GithubClient;
use crate::scm::Verifier;
use crate::services::deployment_tracker::DeploymentTracker;
use crate::services::environment_registry::EnvironmentRegistry;
use crate::services::service_registry::ServiceRegistry;
use crate::services::version_registry::VersionRegistry;
use crate::store::{DeployStore, MemoryStore, PgStore};

#[derive(Parser)]
#[command(name = "deploytrack", about = "Deployment tracking server")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "DEPLOY_PORT", default_value = "8081")]
    port: u16,

    /// PostgreSQL connection URL. Without it, state is kept in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let config = config::DeployConfig::from_env();

    tracing::info!("Starting Deploytrack server...");
    tracing::debug!(?config, "Loaded configuration");

    // Storage
    let store: Arc<dyn DeployStore> = match cli.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url, config.db_max_connections)?;
            {
                let mut conn = pg
                    .pool()
                    .get()
                    .await
                    .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
                tracing::info!("Running deployment tracker migration...");
                migration::run_migration(&mut conn).await?;
                tracing::info!("Deployment tracker migration completed.");
            }
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, deployments are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    // Source control, built once and shared by every service
    let github = GithubClient::new(&config)?;
    let verifier = Verifier::new(Arc::new(github), config.scm_timeout);

    let state = routes::DeployRouterState {
        services: ServiceRegistry::new(store.clone()),
        environments: EnvironmentRegistry::new(store.clone()),
        versions: VersionRegistry::new(store.clone(), verifier.clone()),
        tracker: DeploymentTracker::new(store, verifier),
    };

    let app = routes::deploy_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Initialize metrics
    metrics::init_metrics();

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Deploytrack server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
