//! Embedded schema migration for the deployment tracker tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for deployment tracking.
///
/// Idempotent: safe to run on every start-up. Timestamps are stored with
/// second precision. The deployment's version reference targets
/// `deployable_version`, and the composite key ties the deployment's
/// `service_id` to the version's own service.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Deployment tracking tables
-- ================================================================

CREATE TABLE IF NOT EXISTS users (
    id              BIGSERIAL PRIMARY KEY,
    email           VARCHAR(1000) NOT NULL UNIQUE,
    first_name      VARCHAR(1000) NOT NULL,
    last_name       VARCHAR(1000) NOT NULL,
    hashed_password VARCHAR(1000) NOT NULL,
    admin           BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS service (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(1000) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS environment (
    id                  BIGSERIAL PRIMARY KEY,
    name                VARCHAR(1000) NOT NULL UNIQUE,
    geo_region          VARCHAR(1000) NOT NULL,
    availability        VARCHAR(1000) NOT NULL,
    cluster_endpoint    VARCHAR(1000) NOT NULL,
    cluster_credential  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deployable_version (
    id              BIGSERIAL PRIMARY KEY,
    service_id      BIGINT NOT NULL REFERENCES service(id),
    commit_sha      VARCHAR(1000) NOT NULL,
    repository_url  VARCHAR(1000) NOT NULL,
    CONSTRAINT uq_deployable_version_service_sha UNIQUE (service_id, commit_sha),
    CONSTRAINT uq_deployable_version_id_service UNIQUE (id, service_id)
);

CREATE INDEX IF NOT EXISTS idx_deployable_version_service ON deployable_version (service_id);

CREATE TABLE IF NOT EXISTS deployment (
    id                      BIGSERIAL PRIMARY KEY,
    environment_id          BIGINT NOT NULL REFERENCES environment(id),
    service_id              BIGINT NOT NULL REFERENCES service(id),
    deployable_version_id   BIGINT NOT NULL REFERENCES deployable_version(id),
    requested_by            VARCHAR(1000) NOT NULL,
    status                  VARCHAR(32) NOT NULL DEFAULT 'PENDING'
        CHECK (status IN ('PENDING', 'IN_PROGRESS', 'DONE', 'FAILED', 'CANCELED')),
    source_version          VARCHAR(1000) NOT NULL DEFAULT '',
    started_at              TIMESTAMPTZ(0) NOT NULL,
    last_updated_at         TIMESTAMPTZ(0) NOT NULL,
    CONSTRAINT fk_deployment_version_service
        FOREIGN KEY (deployable_version_id, service_id)
        REFERENCES deployable_version (id, service_id),
    CONSTRAINT ck_deployment_timestamps CHECK (last_updated_at >= started_at)
);

CREATE INDEX IF NOT EXISTS idx_deployment_environment ON deployment (environment_id);
CREATE INDEX IF NOT EXISTS idx_deployment_service ON deployment (service_id);
CREATE INDEX IF NOT EXISTS idx_deployment_status ON deployment (status);
"#;

/// Run the deployment tracker migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("deployment migration failed: {e}"))?;
    Ok(())
}
