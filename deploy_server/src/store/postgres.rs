//! PostgreSQL store on diesel-async with a deadpool connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::{DeployError, DeployResult};
use crate::models::deployable_version::{DeployableVersion, NewDeployableVersion};
use crate::models::deployment::{
    Deployment, DeploymentRow, DeploymentStatus, NewDeployment, NewDeploymentRow,
};
use crate::models::environment::{Environment, NewEnvironment};
use crate::models::service::{NewService, Service};
use crate::schema::{deployable_version, deployment, environment, service};

use super::{DeployStore, DeploymentFilter};

pub type PgPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Build a pool for `database_url` with at most `max_size` connections.
    pub fn connect(database_url: &str, max_size: usize) -> anyhow::Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> DeployResult<Object<AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| DeployError::storage(format!("connection checkout failed: {e}")))
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_size", &self.pool.status().size)
            .finish()
    }
}

/// Map a diesel error, routing unique and foreign-key violations to the
/// caller's domain errors.
fn map_db_error(
    error: DieselError,
    on_unique: impl FnOnce() -> DeployError,
    on_foreign_key: impl FnOnce(Option<&str>) -> DeployError,
) -> DeployError {
    match &error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => on_unique(),
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            on_foreign_key(info.constraint_name())
        }
        DieselError::DatabaseError(kind, info) => {
            tracing::debug!(?kind, message = info.message(), "diesel operation failed");
            DeployError::storage(info.message())
        }
        _ => DeployError::storage(error.to_string()),
    }
}

fn query_error(error: DieselError) -> DeployError {
    map_db_error(
        error,
        || DeployError::storage("unexpected unique violation"),
        |_| DeployError::storage("unexpected foreign key violation"),
    )
}

#[async_trait]
impl DeployStore for PgStore {
    async fn insert_service(&self, new: NewService) -> DeployResult<Service> {
        let mut conn = self.conn().await?;
        diesel::insert_into(service::table)
            .values(&new)
            .returning(Service::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| {
                map_db_error(
                    e,
                    || DeployError::DuplicateService(new.name.clone()),
                    |_| DeployError::storage("unexpected foreign key violation"),
                )
            })
    }

    async fn get_service(&self, id: i64) -> DeployResult<Option<Service>> {
        let mut conn = self.conn().await?;
        service::table
            .find(id)
            .select(Service::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)
    }

    async fn find_service_by_name(&self, name: &str) -> DeployResult<Option<Service>> {
        let mut conn = self.conn().await?;
        service::table
            .filter(service::name.eq(name))
            .select(Service::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)
    }

    async fn list_services(&self) -> DeployResult<Vec<Service>> {
        let mut conn = self.conn().await?;
        service::table
            .order(service::id.asc())
            .select(Service::as_select())
            .load(&mut conn)
            .await
            .map_err(query_error)
    }

    async fn insert_version(&self, new: NewDeployableVersion) -> DeployResult<DeployableVersion> {
        let mut conn = self.conn().await?;
        diesel::insert_into(deployable_version::table)
            .values(&new)
            .returning(DeployableVersion::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| {
                map_db_error(
                    e,
                    || DeployError::DuplicateVersion {
                        service_id: new.service_id,
                        commit_sha: new.commit_sha.clone(),
                    },
                    |_| DeployError::UnknownService(new.service_id),
                )
            })
    }

    async fn get_version(&self, id: i64) -> DeployResult<Option<DeployableVersion>> {
        let mut conn = self.conn().await?;
        deployable_version::table
            .find(id)
            .select(DeployableVersion::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)
    }

    async fn find_version(
        &self,
        service_id: i64,
        commit_sha: &str,
    ) -> DeployResult<Option<DeployableVersion>> {
        let mut conn = self.conn().await?;
        deployable_version::table
            .filter(deployable_version::service_id.eq(service_id))
            .filter(deployable_version::commit_sha.eq(commit_sha))
            .select(DeployableVersion::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)
    }

    async fn list_versions(&self, service_id: i64) -> DeployResult<Vec<DeployableVersion>> {
        let mut conn = self.conn().await?;
        deployable_version::table
            .filter(deployable_version::service_id.eq(service_id))
            .order(deployable_version::id.desc())
            .select(DeployableVersion::as_select())
            .load(&mut conn)
            .await
            .map_err(query_error)
    }

    async fn insert_environment(&self, new: NewEnvironment) -> DeployResult<Environment> {
        let mut conn = self.conn().await?;
        diesel::insert_into(environment::table)
            .values(&new)
            .returning(Environment::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| {
                map_db_error(
                    e,
                    || DeployError::DuplicateEnvironment(new.name.clone()),
                    |_| DeployError::storage("unexpected foreign key violation"),
                )
            })
    }

    async fn get_environment(&self, id: i64) -> DeployResult<Option<Environment>> {
        let mut conn = self.conn().await?;
        environment::table
            .find(id)
            .select(Environment::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)
    }

    async fn find_environment_by_name(&self, name: &str) -> DeployResult<Option<Environment>> {
        let mut conn = self.conn().await?;
        environment::table
            .filter(environment::name.eq(name))
            .select(Environment::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)
    }

    async fn list_environments(&self) -> DeployResult<Vec<Environment>> {
        let mut conn = self.conn().await?;
        environment::table
            .order(environment::id.asc())
            .select(Environment::as_select())
            .load(&mut conn)
            .await
            .map_err(query_error)
    }

    async fn insert_deployment(&self, new: &NewDeployment) -> DeployResult<Deployment> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(deployment::table)
            .values(NewDeploymentRow::from(new))
            .returning(DeploymentRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| {
                map_db_error(
                    e,
                    || DeployError::storage("unexpected unique violation"),
                    |constraint| match constraint {
                        Some("deployment_environment_id_fkey") => {
                            DeployError::not_found("environment", new.environment_id)
                        }
                        Some("deployment_service_id_fkey") => {
                            DeployError::UnknownService(new.service_id)
                        }
                        Some("fk_deployment_version_service") => DeployError::Validation(format!(
                            "version {} does not belong to service {}",
                            new.deployable_version_id, new.service_id
                        )),
                        _ => DeployError::not_found("deployable version", new.deployable_version_id),
                    },
                )
            })?;
        Deployment::try_from(row)
    }

    async fn get_deployment(&self, id: i64) -> DeployResult<Option<Deployment>> {
        let mut conn = self.conn().await?;
        deployment::table
            .find(id)
            .select(DeploymentRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(query_error)?
            .map(Deployment::try_from)
            .transpose()
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> DeployResult<Vec<Deployment>> {
        let mut conn = self.conn().await?;
        let mut query = deployment::table
            .select(DeploymentRow::as_select())
            .into_boxed();
        if let Some(environment_id) = filter.environment_id {
            query = query.filter(deployment::environment_id.eq(environment_id));
        }
        if let Some(service_id) = filter.service_id {
            query = query.filter(deployment::service_id.eq(service_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(deployment::status.eq(status.as_str()));
        }
        let rows = query
            .order(deployment::id.desc())
            .limit(i64::from(filter.effective_limit()))
            .load::<DeploymentRow>(&mut conn)
            .await
            .map_err(query_error)?;
        rows.into_iter().map(Deployment::try_from).collect()
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: DeploymentStatus,
        next: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> DeployResult<Option<Deployment>> {
        let mut conn = self.conn().await?;
        diesel::update(
            deployment::table
                .filter(deployment::id.eq(id))
                .filter(deployment::status.eq(expected.as_str())),
        )
        .set((
            deployment::status.eq(next.as_str()),
            deployment::last_updated_at.eq(at),
        ))
        .returning(DeploymentRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(query_error)?
        .map(Deployment::try_from)
        .transpose()
    }
}
