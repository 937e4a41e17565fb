//! Diesel table definitions for the deployment tracker.
//!
//! Tables: service, environment, deployable_version, deployment.
//! `users` is created by the migration but owned by the auth layer.

diesel::table! {
    service (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    environment (id) {
        id -> Int8,
        name -> Varchar,
        geo_region -> Varchar,
        availability -> Varchar,
        cluster_endpoint -> Varchar,
        cluster_credential -> Text,
    }
}

diesel::table! {
    deployable_version (id) {
        id -> Int8,
        service_id -> Int8,
        commit_sha -> Varchar,
        repository_url -> Varchar,
    }
}

diesel::table! {
    deployment (id) {
        id -> Int8,
        environment_id -> Int8,
        service_id -> Int8,
        deployable_version_id -> Int8,
        requested_by -> Varchar,
        status -> Varchar,
        source_version -> Varchar,
        started_at -> Timestamptz,
        last_updated_at -> Timestamptz,
    }
}

diesel::joinable!(deployable_version -> service (service_id));
diesel::joinable!(deployment -> environment (environment_id));
diesel::joinable!(deployment -> deployable_version (deployable_version_id));

diesel::allow_tables_to_appear_in_same_query!(
    service,
    environment,
    deployable_version,
    deployment,
);
