//! environment: A deployment target. Carries a sensitive cluster credential.

use std::fmt;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::environment;

const REDACTED: &str = "<redacted>";

/// A registered deployment target.
///
/// `cluster_credential` is never serialized and is redacted from `Debug`
/// output, so an environment can be logged or returned over HTTP as-is.
#[derive(Clone, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = environment)]
pub struct Environment {
    pub id: i64,
    pub name: String,
    pub geo_region: String,
    pub availability: String,
    pub cluster_endpoint: String,
    #[serde(skip_serializing)]
    pub cluster_credential: String,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("geo_region", &self.geo_region)
            .field("availability", &self.availability)
            .field("cluster_endpoint", &self.cluster_endpoint)
            .field("cluster_credential", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Insertable, Deserialize)]
#[diesel(table_name = environment)]
pub struct NewEnvironment {
    pub name: String,
    pub geo_region: String,
    pub availability: String,
    pub cluster_endpoint: String,
    pub cluster_credential: String,
}

impl fmt::Debug for NewEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewEnvironment")
            .field("name", &self.name)
            .field("geo_region", &self.geo_region)
            .field("availability", &self.availability)
            .field("cluster_endpoint", &self.cluster_endpoint)
            .field("cluster_credential", &REDACTED)
            .finish()
    }
}
