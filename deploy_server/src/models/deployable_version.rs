//! deployable_version: An immutable (service, commit) pairing.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::deployable_version;
use crate::scm;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = deployable_version)]
pub struct DeployableVersion {
    pub id: i64,
    pub service_id: i64,
    pub commit_sha: String,
    pub repository_url: String,
}

impl DeployableVersion {
    /// `owner/repo` form of the repository URL, as the source-control API expects it.
    pub fn repo_identifier(&self) -> String {
        scm::repo_name_from_url(&self.repository_url)
    }
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = deployable_version)]
pub struct NewDeployableVersion {
    pub service_id: i64,
    pub commit_sha: String,
    pub repository_url: String,
}
