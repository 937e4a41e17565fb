//! service: A deployable unit, identified by a unique name.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::service;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = service)]
pub struct Service {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = service)]
pub struct NewService {
    pub name: String,
}
