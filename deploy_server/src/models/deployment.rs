//! deployment: One version of one service placed into one environment.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::schema::deployment;

/// Lifecycle status of a deployment.
///
/// `Pending -> InProgress -> {Done, Failed, Canceled}`. A pending deployment
/// may also fail or be canceled before it starts. Terminal states accept no
/// further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Canceled,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Done,
        Self::Failed,
        Self::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Whether `next` is a legal forward move from `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::InProgress | Self::Failed | Self::Canceled),
            Self::InProgress => next.is_terminal(),
            Self::Done | Self::Failed | Self::Canceled => false,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DeployError::Validation(format!("unknown deployment status: {s}")))
    }
}

/// Current wall-clock time at the second precision the store keeps.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub id: i64,
    pub environment_id: i64,
    pub service_id: i64,
    pub deployable_version_id: i64,
    pub requested_by: String,
    pub status: DeploymentStatus,
    pub source_version: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Fields fixed at creation. Status and timestamps are set by the tracker.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub environment_id: i64,
    pub service_id: i64,
    pub deployable_version_id: i64,
    pub requested_by: String,
    pub status: DeploymentStatus,
    pub source_version: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = deployment)]
pub struct DeploymentRow {
    pub id: i64,
    pub environment_id: i64,
    pub service_id: i64,
    pub deployable_version_id: i64,
    pub requested_by: String,
    pub status: String,
    pub source_version: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = DeployError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            DeployError::storage(format!(
                "deployment {} has unrecognised status {:?}",
                row.id, row.status
            ))
        })?;
        Ok(Self {
            id: row.id,
            environment_id: row.environment_id,
            service_id: row.service_id,
            deployable_version_id: row.deployable_version_id,
            requested_by: row.requested_by,
            status,
            source_version: row.source_version,
            started_at: row.started_at,
            last_updated_at: row.last_updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = deployment)]
pub struct NewDeploymentRow<'a> {
    pub environment_id: i64,
    pub service_id: i64,
    pub deployable_version_id: i64,
    pub requested_by: &'a str,
    pub status: &'static str,
    pub source_version: &'a str,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl<'a> From<&'a NewDeployment> for NewDeploymentRow<'a> {
    fn from(new: &'a NewDeployment) -> Self {
        Self {
            environment_id: new.environment_id,
            service_id: new.service_id,
            deployable_version_id: new.deployable_version_id,
            requested_by: &new.requested_by,
            status: new.status.as_str(),
            source_version: &new.source_version,
            started_at: new.started_at,
            last_updated_at: new.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_nothing() {
        for from in DeploymentStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in DeploymentStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn forward_moves_only() {
        use DeploymentStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Done));
        assert!(!Pending.can_transition_to(Pending));

        assert!(InProgress.can_transition_to(Done));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Canceled));
        assert!(!InProgress.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Pending));
    }

    #[test]
    fn status_parses_its_own_rendering() {
        for status in DeploymentStatus::ALL {
            assert_eq!(status.as_str().parse::<DeploymentStatus>().unwrap(), status);
        }
        assert_eq!(
            "in_progress".parse::<DeploymentStatus>().unwrap(),
            DeploymentStatus::InProgress
        );
        assert!("RUNNING".parse::<DeploymentStatus>().is_err());
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn row_with_unknown_status_is_a_storage_error() {
        let now = timestamp_now();
        let row = DeploymentRow {
            id: 4,
            environment_id: 1,
            service_id: 1,
            deployable_version_id: 1,
            requested_by: "ops@acme.com".into(),
            status: "RUNNING".into(),
            source_version: String::new(),
            started_at: now,
            last_updated_at: now,
        };
        let err = Deployment::try_from(row).unwrap_err();
        assert!(matches!(err, DeployError::Storage(_)));
    }

    #[test]
    fn insert_row_starts_both_timestamps_together() {
        let started_at = timestamp_now();
        let new = NewDeployment {
            environment_id: 1,
            service_id: 2,
            deployable_version_id: 3,
            requested_by: "ops@acme.com".into(),
            status: DeploymentStatus::Pending,
            source_version: "v1.2.0".into(),
            started_at,
        };
        let row = NewDeploymentRow::from(&new);
        assert_eq!(row.status, "PENDING");
        assert_eq!(row.started_at, row.last_updated_at);
        assert_eq!(started_at.timestamp_subsec_nanos(), 0);
    }
}
