use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::Loggable;

use super::parse_uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LeaveKind {
    Annual,
    Sick,
    Unpaid,
}

impl LeaveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaveKind::Annual => "annual",
            LeaveKind::Sick => "sick",
            LeaveKind::Unpaid => "unpaid",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "annual" => Ok(LeaveKind::Annual),
            "sick" => Ok(LeaveKind::Sick),
            "unpaid" => Ok(LeaveKind::Unpaid),
            other => Err(AppError::internal(format!("unknown leave kind in store: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "rejected" => Ok(LeaveStatus::Rejected),
            other => Err(AppError::internal(format!("unknown leave status in store: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub kind: LeaveKind,
    pub status: LeaveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for LeaveRequest {
    fn entity_type() -> &'static str {
        "leave_request"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLeaveRequest {
    pub id: String,
    pub employee_id: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub kind: String,
    pub status: String,
    pub reason: Option<String>,
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbLeaveRequest> for LeaveRequest {
    type Error = AppError;

    fn try_from(db: DbLeaveRequest) -> Result<Self, Self::Error> {
        let decided_by = db
            .decided_by
            .as_deref()
            .map(|id| parse_uuid(id, "user"))
            .transpose()?;

        Ok(LeaveRequest {
            id: parse_uuid(&db.id, "leave request")?,
            employee_id: parse_uuid(&db.employee_id, "employee")?,
            starts_on: db.starts_on,
            ends_on: db.ends_on,
            kind: LeaveKind::parse(&db.kind)?,
            status: LeaveStatus::parse(&db.status)?,
            reason: db.reason,
            decided_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveCreateRequest {
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub kind: LeaveKind,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveDecisionRequest {
    pub approve: bool,
}
