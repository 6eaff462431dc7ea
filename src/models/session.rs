use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

use super::parse_uuid;

/// The durable session row, keyed by access token. The authorization core
/// only reads it — to confirm liveness and to seed the identity's employee
/// snapshot; auth handlers own its lifecycle.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbSession> for SessionRecord {
    type Error = AppError;

    fn try_from(db: DbSession) -> Result<Self, Self::Error> {
        let employee_id = db
            .employee_id
            .as_deref()
            .map(|id| parse_uuid(id, "employee"))
            .transpose()?;

        Ok(SessionRecord {
            access_token: db.access_token,
            refresh_token: db.refresh_token,
            user_id: parse_uuid(&db.user_id, "user")?,
            employee_id,
            department: db.department,
            created_at: db.created_at,
        })
    }
}
