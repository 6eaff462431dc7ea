use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;

use super::MergedPermission;

/// The resolved caller for one request: subject ids, role names and the
/// merged permission view. Built fresh by the session resolver, threaded
/// through request extensions, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub department: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<MergedPermission>,
    #[serde(skip_serializing)]
    pub access_token: String,
}

impl Identity {
    pub fn find_permission(&self, name: &str) -> Option<&MergedPermission> {
        self.permissions.iter().find(|row| row.permission == name)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}
