use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::rbac::{DbPermissionRow, DbRole, PermissionRow, Role};
use crate::models::session::{DbSession, SessionRecord};

use super::{DirectoryStore, SessionStore};

#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqlStore {
    async fn find_by_access_token(&self, access_token: &str) -> AppResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, DbSession>(
            "SELECT access_token, refresh_token, user_id, employee_id, department, created_at \
             FROM sessions WHERE access_token = ?",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }
}

#[async_trait]
impl DirectoryStore for SqlStore {
    async fn roles_for_user(&self, user_id: Uuid) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, DbRole>(
            "SELECT r.id, r.name, r.created_by, r.created_at, r.updated_at \
             FROM roles r \
             INNER JOIN role_assignments ra ON r.id = ra.role_id \
             WHERE ra.user_id = ? \
             ORDER BY ra.created_at, r.name",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Role::try_from).collect()
    }

    async fn permission_rows_for_role(&self, role_id: Uuid) -> AppResult<Vec<PermissionRow>> {
        let rows = sqlx::query_as::<_, DbPermissionRow>(
            "SELECT id, role_id, permission, capabilities, created_by, created_at, updated_at \
             FROM permission_rows WHERE role_id = ? \
             ORDER BY created_at, permission",
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PermissionRow::try_from).collect()
    }
}
