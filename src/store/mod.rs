use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::rbac::{PermissionRow, Role};
use crate::models::session::SessionRecord;

mod sql;
pub use sql::SqlStore;

/// Read side of the durable session store. The authorization core only
/// confirms liveness and reads the cached employee snapshot; writes stay
/// with the auth handlers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_by_access_token(&self, access_token: &str) -> AppResult<Option<SessionRecord>>;
}

/// Role and permission lookups backing identity resolution.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// A subject's roles in assignment order. The order must be stable
    /// within a single resolution; merge results depend on it.
    async fn roles_for_user(&self, user_id: Uuid) -> AppResult<Vec<Role>>;

    /// A role's permission rows, one per permission name.
    async fn permission_rows_for_role(&self, role_id: Uuid) -> AppResult<Vec<PermissionRow>>;
}
