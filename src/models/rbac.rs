use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{CapabilitySet, MergedPermission};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

use super::parse_uuid;

/// Actor recorded on seed records created by migrations. Such roles keep
/// their name and cannot be deleted; such permission rows are never
/// overwritten by update calls.
pub const MIGRATION_ACTOR: &str = "migration";

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_migration_seeded(&self) -> bool {
        self.created_by == MIGRATION_ACTOR
    }
}

impl Loggable for Role {
    fn entity_type() -> &'static str {
        "role"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: parse_uuid(&db.id, "role")?,
            name: db.name,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "PAYROLL_CLERK")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: String,
}

// =============================================================================
// PERMISSION ROW
// =============================================================================

/// One role's stance on one permission name; the unit merged across roles.
/// Exactly one row may exist per (role, permission).
#[derive(Debug, Clone, Serialize)]
pub struct PermissionRow {
    pub id: Uuid,
    pub role_id: Uuid,
    pub permission: String,
    #[serde(flatten)]
    pub capabilities: CapabilitySet,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionRow {
    pub fn is_migration_seeded(&self) -> bool {
        self.created_by == MIGRATION_ACTOR
    }
}

impl Loggable for PermissionRow {
    fn entity_type() -> &'static str {
        "permission_row"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermissionRow {
    pub id: String,
    pub role_id: String,
    pub permission: String,
    pub capabilities: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPermissionRow> for PermissionRow {
    type Error = AppError;

    fn try_from(db: DbPermissionRow) -> Result<Self, Self::Error> {
        let capabilities: CapabilitySet = serde_json::from_str(&db.capabilities)
            .map_err(|err| AppError::internal(format!("invalid capability flags in store: {err}")))?;

        Ok(PermissionRow {
            id: parse_uuid(&db.id, "permission row")?,
            role_id: parse_uuid(&db.role_id, "role")?,
            permission: db.permission,
            capabilities,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// Wire shape of one entry in a permission-set update: the permission name
/// plus its capability flags flattened alongside it.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    #[serde(flatten)]
    pub capabilities: CapabilitySet,
}

// =============================================================================
// ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for RoleAssignment {
    fn entity_type() -> &'static str {
        "role_assignment"
    }
    fn subject_id(&self) -> Uuid {
        self.user_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

// =============================================================================
// EFFECTIVE PERMISSIONS (computed)
// =============================================================================

#[derive(Debug, Serialize)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<MergedPermission>,
}
