//! Role administration: role lifecycle and per-role permission rows.
//!
//! Migration-seeded records get special treatment: a seed role keeps its
//! name and cannot be deleted, and a seed permission row is never
//! overwritten — updates against it succeed but leave the stored flags
//! untouched.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, AccessRequirement, Capability, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::{record_audit, RequestContext};
use crate::models::rbac::{
    DbPermissionRow, DbRole, PermissionGrant, PermissionRow, Role, RoleCreateRequest,
    RoleUpdateRequest,
};
use crate::registry::{ControllerRegistry, HandlerBindings, HttpMethod};
use crate::utils::utc_now;

pub fn register(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    registry
        .controller(
            "/roles",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanRead]),
        )
        .route(HttpMethod::Get, "/", "roles.list")
        .route(HttpMethod::Post, "/", "roles.create")
        .route(HttpMethod::Put, "/:roleId", "roles.rename")
        .route(HttpMethod::Delete, "/:roleId", "roles.delete")
        .route(HttpMethod::Get, "/:roleId/permissions", "roles.permissions")
        .route(HttpMethod::Put, "/:roleId/permissions", "roles.set_permissions")
        .authorize(
            "roles.create",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanCreate]),
        )
        .authorize(
            "roles.rename",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanUpdate]),
        )
        .authorize(
            "roles.delete",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanDelete]),
        )
        .authorize(
            "roles.set_permissions",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanUpdate]),
        );

    bindings
        .bind("roles.list", list_roles)
        .bind("roles.create", create_role)
        .bind("roles.rename", rename_role)
        .bind("roles.delete", delete_role)
        .bind("roles.permissions", role_permissions)
        .bind("roles.set_permissions", set_role_permissions);
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List of roles", body = [Role]))
)]
pub(crate) async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    let rows = sqlx::query_as::<_, DbRole>(
        "SELECT id, name, created_by, created_at, updated_at FROM roles ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let roles = rows
        .into_iter()
        .map(Role::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    security(("bearerAuth" = [])),
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Role name already in use")
    )
)]
pub(crate) async fn create_role(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE name = ?")
        .bind(&payload.name)
        .fetch_one(&state.pool)
        .await?;
    if in_use > 0 {
        return Err(AppError::bad_request("role name already in use"));
    }

    let now = utc_now();
    let role = Role {
        id: Uuid::new_v4(),
        name: payload.name,
        created_by: identity.user_id.to_string(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query("INSERT INTO roles (id, name, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(role.id.to_string())
        .bind(&role.name)
        .bind(&role.created_by)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&state.pool)
        .await?;

    record_audit(
        &state.event_bus,
        "created",
        Some(identity.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    put,
    path = "/roles/{roleId}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("roleId" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role renamed", body = Role),
        (status = 400, description = "Seed role names are immutable"),
        (status = 404, description = "Role not found")
    )
)]
pub(crate) async fn rename_role(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let before = fetch_role(&state.pool, role_id).await?;
    if before.is_migration_seeded() {
        return Err(AppError::bad_request("seed role names are immutable"));
    }

    let mut role = before.clone();
    role.name = payload.name;
    role.updated_at = utc_now();

    sqlx::query("UPDATE roles SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&role.name)
        .bind(role.updated_at)
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    record_audit(
        &state.event_bus,
        "updated",
        Some(identity.user_id),
        &role,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/roles/{roleId}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("roleId" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted"),
        (status = 400, description = "Seed roles cannot be deleted"),
        (status = 404, description = "Role not found")
    )
)]
pub(crate) async fn delete_role(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let role = fetch_role(&state.pool, role_id).await?;
    if role.is_migration_seeded() {
        return Err(AppError::bad_request("seed roles cannot be deleted"));
    }

    // assignments and permission rows go with the role
    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    record_audit(
        &state.event_bus,
        "deleted",
        Some(identity.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    get,
    path = "/roles/{roleId}/permissions",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("roleId" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "The role's permission rows"),
        (status = 404, description = "Role not found")
    )
)]
pub(crate) async fn role_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Vec<PermissionRow>>> {
    fetch_role(&state.pool, role_id).await?;
    let rows = state.directory.permission_rows_for_role(role_id).await?;
    Ok(Json(rows))
}

/// Replace a role's stance on the submitted permission names.
///
/// Per entry: a migration-seeded row is left untouched but still returned,
/// an existing row has its flags overwritten, and a missing row is created
/// attributed to the acting user. The call succeeds either way.
#[utoipa::path(
    put,
    path = "/roles/{roleId}/permissions",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("roleId" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Resulting permission rows"),
        (status = 404, description = "Role not found")
    )
)]
pub(crate) async fn set_role_permissions(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(grants): Json<Vec<PermissionGrant>>,
) -> AppResult<Json<Vec<PermissionRow>>> {
    fetch_role(&state.pool, role_id).await?;

    let mut result = Vec::with_capacity(grants.len());
    for grant in grants {
        let existing = sqlx::query_as::<_, DbPermissionRow>(
            "SELECT id, role_id, permission, capabilities, created_by, created_at, updated_at \
             FROM permission_rows WHERE role_id = ? AND permission = ?",
        )
        .bind(role_id.to_string())
        .bind(&grant.permission)
        .fetch_optional(&state.pool)
        .await?
        .map(PermissionRow::try_from)
        .transpose()?;

        let row = match existing {
            Some(row) if row.is_migration_seeded() => row,
            Some(before) => {
                let mut row = before.clone();
                row.capabilities = grant.capabilities;
                row.updated_at = utc_now();

                sqlx::query("UPDATE permission_rows SET capabilities = ?, updated_at = ? WHERE id = ?")
                    .bind(serde_json::to_string(&row.capabilities).unwrap_or_default())
                    .bind(row.updated_at)
                    .bind(row.id.to_string())
                    .execute(&state.pool)
                    .await?;

                record_audit(
                    &state.event_bus,
                    "updated",
                    Some(identity.user_id),
                    &row,
                    Some(&before),
                    Some(RequestContext::from_headers(&headers)),
                );
                row
            }
            None => {
                let now = utc_now();
                let row = PermissionRow {
                    id: Uuid::new_v4(),
                    role_id,
                    permission: grant.permission,
                    capabilities: grant.capabilities,
                    created_by: identity.user_id.to_string(),
                    created_at: now,
                    updated_at: now,
                };

                sqlx::query(
                    "INSERT INTO permission_rows (id, role_id, permission, capabilities, created_by, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(row.id.to_string())
                .bind(role_id.to_string())
                .bind(&row.permission)
                .bind(serde_json::to_string(&row.capabilities).unwrap_or_default())
                .bind(&row.created_by)
                .bind(row.created_at)
                .bind(row.updated_at)
                .execute(&state.pool)
                .await?;

                record_audit(
                    &state.event_bus,
                    "created",
                    Some(identity.user_id),
                    &row,
                    None,
                    Some(RequestContext::from_headers(&headers)),
                );
                row
            }
        };

        result.push(row);
    }

    Ok(Json(result))
}

async fn fetch_role(pool: &SqlitePool, role_id: Uuid) -> AppResult<Role> {
    let row = sqlx::query_as::<_, DbRole>(
        "SELECT id, name, created_by, created_at, updated_at FROM roles WHERE id = ?",
    )
    .bind(role_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("role not found"))?;

    row.try_into()
}
