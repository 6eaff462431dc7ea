use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{aggregate_for_user, permissions, AccessRequirement, Capability, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::{record_audit, RequestContext};
use crate::models::rbac::{AssignRoleRequest, EffectivePermissions, Role, RoleAssignment};
use crate::registry::{ControllerRegistry, HandlerBindings, HttpMethod};
use crate::utils::utc_now;

pub fn register(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    registry
        .controller(
            "/users",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanRead]),
        )
        .route(HttpMethod::Get, "/:userId/roles", "users.roles")
        .route(HttpMethod::Post, "/:userId/roles", "users.assign_role")
        .route(HttpMethod::Delete, "/:userId/roles/:roleId", "users.revoke_role")
        .route(HttpMethod::Get, "/:userId/permissions", "users.effective_permissions")
        .authorize(
            "users.assign_role",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanUpdate]),
        )
        .authorize(
            "users.revoke_role",
            AccessRequirement::permission(permissions::ROLE_MANAGEMENT, &[Capability::CanUpdate]),
        );

    bindings
        .bind("users.roles", user_roles)
        .bind("users.assign_role", assign_role)
        .bind("users.revoke_role", revoke_role)
        .bind("users.effective_permissions", effective_permissions);
}

#[utoipa::path(
    get,
    path = "/users/{userId}/roles",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("userId" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Roles assigned to the user", body = [Role]))
)]
pub(crate) async fn user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Role>>> {
    let roles = state.directory.roles_for_user(user_id).await?;
    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/users/{userId}/roles",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("userId" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned", body = RoleAssignment),
        (status = 404, description = "User or role not found")
    )
)]
pub(crate) async fn assign_role(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleAssignment>)> {
    ensure_user_exists(&state, user_id).await?;
    ensure_role_exists(&state, payload.role_id).await?;

    let assignment = RoleAssignment {
        user_id,
        role_id: payload.role_id,
        created_at: utc_now(),
    };

    sqlx::query("INSERT OR IGNORE INTO role_assignments (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id.to_string())
        .bind(payload.role_id.to_string())
        .bind(assignment.created_at)
        .execute(&state.pool)
        .await?;

    record_audit(
        &state.event_bus,
        "assigned",
        Some(identity.user_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(assignment)))
}

#[utoipa::path(
    delete,
    path = "/users/{userId}/roles/{roleId}",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(
        ("userId" = Uuid, Path, description = "User id"),
        ("roleId" = Uuid, Path, description = "Role id")
    ),
    responses((status = 200, description = "Role revoked", body = RoleAssignment))
)]
pub(crate) async fn revoke_role(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RoleAssignment>> {
    sqlx::query("DELETE FROM role_assignments WHERE user_id = ? AND role_id = ?")
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    let assignment = RoleAssignment {
        user_id,
        role_id,
        created_at: utc_now(),
    };

    record_audit(
        &state.event_bus,
        "revoked",
        Some(identity.user_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(assignment))
}

/// The aggregation engine's view of one user: role names plus the merged
/// per-permission capability set.
#[utoipa::path(
    get,
    path = "/users/{userId}/permissions",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("userId" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Consolidated permission view"))
)]
pub(crate) async fn effective_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissions>> {
    let aggregated = aggregate_for_user(state.directory.as_ref(), user_id).await?;
    Ok(Json(EffectivePermissions {
        user_id,
        roles: aggregated.roles,
        permissions: aggregated.permissions,
    }))
}

async fn ensure_user_exists(state: &AppState, user_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if count == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}

async fn ensure_role_exists(state: &AppState, role_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if count == 0 {
        return Err(AppError::not_found("role not found"));
    }
    Ok(())
}
