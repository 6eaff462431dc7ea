use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, AccessRequirement, Capability, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::{record_audit, RequestContext};
use crate::models::leave::{
    DbLeaveRequest, LeaveCreateRequest, LeaveDecisionRequest, LeaveRequest, LeaveStatus,
};
use crate::registry::{ControllerRegistry, HandlerBindings, HttpMethod};
use crate::utils::utc_now;

pub fn register(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    registry
        .controller("/leave", AccessRequirement::Authenticated)
        // submitting one's own request only needs authentication
        .route(HttpMethod::Post, "/", "leave.submit")
        .route(HttpMethod::Get, "/", "leave.list")
        .route(HttpMethod::Put, "/:id/approval", "leave.decide")
        .route(HttpMethod::Get, "/employees/:employeeId", "leave.for_employee")
        .authorize(
            "leave.list",
            AccessRequirement::permission(permissions::LEAVE_MANAGEMENT, &[Capability::CanRead]),
        )
        .authorize(
            "leave.decide",
            AccessRequirement::permission(permissions::LEAVE_MANAGEMENT, &[Capability::CanApprove]),
        )
        .authorize(
            "leave.for_employee",
            AccessRequirement::permission(permissions::LEAVE_MANAGEMENT, &[Capability::CanRead]),
        );

    bindings
        .bind("leave.submit", submit_leave)
        .bind("leave.list", list_leave)
        .bind("leave.decide", decide_leave)
        .bind("leave.for_employee", leave_for_employee);
}

const SELECT_LEAVE: &str = "SELECT id, employee_id, starts_on, ends_on, kind, status, reason, \
     decided_by, created_at, updated_at FROM leave_requests";

/// Submit a leave request for the caller's own employee record.
#[utoipa::path(
    post,
    path = "/leave",
    tag = "Leave",
    security(("bearerAuth" = [])),
    request_body = LeaveCreateRequest,
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Invalid date range"),
        (status = 403, description = "No employee record linked to this account")
    )
)]
pub(crate) async fn submit_leave(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Json(payload): Json<LeaveCreateRequest>,
) -> AppResult<(StatusCode, Json<LeaveRequest>)> {
    let employee_id = identity
        .employee_id
        .ok_or_else(|| AppError::forbidden("no employee record linked to this account"))?;

    if payload.ends_on < payload.starts_on {
        return Err(AppError::bad_request("leave cannot end before it starts"));
    }

    let now = utc_now();
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO leave_requests (id, employee_id, starts_on, ends_on, kind, status, reason, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(employee_id.to_string())
    .bind(payload.starts_on)
    .bind(payload.ends_on)
    .bind(payload.kind.as_str())
    .bind(&payload.reason)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let request = fetch_leave(&state.pool, id).await?;

    record_audit(
        &state.event_bus,
        "created",
        Some(identity.user_id),
        &request,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/leave",
    tag = "Leave",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "All leave requests", body = [LeaveRequest]))
)]
pub(crate) async fn list_leave(State(state): State<AppState>) -> AppResult<Json<Vec<LeaveRequest>>> {
    let rows = sqlx::query_as::<_, DbLeaveRequest>(&format!(
        "{SELECT_LEAVE} ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    let requests = rows
        .into_iter()
        .map(LeaveRequest::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(requests))
}

/// Approve or reject a pending request.
#[utoipa::path(
    put,
    path = "/leave/{id}/approval",
    tag = "Leave",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Leave request id")),
    request_body = LeaveDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = LeaveRequest),
        (status = 400, description = "Request already decided"),
        (status = 404, description = "Leave request not found")
    )
)]
pub(crate) async fn decide_leave(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<LeaveDecisionRequest>,
) -> AppResult<Json<LeaveRequest>> {
    let before = fetch_leave(&state.pool, id).await?;
    if before.status != LeaveStatus::Pending {
        return Err(AppError::bad_request("leave request already decided"));
    }

    let status = if payload.approve {
        LeaveStatus::Approved
    } else {
        LeaveStatus::Rejected
    };
    let now = utc_now();

    sqlx::query("UPDATE leave_requests SET status = ?, decided_by = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(identity.user_id.to_string())
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let request = fetch_leave(&state.pool, id).await?;

    record_audit(
        &state.event_bus,
        "decided",
        Some(identity.user_id),
        &request,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(request))
}

/// One employee's leave history. Self-service capable: employees can read
/// their own history without LEAVE_MANAGEMENT rights.
#[utoipa::path(
    get,
    path = "/leave/employees/{employeeId}",
    tag = "Leave",
    security(("bearerAuth" = [])),
    params(("employeeId" = Uuid, Path, description = "Employee id")),
    responses((status = 200, description = "Employee leave history", body = [LeaveRequest]))
)]
pub(crate) async fn leave_for_employee(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<Vec<LeaveRequest>>> {
    let rows = sqlx::query_as::<_, DbLeaveRequest>(&format!(
        "{SELECT_LEAVE} WHERE employee_id = ? ORDER BY created_at DESC"
    ))
    .bind(employee_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let requests = rows
        .into_iter()
        .map(LeaveRequest::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(requests))
}

async fn fetch_leave(pool: &SqlitePool, id: Uuid) -> AppResult<LeaveRequest> {
    let row = sqlx::query_as::<_, DbLeaveRequest>(&format!("{SELECT_LEAVE} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("leave request not found"))?;

    row.try_into()
}
