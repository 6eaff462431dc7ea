use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, AccessRequirement, Capability, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::{record_audit, RequestContext};
use crate::models::employee::{
    DbEmployee, Employee, EmployeeCreateRequest, EmployeeSummary, EmployeeUpdateRequest,
};
use crate::registry::{ControllerRegistry, HandlerBindings, HttpMethod};
use crate::utils::{hash_password, utc_now};

pub fn register(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    registry
        .controller("/employees", AccessRequirement::Authenticated)
        // class-level requirement applies: any authenticated caller
        .route(HttpMethod::Get, "/directory", "employees.directory")
        .route(HttpMethod::Get, "/", "employees.list")
        .route(HttpMethod::Post, "/", "employees.create")
        .route(HttpMethod::Get, "/:employeeId", "employees.get")
        .route(HttpMethod::Put, "/:employeeId", "employees.update")
        .route(HttpMethod::Delete, "/:employeeId", "employees.deactivate")
        .authorize(
            "employees.list",
            AccessRequirement::permission(permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanRead]),
        )
        // combined create/update declarations: rights to either suffice
        .authorize(
            "employees.create",
            AccessRequirement::permission(permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanCreate]),
        )
        .authorize(
            "employees.create",
            AccessRequirement::permission(permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanUpdate]),
        )
        .authorize(
            "employees.get",
            AccessRequirement::permission(permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanRead]),
        )
        .authorize(
            "employees.update",
            AccessRequirement::permission(permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanUpdate]),
        )
        .authorize(
            "employees.deactivate",
            AccessRequirement::permission(permissions::EMPLOYEE_MANAGEMENT, &[Capability::CanDelete]),
        );

    bindings
        .bind("employees.directory", directory)
        .bind("employees.list", list_employees)
        .bind("employees.create", create_employee)
        .bind("employees.get", get_employee)
        .bind("employees.update", update_employee)
        .bind("employees.deactivate", deactivate_employee);
}

const SELECT_EMPLOYEE: &str = "SELECT id, user_id, first_name, last_name, email, department, \
     position, hired_on, created_at, updated_at, deleted_at FROM employees";

/// Company directory: names and departments only, visible to any
/// authenticated caller.
#[utoipa::path(
    get,
    path = "/employees/directory",
    tag = "Employees",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Directory listing", body = [EmployeeSummary]))
)]
pub(crate) async fn directory(State(state): State<AppState>) -> AppResult<Json<Vec<EmployeeSummary>>> {
    let rows = sqlx::query_as::<_, DbEmployee>(&format!(
        "{SELECT_EMPLOYEE} WHERE deleted_at IS NULL ORDER BY last_name, first_name"
    ))
    .fetch_all(&state.pool)
    .await?;

    let entries = rows
        .into_iter()
        .map(|row| {
            let employee: Employee = row.try_into()?;
            Ok(EmployeeSummary {
                id: employee.id,
                first_name: employee.first_name,
                last_name: employee.last_name,
                department: employee.department,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/employees",
    tag = "Employees",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List employees", body = [Employee]))
)]
pub(crate) async fn list_employees(State(state): State<AppState>) -> AppResult<Json<Vec<Employee>>> {
    let rows = sqlx::query_as::<_, DbEmployee>(&format!(
        "{SELECT_EMPLOYEE} WHERE deleted_at IS NULL ORDER BY last_name, first_name"
    ))
    .fetch_all(&state.pool)
    .await?;

    let employees = rows
        .into_iter()
        .map(Employee::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(employees))
}

/// Create an employee record; when `initial_password` is present a login
/// account is provisioned and linked in the same transaction.
#[utoipa::path(
    post,
    path = "/employees",
    tag = "Employees",
    security(("bearerAuth" = [])),
    request_body = EmployeeCreateRequest,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Email already in use")
    )
)]
pub(crate) async fn create_employee(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Json(payload): Json<EmployeeCreateRequest>,
) -> AppResult<(StatusCode, Json<Employee>)> {
    let in_use: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM employees WHERE email = ? AND deleted_at IS NULL")
            .bind(&payload.email)
            .fetch_one(&state.pool)
            .await?;
    if in_use > 0 {
        return Err(AppError::bad_request("email already in use"));
    }

    let now = utc_now();
    let employee_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let user_id = match payload.initial_password.as_deref() {
        Some(password) => {
            let password_hash = hash_password(password)?;
            let user_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO users (id, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user_id.to_string())
            .bind(&payload.email)
            .bind(&password_hash)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            Some(user_id.to_string())
        }
        None => None,
    };

    sqlx::query(
        "INSERT INTO employees (id, user_id, first_name, last_name, email, department, position, hired_on, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(employee_id.to_string())
    .bind(&user_id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.email)
    .bind(&payload.department)
    .bind(&payload.position)
    .bind(payload.hired_on)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let employee = fetch_employee(&state.pool, employee_id).await?;

    record_audit(
        &state.event_bus,
        "created",
        Some(identity.user_id),
        &employee,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(employee)))
}

#[utoipa::path(
    get,
    path = "/employees/{employeeId}",
    tag = "Employees",
    security(("bearerAuth" = [])),
    params(("employeeId" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Employee detail", body = Employee),
        (status = 404, description = "Employee not found")
    )
)]
pub(crate) async fn get_employee(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<Employee>> {
    let employee = fetch_employee(&state.pool, employee_id).await?;
    Ok(Json(employee))
}

#[utoipa::path(
    put,
    path = "/employees/{employeeId}",
    tag = "Employees",
    security(("bearerAuth" = [])),
    params(("employeeId" = Uuid, Path, description = "Employee id")),
    request_body = EmployeeUpdateRequest,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 404, description = "Employee not found")
    )
)]
pub(crate) async fn update_employee(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(employee_id): Path<Uuid>,
    Json(payload): Json<EmployeeUpdateRequest>,
) -> AppResult<Json<Employee>> {
    let before = fetch_employee(&state.pool, employee_id).await?;
    let mut employee = before.clone();

    if let Some(first_name) = payload.first_name {
        employee.first_name = first_name;
    }
    if let Some(last_name) = payload.last_name {
        employee.last_name = last_name;
    }
    if payload.department.is_some() {
        employee.department = payload.department;
    }
    if payload.position.is_some() {
        employee.position = payload.position;
    }
    if payload.hired_on.is_some() {
        employee.hired_on = payload.hired_on;
    }
    employee.updated_at = utc_now();

    sqlx::query(
        "UPDATE employees SET first_name = ?, last_name = ?, department = ?, position = ?, hired_on = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&employee.first_name)
    .bind(&employee.last_name)
    .bind(&employee.department)
    .bind(&employee.position)
    .bind(employee.hired_on)
    .bind(employee.updated_at)
    .bind(employee_id.to_string())
    .execute(&state.pool)
    .await?;

    record_audit(
        &state.event_bus,
        "updated",
        Some(identity.user_id),
        &employee,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(employee))
}

/// Soft-deactivate: the record stays for payroll history, but disappears
/// from listings and lookups.
#[utoipa::path(
    delete,
    path = "/employees/{employeeId}",
    tag = "Employees",
    security(("bearerAuth" = [])),
    params(("employeeId" = Uuid, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Employee deactivated", body = Employee),
        (status = 404, description = "Employee not found")
    )
)]
pub(crate) async fn deactivate_employee(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<Employee>> {
    let mut employee = fetch_employee(&state.pool, employee_id).await?;
    let now = utc_now();

    sqlx::query("UPDATE employees SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(employee_id.to_string())
        .execute(&state.pool)
        .await?;

    employee.deleted_at = Some(now);
    employee.updated_at = now;

    record_audit(
        &state.event_bus,
        "deleted",
        Some(identity.user_id),
        &employee,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(employee))
}

async fn fetch_employee(pool: &SqlitePool, employee_id: Uuid) -> AppResult<Employee> {
    let row = sqlx::query_as::<_, DbEmployee>(&format!(
        "{SELECT_EMPLOYEE} WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(employee_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("employee not found"))?;

    row.try_into()
}
