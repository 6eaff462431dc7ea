use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::auth::login,
        routes::auth::refresh,
        routes::auth::logout,
        routes::auth::me,
        routes::employees::directory,
        routes::employees::list_employees,
        routes::employees::create_employee,
        routes::employees::get_employee,
        routes::employees::update_employee,
        routes::employees::deactivate_employee,
        routes::leave::submit_leave,
        routes::leave::list_leave,
        routes::leave::decide_leave,
        routes::leave::leave_for_employee,
        routes::roles::list_roles,
        routes::roles::create_role,
        routes::roles::rename_role,
        routes::roles::delete_role,
        routes::roles::role_permissions,
        routes::roles::set_role_permissions,
        routes::users::user_roles,
        routes::users::assign_role,
        routes::users::revoke_role,
        routes::users::effective_permissions
    ),
    components(
        schemas(
            models::user::User,
            models::user::LoginRequest,
            models::user::TokenPair,
            models::user::RefreshRequest,
            models::employee::Employee,
            models::employee::EmployeeCreateRequest,
            models::employee::EmployeeUpdateRequest,
            models::employee::EmployeeSummary,
            models::leave::LeaveRequest,
            models::leave::LeaveCreateRequest,
            models::leave::LeaveDecisionRequest,
            models::leave::LeaveKind,
            models::leave::LeaveStatus,
            models::rbac::Role,
            models::rbac::RoleCreateRequest,
            models::rbac::RoleUpdateRequest,
            models::rbac::RoleAssignment,
            models::rbac::AssignRoleRequest
        )
    ),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Auth", description = "Session lifecycle"),
        (name = "Employees", description = "Employee records"),
        (name = "Leave", description = "Leave requests and approvals"),
        (name = "Roles", description = "Role and permission administration"),
        (name = "Users", description = "Role assignments per user")
    )
)]
pub struct ApiDoc;

/// Assemble the OpenAPI document: per-handler `#[utoipa::path]` metadata
/// plus the bearer security scheme and a server entry for the running
/// port.
pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    ensure_security_components(&mut doc);
    ensure_global_security(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut Value) {
    let components = doc
        .as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("components must be an object");

    let schemes = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("securitySchemes must be an object");

    schemes.insert(
        "bearerAuth".to_string(),
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }),
    );
}

fn ensure_global_security(doc: &mut Value) {
    doc.as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("security")
        .or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn ensure_servers(doc: &mut Value, port: u16) {
    let server_url = format!("http://localhost:{port}");

    match doc.get_mut("servers") {
        Some(Value::Array(servers)) => {
            let present = servers
                .iter()
                .any(|entry| entry.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
            if !present {
                servers.push(json!({ "url": server_url }));
            }
        }
        _ => {
            doc["servers"] = json!([{ "url": server_url }]);
        }
    }
}
