use axum::Json;
use serde_json::{json, Value};

use crate::authz::AccessRequirement;
use crate::errors::AppResult;
use crate::registry::{ControllerRegistry, HandlerBindings, HttpMethod};

pub fn register(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    registry
        .controller("/health", AccessRequirement::Public)
        .route(HttpMethod::Get, "/", "health.check");

    bindings.bind("health.check", health_check);
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is up"))
)]
pub(crate) async fn health_check() -> AppResult<Json<Value>> {
    Ok(Json(json!({ "status": "ok" })))
}
