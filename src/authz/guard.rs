use std::sync::Arc;

use axum::extract::{MatchedPath, RawPathParams, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::RequestExt;
use uuid::Uuid;

use crate::app::AppState;
use crate::envelope::finalize_response;
use crate::errors::{AppError, AppResult};
use crate::registry::{HttpMethod, RouteTable};

use super::{resolve_identity, AccessRequirement, Identity};

/// Path parameter consulted by the self-service override. Only routes that
/// expose a parameter with exactly this name can fall back to it.
const SELF_SERVICE_PARAM: &str = "employeeId";

#[derive(Clone)]
pub struct PipelineState {
    pub app: AppState,
    pub table: Arc<RouteTable>,
}

/// The authorization decision for one request, given the route's declared
/// requirement, the resolved identity and the route's `employeeId` path
/// parameter if it has one.
///
/// Matching is deliberately loose: a declared entry is satisfied by at
/// least one overlapping asserted capability, and one satisfied entry out
/// of many is enough. Multiple declarations on the same action are meant to
/// be satisfiable by holding rights to any one of them; do not tighten this
/// to all-flags matching.
pub fn evaluate(
    requirement: &AccessRequirement,
    identity: Option<&Identity>,
    employee_param: Option<Uuid>,
) -> AppResult<()> {
    match requirement {
        AccessRequirement::Public => Ok(()),
        AccessRequirement::Authenticated => identity
            .map(|_| ())
            .ok_or_else(|| AppError::unauthorized("authentication required")),
        AccessRequirement::Permissions(entries) => {
            let Some(identity) = identity else {
                return Err(AppError::unauthorized("authentication required"));
            };

            let satisfied = entries.iter().any(|entry| {
                identity
                    .find_permission(entry.permission)
                    .map(|row| row.capabilities.intersects(&entry.capabilities))
                    .unwrap_or(false)
            });
            if satisfied {
                return Ok(());
            }

            // Self-service fallback: the subject may act on their own
            // employee record even without the declared capability.
            if let (Some(own), Some(target)) = (identity.employee_id, employee_param) {
                if own == target {
                    tracing::debug!(user_id = %identity.user_id, "self-service override");
                    return Ok(());
                }
            }

            tracing::debug!(
                user_id = %identity.user_id,
                roles = ?identity.roles,
                "permission denied"
            );
            Err(AppError::forbidden("insufficient permissions"))
        }
    }
}

/// The per-request dispatch chain: session resolution, the authorization
/// decision against the compiled route table, the business handler, and the
/// envelope writer. Layered once over the compiled router.
pub async fn pipeline(State(state): State<PipelineState>, mut req: Request, next: Next) -> Response {
    let identity = match resolve_identity(&state.app, req.headers()).await {
        Ok(identity) => identity,
        Err(err) => return finalize_response(err.into_response(), None).await,
    };

    // Unmatched requests carry no route pattern; they fall through to the
    // 404 fallback with no requirement to enforce. A matched path whose
    // method has no table entry dispatches no handler either — the method
    // router answers 405 below.
    let matched = req.extensions().get::<MatchedPath>().cloned();
    if let Some(matched) = matched {
        let requirement = HttpMethod::from_method(req.method())
            .and_then(|method| state.table.get(&(method, matched.as_str().to_string())));

        if let Some(requirement) = requirement {
            let employee_param = match req.extract_parts::<RawPathParams>().await {
                Ok(params) => params
                    .iter()
                    .find(|(name, _)| *name == SELF_SERVICE_PARAM)
                    .and_then(|(_, value)| Uuid::parse_str(value).ok()),
                Err(_) => None,
            };

            if let Err(err) = evaluate(requirement, identity.as_ref(), employee_param) {
                return finalize_response(err.into_response(), identity.as_ref()).await;
            }
        }
    }

    if let Some(resolved) = identity.clone() {
        req.extensions_mut().insert(resolved);
    }

    let response = next.run(req).await;
    finalize_response(response, identity.as_ref()).await
}
