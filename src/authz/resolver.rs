use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::TokenUse;

use super::{aggregate_for_user, Identity};

const BEARER_SCHEME: &str = "Bearer";

/// Extract the bearer credential: exactly two space-separated tokens, the
/// first a case-sensitive `Bearer`. Anything else reads as absent — a
/// malformed header is not distinguished from a missing one.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Resolve the caller's identity before authorization runs.
///
/// Absent credential resolves to `None` and is valid for public routes.
/// Once a credential is present, every failure is hard: no session row →
/// `Gone`, failed signature/expiry → `Unauthorized`/`TokenExpired`. A
/// present-but-invalid credential is never downgraded to anonymous.
///
/// Resolution is read-only; the session row is never touched.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> AppResult<Option<Identity>> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };

    let session = state
        .sessions
        .find_by_access_token(token)
        .await?
        .ok_or_else(|| AppError::gone("session gone"))?;

    let claims = state.jwt.verify(token, TokenUse::Access)?;

    if session.user_id != claims.sub {
        return Err(AppError::unauthorized("session does not belong to this subject"));
    }

    let aggregated = aggregate_for_user(state.directory.as_ref(), claims.sub).await?;

    Ok(Some(Identity {
        user_id: claims.sub,
        employee_id: session.employee_id,
        department: session.department,
        roles: aggregated.roles,
        permissions: aggregated.permissions,
        access_token: token.to_string(),
    }))
}
