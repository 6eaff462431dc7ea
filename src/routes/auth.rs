use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::app::AppState;
use crate::authz::{AccessRequirement, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::{record_audit, RequestContext};
use crate::jwt::TokenUse;
use crate::models::user::{DbUser, LoginRequest, RefreshRequest, TokenPair, User};
use crate::registry::{ControllerRegistry, HandlerBindings, HttpMethod};
use crate::utils::{utc_now, verify_password};

pub fn register(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    registry
        .controller("/auth", AccessRequirement::Public)
        .route(HttpMethod::Post, "/login", "auth.login")
        .route(HttpMethod::Post, "/refresh", "auth.refresh")
        .route(HttpMethod::Post, "/logout", "auth.logout")
        .route(HttpMethod::Get, "/me", "auth.me")
        .authorize("auth.logout", AccessRequirement::Authenticated)
        .authorize("auth.me", AccessRequirement::Authenticated);

    bindings
        .bind("auth.login", login)
        .bind("auth.refresh", refresh)
        .bind("auth.logout", logout)
        .bind("auth.me", me);
}

/// Authenticate with email and password; a durable session row is created
/// for the issued token pair, carrying the employee snapshot consulted by
/// the self-service override.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let user: User = db_user.try_into()?;

    // Employee snapshot cached on the session row at login time.
    let snapshot: Option<(String, Option<String>)> = sqlx::query_as(
        "SELECT id, department FROM employees WHERE user_id = ? AND deleted_at IS NULL",
    )
    .bind(user.id.to_string())
    .fetch_optional(&state.pool)
    .await?;
    let (employee_id, department) = match snapshot {
        Some((id, department)) => (Some(id), department),
        None => (None, None),
    };

    let access_token = state.jwt.encode(user.id, TokenUse::Access)?;
    let refresh_token = state.jwt.encode(user.id, TokenUse::Refresh)?;

    sqlx::query(
        "INSERT INTO sessions (access_token, refresh_token, user_id, employee_id, department, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&access_token)
    .bind(&refresh_token)
    .bind(user.id.to_string())
    .bind(&employee_id)
    .bind(&department)
    .bind(utc_now())
    .execute(&state.pool)
    .await?;

    record_audit(
        &state.event_bus,
        "login",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(TokenPair {
        access_token,
        refresh_token,
    }))
}

/// Swap a live refresh token for a fresh access token. The session row is
/// re-keyed to the new access token; the refresh token stays.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token rotated", body = TokenPair),
        (status = 401, description = "Refresh token invalid or expired"),
        (status = 410, description = "Session no longer exists")
    )
)]
pub(crate) async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let session_user: Option<String> =
        sqlx::query_scalar("SELECT user_id FROM sessions WHERE refresh_token = ?")
            .bind(&payload.refresh_token)
            .fetch_optional(&state.pool)
            .await?;
    let _ = session_user.ok_or_else(|| AppError::gone("session gone"))?;

    let claims = state.jwt.verify(&payload.refresh_token, TokenUse::Refresh)?;

    let access_token = state.jwt.encode(claims.sub, TokenUse::Access)?;
    sqlx::query("UPDATE sessions SET access_token = ? WHERE refresh_token = ?")
        .bind(&access_token)
        .bind(&payload.refresh_token)
        .execute(&state.pool)
        .await?;

    Ok(Json(TokenPair {
        access_token,
        refresh_token: payload.refresh_token,
    }))
}

/// Invalidate the caller's session. Any later use of the token resolves to
/// 410 Gone, regardless of its signature still being valid.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Session invalidated"))
)]
pub(crate) async fn logout(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Value>> {
    sqlx::query("DELETE FROM sessions WHERE access_token = ?")
        .bind(&identity.access_token)
        .execute(&state.pool)
        .await?;

    Ok(Json(Value::Null))
}

/// The caller's resolved identity: subject ids, role names and the merged
/// permission view.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Resolved identity"))
)]
pub(crate) async fn me(identity: Identity) -> AppResult<Json<Identity>> {
    Ok(Json(identity))
}
