#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use peopleops::create_app;
use peopleops::utils::hash_password;

/// Ids fixed by the seed migration.
pub const ADMINISTRATOR_ROLE_ID: &str = "00000000-0000-0000-0000-000000000a01";
pub const STAFF_ROLE_ID: &str = "00000000-0000-0000-0000-000000000a02";

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn setup() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let app = create_app(pool.clone()).await?;

    Ok(TestApp {
        app,
        pool,
        _dir: dir,
    })
}

/// Drive one request through the router and parse the envelope.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, value))
}

/// Like `send` but with a verbatim Authorization header value.
pub async fn send_with_auth_header(
    app: &Router,
    method: &str,
    uri: &str,
    header: &str,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", header)
        .body(Body::empty())?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, value))
}

pub async fn seed_user(pool: &SqlitePool, email: &str, password: &str) -> Result<Uuid> {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let password_hash = hash_password(password)?;

    sqlx::query("INSERT INTO users (id, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(user_id.to_string())
        .bind(email)
        .bind(&password_hash)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(user_id)
}

pub async fn seed_employee(
    pool: &SqlitePool,
    user_id: Option<Uuid>,
    email: &str,
    department: Option<&str>,
) -> Result<Uuid> {
    let employee_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO employees (id, user_id, first_name, last_name, email, department, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(employee_id.to_string())
    .bind(user_id.map(|id| id.to_string()))
    .bind("Test")
    .bind("Employee")
    .bind(email)
    .bind(department)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(employee_id)
}

pub async fn assign_role(pool: &SqlitePool, user_id: Uuid, role_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO role_assignments (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id.to_string())
        .bind(role_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

/// A custom (non-seed) role with a single permission row.
pub async fn seed_role_with_row(
    pool: &SqlitePool,
    name: &str,
    permission: &str,
    capabilities: Value,
) -> Result<Uuid> {
    let role_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query("INSERT INTO roles (id, name, created_by, created_at, updated_at) VALUES (?, ?, 'test', ?, ?)")
        .bind(role_id.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO permission_rows (id, role_id, permission, capabilities, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'test', ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(role_id.to_string())
    .bind(permission)
    .bind(capabilities.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(role_id)
}

/// Login through the API; returns (access_token, refresh_token).
pub async fn login(app: &Router, email: &str, password: &str) -> Result<(String, String)> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await?;

    anyhow::ensure!(status == StatusCode::OK, "login failed: {body}");

    let access = body["data"]["access_token"]
        .as_str()
        .context("missing access token")?
        .to_string();
    let refresh = body["data"]["refresh_token"]
        .as_str()
        .context("missing refresh token")?
        .to_string();

    Ok((access, refresh))
}

/// An ADMINISTRATOR login ready to exercise protected endpoints.
pub async fn admin_session(t: &TestApp) -> Result<(Uuid, String)> {
    let user_id = seed_user(&t.pool, "admin@example.com", "admin-password-1").await?;
    assign_role(&t.pool, user_id, ADMINISTRATOR_ROLE_ID).await?;
    let (access, _) = login(&t.app, "admin@example.com", "admin-password-1").await?;
    Ok((user_id, access))
}
