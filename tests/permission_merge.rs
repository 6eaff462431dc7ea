//! Cross-role permission aggregation as seen through the API.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::*;

#[tokio::test]
async fn roles_union_their_capability_flags() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, admin_token) = admin_session(&t).await?;

    let user_id = seed_user(&t.pool, "merge@example.com", "merge-password-1").await?;
    let reader = seed_role_with_row(
        &t.pool,
        "EMPLOYEE_READER",
        "EMPLOYEE_MANAGEMENT",
        json!({ "canRead": true }),
    )
    .await?;
    let editor = seed_role_with_row(
        &t.pool,
        "EMPLOYEE_EDITOR",
        "EMPLOYEE_MANAGEMENT",
        json!({ "canUpdate": true }),
    )
    .await?;
    assign_role(&t.pool, user_id, &reader.to_string()).await?;
    assign_role(&t.pool, user_id, &editor.to_string()).await?;

    let (status, body) = send(
        &t.app,
        "GET",
        &format!("/users/{user_id}/permissions"),
        Some(&admin_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let roles = body["data"]["roles"].as_array().unwrap();
    assert!(roles.iter().any(|name| name == "EMPLOYEE_READER"));
    assert!(roles.iter().any(|name| name == "EMPLOYEE_EDITOR"));

    // exactly one merged entry per permission name, flags unioned
    let permissions = body["data"]["permissions"].as_array().unwrap();
    let rows: Vec<_> = permissions
        .iter()
        .filter(|row| row["permission"] == "EMPLOYEE_MANAGEMENT")
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["canRead"], true);
    assert_eq!(rows[0]["canUpdate"], true);
    // flags neither role asserted stay absent, not false
    assert!(rows[0].get("canDelete").is_none());

    Ok(())
}

#[tokio::test]
async fn a_subject_with_no_roles_resolves_to_empty_lists() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, admin_token) = admin_session(&t).await?;

    let user_id = seed_user(&t.pool, "bare@example.com", "bare-password-12").await?;

    let (status, body) = send(
        &t.app,
        "GET",
        &format!("/users/{user_id}/permissions"),
        Some(&admin_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["roles"].as_array().unwrap().is_empty());
    assert!(body["data"]["permissions"].as_array().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn merged_view_rides_on_the_identity() -> Result<()> {
    let t = setup().await?;

    let user_id = seed_user(&t.pool, "merge@example.com", "merge-password-1").await?;
    let reader = seed_role_with_row(
        &t.pool,
        "LEAVE_READER",
        "LEAVE_MANAGEMENT",
        json!({ "canRead": true }),
    )
    .await?;
    let approver = seed_role_with_row(
        &t.pool,
        "LEAVE_APPROVER",
        "LEAVE_MANAGEMENT",
        json!({ "canApprove": true }),
    )
    .await?;
    assign_role(&t.pool, user_id, &reader.to_string()).await?;
    assign_role(&t.pool, user_id, &approver.to_string()).await?;

    let (token, _) = login(&t.app, "merge@example.com", "merge-password-1").await?;
    let (status, body) = send(&t.app, "GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    let permissions = body["data"]["permissions"].as_array().unwrap();
    let row = permissions
        .iter()
        .find(|row| row["permission"] == "LEAVE_MANAGEMENT")
        .expect("merged row present");
    assert_eq!(row["canRead"], true);
    assert_eq!(row["canApprove"], true);

    // holding both flags, the subject passes both read and approve gates
    let (status, _) = send(&t.app, "GET", "/leave", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}
