//! Role administration: seed-record protections and the permission-set
//! update contract.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::*;

#[tokio::test]
async fn migration_seeded_rows_are_never_overwritten() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, token) = admin_session(&t).await?;

    let permissions_uri = format!("/roles/{ADMINISTRATOR_ROLE_ID}/permissions");

    let (status, before) = send(&t.app, "GET", &permissions_uri, Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let before_row = before["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["permission"] == "EMPLOYEE_MANAGEMENT")
        .expect("seed row present")
        .clone();
    assert_eq!(before_row["created_by"], "migration");
    assert_eq!(before_row["canDelete"], true);

    // Try to strip the row down to canRead only. The call must succeed and
    // return the row unchanged.
    let (status, body) = send(
        &t.app,
        "PUT",
        &permissions_uri,
        Some(&token),
        Some(json!([{ "permission": "EMPLOYEE_MANAGEMENT", "canRead": true }])),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let returned = &body["data"][0];
    assert_eq!(*returned, before_row, "returned row must be identical to the stored one");

    // And the store agrees.
    let (_, after) = send(&t.app, "GET", &permissions_uri, Some(&token), None).await?;
    let after_row = after["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["permission"] == "EMPLOYEE_MANAGEMENT")
        .unwrap()
        .clone();
    assert_eq!(after_row, before_row);

    Ok(())
}

#[tokio::test]
async fn unprotected_rows_overwrite_and_missing_rows_are_created() -> Result<()> {
    let t = setup().await?;
    let (admin_id, token) = admin_session(&t).await?;

    let (status, body) = send(
        &t.app,
        "POST",
        "/roles",
        Some(&token),
        Some(json!({ "name": "AUDITOR" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["created_by"], admin_id.to_string());

    let permissions_uri = format!("/roles/{role_id}/permissions");

    // missing row: created, attributed to the acting user
    let (status, body) = send(
        &t.app,
        "PUT",
        &permissions_uri,
        Some(&token),
        Some(json!([{ "permission": "PAYROLL_MANAGEMENT", "canRead": true }])),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["created_by"], admin_id.to_string());
    assert_eq!(body["data"][0]["canRead"], true);

    // existing unprotected row: flags are replaced wholesale
    let (status, body) = send(
        &t.app,
        "PUT",
        &permissions_uri,
        Some(&token),
        Some(json!([{ "permission": "PAYROLL_MANAGEMENT", "canExport": true }])),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["canExport"], true);
    assert!(body["data"][0].get("canRead").is_none(), "old flags do not survive an overwrite");

    Ok(())
}

#[tokio::test]
async fn seed_roles_cannot_be_renamed_or_deleted() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, token) = admin_session(&t).await?;

    let (status, body) = send(
        &t.app,
        "PUT",
        &format!("/roles/{ADMINISTRATOR_ROLE_ID}"),
        Some(&token),
        Some(json!({ "name": "SUPERUSER" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &t.app,
        "DELETE",
        &format!("/roles/{STAFF_ROLE_ID}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn custom_role_lifecycle() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, token) = admin_session(&t).await?;

    let (status, body) = send(
        &t.app,
        "POST",
        "/roles",
        Some(&token),
        Some(json!({ "name": "CONTRACTOR" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = body["data"]["id"].as_str().unwrap().to_string();

    // duplicate names are rejected
    let (status, _) = send(
        &t.app,
        "POST",
        "/roles",
        Some(&token),
        Some(json!({ "name": "CONTRACTOR" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        "PUT",
        &format!("/roles/{role_id}"),
        Some(&token),
        Some(json!({ "name": "EXTERNAL_CONTRACTOR" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "EXTERNAL_CONTRACTOR");

    let (status, _) = send(&t.app, "DELETE", &format!("/roles/{role_id}"), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &t.app,
        "GET",
        &format!("/roles/{role_id}/permissions"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn role_assignment_endpoints_round_trip() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, token) = admin_session(&t).await?;
    let user_id = seed_user(&t.pool, "member@example.com", "member-password-1").await?;

    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/users/{user_id}/roles"),
        Some(&token),
        Some(json!({ "role_id": STAFF_ROLE_ID })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&t.app, "GET", &format!("/users/{user_id}/roles"), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().iter().any(|role| role["name"] == "STAFF"));

    let (status, _) = send(
        &t.app,
        "DELETE",
        &format!("/users/{user_id}/roles/{STAFF_ROLE_ID}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&t.app, "GET", &format!("/users/{user_id}/roles"), Some(&token), None).await?;
    assert!(body["data"].as_array().unwrap().is_empty());

    // unknown role ids are a 404, not a silent no-op
    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/users/{user_id}/roles"),
        Some(&token),
        Some(json!({ "role_id": "00000000-0000-0000-0000-00000000dead" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn role_administration_requires_the_capability() -> Result<()> {
    let t = setup().await?;
    let user_id = seed_user(&t.pool, "viewer@example.com", "viewer-password-1").await?;
    let viewer = seed_role_with_row(
        &t.pool,
        "ROLE_VIEWER",
        "ROLE_MANAGEMENT",
        json!({ "canRead": true }),
    )
    .await?;
    assign_role(&t.pool, user_id, &viewer.to_string()).await?;
    let (token, _) = login(&t.app, "viewer@example.com", "viewer-password-1").await?;

    // class-level canRead: listing works
    let (status, _) = send(&t.app, "GET", "/roles", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    // but mutation handlers override to stricter capabilities
    let (status, _) = send(
        &t.app,
        "POST",
        "/roles",
        Some(&token),
        Some(json!({ "name": "NOPE" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
