//! Leave requests: submission, approval, and the authorization gates
//! between them.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::*;

async fn employee_login(t: &TestApp, email: &str) -> Result<(uuid::Uuid, String)> {
    let user_id = seed_user(&t.pool, email, "worker-password-1").await?;
    let employee_id = seed_employee(&t.pool, Some(user_id), email, Some("Operations")).await?;
    let (token, _) = login(&t.app, email, "worker-password-1").await?;
    Ok((employee_id, token))
}

#[tokio::test]
async fn submit_and_approve_flow() -> Result<()> {
    let t = setup().await?;
    let (admin_id, admin_token) = admin_session(&t).await?;
    let (employee_id, worker_token) = employee_login(&t, "worker@example.com").await?;

    let (status, body) = send(
        &t.app,
        "POST",
        "/leave",
        Some(&worker_token),
        Some(json!({
            "starts_on": "2025-09-01",
            "ends_on": "2025-09-05",
            "kind": "annual",
            "reason": "family visit"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["employee_id"], employee_id.to_string());
    let leave_id = body["data"]["id"].as_str().unwrap().to_string();

    // visible in the management listing
    let (status, body) = send(&t.app, "GET", "/leave", Some(&admin_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|row| row["id"] == leave_id.as_str()));

    let (status, body) = send(
        &t.app,
        "PUT",
        &format!("/leave/{leave_id}/approval"),
        Some(&admin_token),
        Some(json!({ "approve": true })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["decided_by"], admin_id.to_string());

    // a decided request cannot be decided again
    let (status, _) = send(
        &t.app,
        "PUT",
        &format!("/leave/{leave_id}/approval"),
        Some(&admin_token),
        Some(json!({ "approve": false })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn rejection_is_recorded() -> Result<()> {
    let t = setup().await?;
    let (_admin_id, admin_token) = admin_session(&t).await?;
    let (_employee_id, worker_token) = employee_login(&t, "worker@example.com").await?;

    let (_, body) = send(
        &t.app,
        "POST",
        "/leave",
        Some(&worker_token),
        Some(json!({
            "starts_on": "2025-12-20",
            "ends_on": "2026-01-05",
            "kind": "unpaid"
        })),
    )
    .await?;
    let leave_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.app,
        "PUT",
        &format!("/leave/{leave_id}/approval"),
        Some(&admin_token),
        Some(json!({ "approve": false })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");

    Ok(())
}

#[tokio::test]
async fn invalid_date_range_is_a_bad_request() -> Result<()> {
    let t = setup().await?;
    let (_employee_id, worker_token) = employee_login(&t, "worker@example.com").await?;

    let (status, body) = send(
        &t.app,
        "POST",
        "/leave",
        Some(&worker_token),
        Some(json!({
            "starts_on": "2025-09-05",
            "ends_on": "2025-09-01",
            "kind": "annual"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    Ok(())
}

#[tokio::test]
async fn an_account_without_an_employee_record_cannot_submit() -> Result<()> {
    let t = setup().await?;
    seed_user(&t.pool, "ghost@example.com", "ghost-password-12").await?;
    let (token, _) = login(&t.app, "ghost@example.com", "ghost-password-12").await?;

    let (status, _) = send(
        &t.app,
        "POST",
        "/leave",
        Some(&token),
        Some(json!({
            "starts_on": "2025-09-01",
            "ends_on": "2025-09-02",
            "kind": "sick"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn deciding_requires_the_approve_capability() -> Result<()> {
    let t = setup().await?;
    let (_employee_id, worker_token) = employee_login(&t, "worker@example.com").await?;

    let (_, body) = send(
        &t.app,
        "POST",
        "/leave",
        Some(&worker_token),
        Some(json!({
            "starts_on": "2025-09-01",
            "ends_on": "2025-09-02",
            "kind": "sick"
        })),
    )
    .await?;
    let leave_id = body["data"]["id"].as_str().unwrap().to_string();

    // the submitter holds no LEAVE_MANAGEMENT capability
    let (status, _) = send(
        &t.app,
        "PUT",
        &format!("/leave/{leave_id}/approval"),
        Some(&worker_token),
        Some(json!({ "approve": true })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
