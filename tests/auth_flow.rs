mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::StatusCode;
use common::{body_to_vec, TestApp};
use doctrail::models::UserRole;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct LoginInfo {
    access_token: String,
    refresh_token: String,
    token_type: String,
    expires_in: i64,
    user: ProfileInfo,
}

#[derive(Deserialize)]
struct ProfileInfo {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    department_id: Uuid,
    active: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

async fn login(app: &TestApp, email: &str, password: &str) -> Result<hyper::Response<Body>> {
    app.post_json(
        "/api/auth/login",
        &json!({ "email": email, "password": password }),
        None,
    )
    .await
}

#[tokio::test]
async fn login_returns_a_profile_and_working_tokens() -> Result<()> {
    let app = TestApp::new();
    let finance = app.insert_department("Finance", "FIN").await?;
    let user = app
        .insert_user(
            "ana@townhall.gov",
            "Ana Marin",
            "s3cret",
            UserRole::Employee,
            finance,
        )
        .await?;

    let response = login(&app, "ana@townhall.gov", "s3cret").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let login: LoginInfo = serde_json::from_slice(&body)?;

    assert_eq!(login.token_type, "Bearer");
    assert_eq!(login.expires_in, 3600);
    assert_eq!(login.user.id, user.id);
    assert_eq!(login.user.email, "ana@townhall.gov");
    assert_eq!(login.user.full_name, "Ana Marin");
    assert_eq!(login.user.role, "employee");
    assert_eq!(login.user.department_id, finance);
    assert!(login.user.active);

    let me = app.get("/api/auth/me", Some(&login.access_token)).await?;
    assert_eq!(me.status(), StatusCode::OK);
    let body = body_to_vec(me.into_body()).await?;
    let me: ProfileInfo = serde_json::from_slice(&body)?;
    assert_eq!(me.email, "ana@townhall.gov");

    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let app = TestApp::new();
    let finance = app.insert_department("Finance", "FIN").await?;
    app.insert_user(
        "ana@townhall.gov",
        "Ana Marin",
        "s3cret",
        UserRole::Employee,
        finance,
    )
    .await?;

    let response = login(&app, "ana@townhall.gov", "wrong").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_to_vec(response.into_body()).await?;
    let error: ErrorBody = serde_json::from_slice(&body)?;
    assert_eq!(error.error, "unauthorized");

    // An unknown address fails the same way as a wrong password.
    let response = login(&app, "nobody@townhall.gov", "s3cret").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_to_vec(response.into_body()).await?;
    let error: ErrorBody = serde_json::from_slice(&body)?;
    assert_eq!(error.error, "unauthorized");

    Ok(())
}

#[tokio::test]
async fn deactivated_accounts_are_locked_out() -> Result<()> {
    let app = TestApp::new();
    let finance = app.insert_department("Finance", "FIN").await?;
    let ghost = app
        .insert_inactive_user("ghost@townhall.gov", "Ghost Writer", finance)
        .await?;

    let response = login(&app, "ghost@townhall.gov", "placeholder").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Even a token minted before deactivation stops working.
    let stale_token = app.token_for(&ghost)?;
    let response = app.get("/api/auth/me", Some(&stale_token)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_to_vec(response.into_body()).await?;
    let error: ErrorBody = serde_json::from_slice(&body)?;
    assert_eq!(error.error, "account is deactivated");

    Ok(())
}

#[tokio::test]
async fn refresh_issues_a_new_token_pair() -> Result<()> {
    let app = TestApp::new();
    let finance = app.insert_department("Finance", "FIN").await?;
    app.insert_user(
        "ana@townhall.gov",
        "Ana Marin",
        "s3cret",
        UserRole::Employee,
        finance,
    )
    .await?;

    let response = login(&app, "ana@townhall.gov", "s3cret").await?;
    let body = body_to_vec(response.into_body()).await?;
    let first: LoginInfo = serde_json::from_slice(&body)?;

    let response = app
        .post_json(
            "/api/auth/refresh",
            &json!({ "refresh_token": first.refresh_token }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let second: LoginInfo = serde_json::from_slice(&body)?;

    let me = app.get("/api/auth/me", Some(&second.access_token)).await?;
    assert_eq!(me.status(), StatusCode::OK);

    // Access tokens carry the wrong audience for the refresh endpoint.
    let response = app
        .post_json(
            "/api/auth/refresh",
            &json!({ "refresh_token": first.access_token }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json(
            "/api/auth/refresh",
            &json!({ "refresh_token": "not-a-token" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let app = TestApp::new();

    let response = app.get("/api/documents", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/notifications", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/documents", Some("garbage-token")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Health stays open for probes.
    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}
