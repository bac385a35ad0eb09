mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{body_to_vec, TestApp};
use doctrail::models::{User, UserRole};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct NotificationInfo {
    id: Uuid,
    document_id: Uuid,
    kind: String,
    title: String,
    message: String,
    is_read: bool,
    read_at: Option<String>,
    email_sent: bool,
}

#[derive(Deserialize)]
struct UnreadInfo {
    unread: i64,
}

#[derive(Deserialize)]
struct MarkAllInfo {
    updated: usize,
}

struct Fixture {
    app: TestApp,
    head_token: String,
    clerk: User,
    clerk_token: String,
}

async fn setup() -> Result<Fixture> {
    let app = TestApp::new();
    let health = app.insert_department("Health", "HEA").await?;
    app.insert_user(
        "vera@townhall.gov",
        "Vera Neagu",
        "head-pass",
        UserRole::DepartmentHead,
        health,
    )
    .await?;
    let clerk = app
        .insert_user(
            "paul@townhall.gov",
            "Paul Enache",
            "clerk-pass",
            UserRole::Employee,
            health,
        )
        .await?;
    let head_token = app.login_token("vera@townhall.gov", "head-pass").await?;
    let clerk_token = app.login_token("paul@townhall.gov", "clerk-pass").await?;
    Ok(Fixture {
        app,
        head_token,
        clerk,
        clerk_token,
    })
}

/// Creates a document assigned to the clerk and returns its id and number.
async fn assign_document(fx: &Fixture, title: &str) -> Result<(Uuid, String)> {
    #[derive(Deserialize)]
    struct Created {
        id: Uuid,
        number: String,
    }

    let response = fx
        .app
        .post_json(
            "/api/documents",
            &json!({
                "title": title,
                "description": "Needs the clerk's attention",
                "document_type": "memo",
                "assigned_to": fx.clerk.id,
            }),
            Some(&fx.head_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_vec(response.into_body()).await?;
    let created: Created = serde_json::from_slice(&body)?;
    Ok((created.id, created.number))
}

async fn list_notifications(fx: &Fixture, query: &str) -> Result<Vec<NotificationInfo>> {
    let response = fx
        .app
        .get(
            &format!("/api/notifications{query}"),
            Some(&fx.clerk_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn unread_count(fx: &Fixture) -> Result<i64> {
    let response = fx
        .app
        .get("/api/notifications/unread-count", Some(&fx.clerk_token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let count: UnreadInfo = serde_json::from_slice(&body)?;
    Ok(count.unread)
}

#[tokio::test]
async fn assignment_notice_arrives_once_the_outbox_runs() -> Result<()> {
    let fx = setup().await?;
    let (document_id, number) = assign_document(&fx, "Vaccination schedule").await?;

    assert_eq!(unread_count(&fx).await?, 0, "delivery waits for the outbox");
    assert_eq!(fx.app.drain_outbox().await?, 1);
    assert_eq!(unread_count(&fx).await?, 1);

    let notifications = list_notifications(&fx, "").await?;
    assert_eq!(notifications.len(), 1);
    let notice = &notifications[0];
    assert_eq!(notice.document_id, document_id);
    assert_eq!(notice.kind, "document_received");
    assert_eq!(notice.title, format!("New Document Assigned: {number}"));
    assert_eq!(
        notice.message,
        format!("You have been assigned document 'Vaccination schedule' ({number})")
    );
    assert!(!notice.is_read);
    assert!(notice.email_sent, "the same job sends the email");

    let emails = fx.app.mailer().sent().await;
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "paul@townhall.gov");
    assert_eq!(emails[0].subject, notice.title);

    Ok(())
}

#[tokio::test]
async fn read_state_can_be_flipped_one_by_one_or_wholesale() -> Result<()> {
    let fx = setup().await?;
    assign_document(&fx, "Ambulance contract").await?;
    assign_document(&fx, "Clinic inventory").await?;
    assert_eq!(fx.app.drain_outbox().await?, 2);
    assert_eq!(unread_count(&fx).await?, 2);

    let notifications = list_notifications(&fx, "").await?;
    assert_eq!(notifications.len(), 2);

    let response = fx
        .app
        .post_json(
            &format!("/api/notifications/{}/read", notifications[0].id),
            &json!({}),
            Some(&fx.clerk_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let updated: NotificationInfo = serde_json::from_slice(&body)?;
    assert!(updated.is_read);
    assert!(updated.read_at.is_some());

    let unread = list_notifications(&fx, "?unread_only=true").await?;
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, notifications[1].id);
    assert_eq!(unread_count(&fx).await?, 1);

    let response = fx
        .app
        .post_json("/api/notifications/read-all", &json!({}), Some(&fx.clerk_token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let marked: MarkAllInfo = serde_json::from_slice(&body)?;
    assert_eq!(marked.updated, 1);
    assert_eq!(unread_count(&fx).await?, 0);

    // A second sweep has nothing left to touch.
    let response = fx
        .app
        .post_json("/api/notifications/read-all", &json!({}), Some(&fx.clerk_token))
        .await?;
    let body = body_to_vec(response.into_body()).await?;
    let marked: MarkAllInfo = serde_json::from_slice(&body)?;
    assert_eq!(marked.updated, 0);

    Ok(())
}

#[tokio::test]
async fn notifications_are_invisible_to_other_users() -> Result<()> {
    let fx = setup().await?;
    assign_document(&fx, "Blood drive logistics").await?;
    fx.app.drain_outbox().await?;

    let notifications = list_notifications(&fx, "").await?;
    let foreign_id = notifications[0].id;

    let response = fx
        .app
        .post_json(
            &format!("/api/notifications/{foreign_id}/read"),
            &json!({}),
            Some(&fx.head_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = fx
        .app
        .delete(
            &format!("/api/notifications/{foreign_id}"),
            Some(&fx.head_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The owner still sees it untouched.
    assert_eq!(unread_count(&fx).await?, 1);

    Ok(())
}

#[tokio::test]
async fn deleting_a_notification_is_permanent() -> Result<()> {
    let fx = setup().await?;
    assign_document(&fx, "Flu season briefing").await?;
    fx.app.drain_outbox().await?;

    let notifications = list_notifications(&fx, "").await?;
    let id = notifications[0].id;

    let response = fx
        .app
        .delete(&format!("/api/notifications/{id}"), Some(&fx.clerk_token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = fx
        .app
        .delete(&format!("/api/notifications/{id}"), Some(&fx.clerk_token))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(list_notifications(&fx, "").await?.is_empty());

    Ok(())
}
