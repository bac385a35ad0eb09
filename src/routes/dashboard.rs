use axum::extract::{Json, State};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::documents::default_scope;
use crate::auth::CurrentUser;
use crate::error::AppResult;
use crate::models::{DocumentPriority, DocumentStatus};
use crate::state::AppState;
use crate::store::{DocumentFilter, DocumentScope, DocumentStats, Page};

#[derive(Serialize)]
pub struct DashboardResponse {
    pub department: DocumentStats,
    pub assigned_to_me: DocumentStats,
    pub created_by_me: i64,
    pub unread_notifications: i64,
    pub upcoming_deadlines: Vec<DeadlineItem>,
}

#[derive(Serialize)]
pub struct DeadlineItem {
    pub id: Uuid,
    pub number: String,
    pub title: String,
    pub priority: DocumentPriority,
    pub status: DocumentStatus,
    pub deadline: DateTime<Utc>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<DashboardResponse>> {
    let department = state
        .store
        .document_stats(&DocumentFilter::scoped(default_scope(&user.user)))
        .await?;
    let assigned_to_me = state
        .store
        .document_stats(&DocumentFilter::scoped(DocumentScope::AssignedTo(
            user.user.id,
        )))
        .await?;
    let created_by_me = state
        .store
        .document_stats(&DocumentFilter::scoped(DocumentScope::CreatedBy(
            user.user.id,
        )))
        .await?
        .total;
    let unread_notifications = state.store.unread_count(user.user.id).await?;

    let now = Utc::now();
    let horizon = now + Duration::days(7);
    let assigned = state
        .store
        .list_documents(
            &DocumentFilter::scoped(DocumentScope::AssignedTo(user.user.id)),
            Page::new(0, 100),
        )
        .await?;

    let mut upcoming_deadlines: Vec<DeadlineItem> = assigned
        .into_iter()
        .filter(|document| {
            !matches!(
                document.status,
                DocumentStatus::Completed | DocumentStatus::Archived
            )
        })
        .filter_map(|document| {
            let deadline = document.deadline?;
            (deadline >= now && deadline <= horizon).then(|| DeadlineItem {
                id: document.id,
                number: document.number,
                title: document.title,
                priority: document.priority,
                status: document.status,
                deadline,
            })
        })
        .collect();
    upcoming_deadlines.sort_by_key(|item| item.deadline);

    Ok(Json(DashboardResponse {
        department,
        assigned_to_me,
        created_by_me,
        unread_notifications,
        upcoming_deadlines,
    }))
}
