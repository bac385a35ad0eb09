use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::lifecycle::{CreateDocument, ForwardDocument, ModifyDocument, StatusChange};
use crate::models::{Document, DocumentStatus, FileAttachment, HistoryEntry, User, UserRole};
use crate::state::AppState;
use crate::store::{DocumentFilter, DocumentScope, DocumentStats, Page};

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub assigned_to_me: bool,
    #[serde(default)]
    pub created_by_me: bool,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.skip.unwrap_or(0), self.limit.unwrap_or(20))
    }
}

#[derive(Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub files: Vec<FileAttachment>,
}

/// The widest slice the caller may browse. Narrower filters
/// (`assigned_to_me`, `created_by_me`) are applied on top of this.
pub(super) fn default_scope(user: &User) -> DocumentScope {
    if user.role == UserRole::Admin {
        DocumentScope::All
    } else {
        DocumentScope::Department(user.department_id)
    }
}

fn build_filter(user: &User, params: &DocumentListQuery) -> AppResult<DocumentFilter> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            DocumentStatus::parse(raw)
                .ok_or_else(|| AppError::bad_request(format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };

    let scope = if params.assigned_to_me {
        DocumentScope::AssignedTo(user.id)
    } else if params.created_by_me {
        DocumentScope::CreatedBy(user.id)
    } else {
        default_scope(user)
    };

    let search = params
        .search
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_owned());

    Ok(DocumentFilter {
        scope,
        status,
        search,
    })
}

async fn to_document_response(
    state: &AppState,
    document: Document,
) -> AppResult<DocumentResponse> {
    let mut files_by_document = state.store.attachments_for(&[document.id]).await?;
    let files = files_by_document.remove(&document.id).unwrap_or_default();
    Ok(DocumentResponse { document, files })
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: CurrentUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let filter = build_filter(&user.user, &params)?;
    let page = Page::new(params.skip.unwrap_or(0), params.limit.unwrap_or(20));
    let documents = state.store.list_documents(&filter, page).await?;

    let ids: Vec<Uuid> = documents.iter().map(|document| document.id).collect();
    let mut files_by_document = state.store.attachments_for(&ids).await?;

    let list = documents
        .into_iter()
        .map(|document| {
            let files = files_by_document.remove(&document.id).unwrap_or_default();
            DocumentResponse { document, files }
        })
        .collect();

    Ok(Json(list))
}

pub async fn create_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateDocument>,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let document = state
        .lifecycle()
        .create_document(&user.actor(), payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            document,
            files: Vec::new(),
        }),
    ))
}

pub async fn document_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<DocumentStats>> {
    let filter = DocumentFilter::scoped(default_scope(&user.user));
    Ok(Json(state.store.document_stats(&filter).await?))
}

/// Reading the detail is itself an audited action, so this goes through
/// the lifecycle rather than straight to the store.
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<DocumentResponse>> {
    let document = state.lifecycle().view_document(&user.actor(), id).await?;
    Ok(Json(to_document_response(&state, document).await?))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<ModifyDocument>,
) -> AppResult<Json<DocumentResponse>> {
    let document = state
        .lifecycle()
        .modify_document(&user.actor(), id, payload)
        .await?;
    Ok(Json(to_document_response(&state, document).await?))
}

pub async fn archive_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    state.lifecycle().archive_document(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn forward_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<ForwardDocument>,
) -> AppResult<Json<DocumentResponse>> {
    let document = state
        .lifecycle()
        .forward_document(&user.actor(), id, payload)
        .await?;
    Ok(Json(to_document_response(&state, document).await?))
}

pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<StatusChange>,
) -> AppResult<Json<DocumentResponse>> {
    let document = state
        .lifecycle()
        .change_status(&user.actor(), id, payload)
        .await?;
    Ok(Json(to_document_response(&state, document).await?))
}

pub async fn document_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PageQuery>,
    user: CurrentUser,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let entries = state
        .lifecycle()
        .document_timeline(&user.actor(), id, params.page())
        .await?;
    Ok(Json(entries))
}

pub async fn document_routing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let entries = state
        .lifecycle()
        .forwarding_chain(&user.actor(), id)
        .await?;
    Ok(Json(entries))
}
