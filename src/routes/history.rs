use axum::extract::{Json, Path, Query, State};
use uuid::Uuid;

use super::documents::PageQuery;
use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::models::{HistoryEntry, UserRole};
use crate::state::AppState;

pub async fn user_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PageQuery>,
    user: CurrentUser,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    if user.user.id != user_id && user.user.role != UserRole::Admin {
        return Err(AppError::forbidden("operation not permitted"));
    }

    let entries = state.store.entries_by_actor(user_id, params.page()).await?;
    Ok(Json(entries))
}

pub async fn department_history(
    State(state): State<AppState>,
    Path(department_id): Path<Uuid>,
    Query(params): Query<PageQuery>,
    user: CurrentUser,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    if user.user.department_id != department_id && user.user.role != UserRole::Admin {
        return Err(AppError::forbidden("operation not permitted"));
    }

    let entries = state
        .store
        .entries_for_department(department_id, params.page())
        .await?;
    Ok(Json(entries))
}
