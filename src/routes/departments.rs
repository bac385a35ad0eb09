use axum::extract::{Json, Path, State};
use uuid::Uuid;

use super::auth::{to_profile, UserProfile};
use crate::error::{AppError, AppResult};
use crate::models::Department;
use crate::state::AppState;

pub async fn list_departments(State(state): State<AppState>) -> AppResult<Json<Vec<Department>>> {
    Ok(Json(state.store.departments().await?))
}

pub async fn department_users(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let department = state
        .store
        .department(id)
        .await?
        .ok_or_else(AppError::not_found)?;

    let users = state.store.users_in_department(department.id).await?;
    Ok(Json(users.iter().map(to_profile).collect()))
}
