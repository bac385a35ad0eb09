use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{password, CurrentUser},
    error::{AppError, AppResult},
    models::User,
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: &'static str,
    pub department_id: Uuid,
    pub active: bool,
}

pub(super) fn to_profile(user: &User) -> UserProfile {
    UserProfile {
        id: user.id,
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        role: user.role.as_str(),
        department_id: user.department_id,
        active: user.active,
    }
}

fn issue_tokens(state: &AppState, user: &User) -> AppResult<LoginResponse> {
    let access_token = state.jwt.generate_access_token(user)?;
    let refresh_token = state.jwt.generate_refresh_token(user.id)?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.access_expiry_seconds(),
        user: to_profile(user),
    })
}

/// Unknown emails and wrong passwords get the same 401 so the endpoint
/// does not reveal which accounts exist.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = state
        .store
        .user_by_email(&payload.email)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    if !user.active {
        return Err(AppError::forbidden("account is deactivated"));
    }

    Ok(Json(issue_tokens(&state, &user)?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<LoginResponse>> {
    let claims = state
        .jwt
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|_| AppError::unauthorized())?;

    let user = state
        .store
        .user(claims.sub)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    if !user.active {
        return Err(AppError::forbidden("account is deactivated"));
    }

    Ok(Json(issue_tokens(&state, &user)?))
}

pub async fn me(user: CurrentUser) -> Json<UserProfile> {
    Json(to_profile(&user.user))
}
