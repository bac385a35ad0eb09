pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use crate::{
    error::AppError,
    models::{Actor, User},
    state::AppState,
};

/// The verified caller. Claims are only trusted as a pointer; the directory
/// row is reloaded on every request so a deactivated account loses access
/// the moment its flag flips, not when its token expires.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
}

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::from_user(&self.user)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_access_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        let user = state
            .store
            .user(claims.sub)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        if !user.active {
            return Err(AppError::forbidden("account is deactivated"));
        }

        Ok(CurrentUser { user })
    }
}
