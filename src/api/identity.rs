use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::repository;
use crate::enrollment::Actor;
use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The stored user named by the `x-user-id` header.
pub struct CurrentUser {
    pub user: User,
    pub actor: Actor,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_HEADER)))?;

        let user = repository::find_user(&state.db, id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(format!("unknown user {}", id)))?;

        let actor = Actor::from(&user);
        Ok(Self { user, actor })
    }
}
