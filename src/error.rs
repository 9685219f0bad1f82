use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::enrollment::EnrollmentError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut reason = None;
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Enrollment(err) => {
                let status = match &err {
                    EnrollmentError::Validation(_) => StatusCode::BAD_REQUEST,
                    EnrollmentError::NotFound(_) => StatusCode::NOT_FOUND,
                    EnrollmentError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
                    EnrollmentError::PreconditionFailed(p) => {
                        reason = Some(p.code());
                        StatusCode::CONFLICT
                    }
                };
                (status, err.to_string())
            }
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
            reason,
        });

        (status, body).into_response()
    }
}
