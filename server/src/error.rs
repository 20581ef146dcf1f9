use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{sheets::SheetsError, store::StoreError};

/// Application-level error taxonomy. Every mutating request resolves to
/// exactly one of: full success, partial success (2xx body carrying a failed
/// sync outcome), or one of these.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(id),
            StoreError::Upload(message) => AppError::Upload(message),
            StoreError::Backend(message) => AppError::Persistence(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Persistence(_) | AppError::Sheets(_) | AppError::Upload(_) => {
                StatusCode::BAD_GATEWAY
            }
        };

        (status, self.to_string()).into_response()
    }
}
