use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Every failure a handler can produce.
///
/// All variants except [`AppError::Internal`] are operational: their message
/// is safe to show to the client verbatim.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    /// An expected failure of an external collaborator (mail delivery).
    #[error("{0}")]
    Delivery(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Delivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("No {resource} found with that ID"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_operational() {
            self.to_string()
        } else {
            error!(error = ?self, "unexpected error");
            "Something went very wrong!".to_string()
        };
        let kind = if status.is_client_error() { "fail" } else { "error" };
        (status, Json(json!({ "status": kind, "message": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => {
                AppError::Conflict(format!("Duplicate value for {field}. Please use another value!"))
            }
            StoreError::Invalid(msg) => AppError::Validation(format!("Invalid input data. {msg}")),
            StoreError::MissingReference(what) => {
                AppError::Validation(format!("Referenced {what} does not exist"))
            }
            StoreError::Timeout => {
                AppError::Unavailable("The data store is busy, please try again later".into())
            }
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
