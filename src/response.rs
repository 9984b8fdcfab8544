use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AppError;

/// Success envelope: `{status: "success", data}`, lists add `results`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: StatusCode,
    pub results: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: StatusCode::OK,
            results: None,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status_code: StatusCode::CREATED,
            ..Self::success(data)
        }
    }
}

impl ApiResponse<Vec<Value>> {
    pub fn list(items: Vec<Value>) -> Self {
        Self {
            results: Some(items.len()),
            ..Self::success(items)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                return AppError::Internal(anyhow::Error::new(e).context("serialize response"))
                    .into_response()
            }
        };

        let mut envelope = json!({ "status": "success", "data": data });
        if let Some(n) = self.results {
            envelope["results"] = json!(n);
        }
        (self.status_code, Json(envelope)).into_response()
    }
}

/// 204 for deletions.
pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
