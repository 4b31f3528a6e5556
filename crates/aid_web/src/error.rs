use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use aid_core::Error;

/// Response-side error: classified, with storage detail kept out of the
/// body and logged instead.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Core(Error),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Core(err) => match &err {
                Error::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
                Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, err.to_string()),
                Error::ProfileNotFound(_) => {
                    (StatusCode::NOT_FOUND, "User not found".to_string())
                }
                _ => {
                    error!("request failed: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Something went wrong!".to_string(),
                    )
                }
            },
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
