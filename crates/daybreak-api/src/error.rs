use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use daybreak_types::error::EngineError;

/// Transport-side error: status code plus a human-readable body. Built
/// either directly by handlers (boundary validation) or from the engine's
/// closed error set — never from string matching.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidSchedule => StatusCode::BAD_REQUEST,
            EngineError::NotActive => StatusCode::BAD_REQUEST,
            EngineError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            // Existence and ownership are deliberately not distinguished.
            EngineError::NotFoundOrForbidden => StatusCode::NOT_FOUND,
            EngineError::Internal(e) => {
                error!("Unhandled engine failure: {:#}", e);
                return Self::internal();
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
