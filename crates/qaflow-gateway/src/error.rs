use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use qaflow_core::QaError;
use tracing::{error, warn};

/// An error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
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

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl From<QaError> for ApiError {
    fn from(err: QaError) -> Self {
        let status = match &err {
            QaError::Validation(_) | QaError::UserInput(_) => StatusCode::BAD_REQUEST,
            QaError::Http(_) | QaError::Api { .. } | QaError::SchemaMismatch(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match err {
            // Shown to users verbatim.
            QaError::UserInput(message) => message,
            other => other.to_string(),
        };
        Self::new(status, message)
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "Request failed");
        } else {
            warn!(status = %self.status, error = %self.message, "Request rejected");
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
