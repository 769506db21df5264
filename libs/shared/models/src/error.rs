use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ServiceUnavailable(_))
    }

    /// The request was refused because of what the caller sent or who they
    /// are, rather than because the server failed.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AppError::Internal(_) | AppError::ServiceUnavailable(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, message) = match &self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        if self.is_rejection() {
            tracing::warn!("Rejected request: {}: {}", status, message);
        } else {
            tracing::error!("Error: {}: {}", status, message);
        }

        let body = Json(json!({
            "error": message,
            "retryable": retryable
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_rejections_and_server_errors_are_not() {
        for err in [
            AppError::Auth("no token".into()),
            AppError::Forbidden("not yours".into()),
            AppError::NotFound("missing".into()),
            AppError::ValidationError("in the past".into()),
            AppError::Conflict("already completed".into()),
        ] {
            assert!(err.is_rejection(), "{} should be a rejection", err);
            assert!(err.into_response().status().is_client_error());
        }

        for err in [AppError::Internal("bad offset".into()), AppError::ServiceUnavailable("down".into())] {
            assert!(!err.is_rejection());
            assert!(err.into_response().status().is_server_error());
        }
    }
}
