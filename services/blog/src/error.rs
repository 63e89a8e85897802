//! Custom error types for the blog service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{
    app::AppError, blob::BlobError, identity::IdentityError, propagation::PropagationError,
};

/// Custom error type for the blog service
#[derive(Error, Debug)]
pub enum ApiError {
    /// No signed-in user, or the credential was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Signed in, but not allowed to do this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request with message
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Another change of the session is in flight
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A backend did not answer in time
    #[error("Gateway timeout")]
    GatewayTimeout,

    /// A backend answered with an error
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "The request timed out".to_string(),
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let message = err.to_string();
        match err {
            AppError::NotSignedIn => ApiError::Unauthorized(message),
            AppError::NotPermitted(_) => ApiError::Forbidden(message),
            AppError::Invalid(_) => ApiError::BadRequest(message),
            AppError::PostNotFound(_) => ApiError::NotFound(message),
            AppError::Busy => ApiError::Conflict(message),
            AppError::Timeout => ApiError::GatewayTimeout,
            AppError::Identity(e) => match e {
                IdentityError::Disabled => ApiError::Forbidden(e.user_message()),
                IdentityError::Unavailable(_) => ApiError::BadGateway(e.user_message()),
                IdentityError::Database(_) => ApiError::InternalServerError,
                _ => ApiError::Unauthorized(e.user_message()),
            },
            AppError::Repository(_) => ApiError::BadGateway(message),
            AppError::Blob(BlobError::InvalidPath(_)) => ApiError::BadRequest(message),
            AppError::Blob(BlobError::Upload(_)) => ApiError::BadGateway(message),
            AppError::Propagation(e) => match e {
                PropagationError::InvalidName(_) => ApiError::BadRequest(message),
                PropagationError::NotCurrentUser(_) => ApiError::Forbidden(message),
                PropagationError::Timeout(_) => ApiError::GatewayTimeout,
                _ => ApiError::BadGateway(message),
            },
        }
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: AppError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_app_errors_map_to_status_codes() {
        assert_eq!(status(AppError::NotSignedIn), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(AppError::NotPermitted("no".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(AppError::Invalid("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(AppError::Busy), StatusCode::CONFLICT);
        assert_eq!(status(AppError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status(AppError::Identity(IdentityError::UnknownAccount(
                "u9".to_string()
            ))),
            StatusCode::UNAUTHORIZED
        );
    }
}
