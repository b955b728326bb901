//! API error type — maps vault domain errors into HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lockbox_core::VaultError;
use serde::Serialize;

/// API error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication required or token invalid.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Client sent invalid input the routing layer caught.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A vault operation failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Vault(e) => match e {
                VaultError::Validation { reason } => {
                    (StatusCode::BAD_REQUEST, "bad_request", reason)
                }
                VaultError::Forbidden => (
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "permission denied".to_owned(),
                ),
                VaultError::NotFound => {
                    (StatusCode::NOT_FOUND, "not_found", "not found".to_owned())
                }
                // One uniform answer for every link failure mode.
                VaultError::InvalidLink => (
                    StatusCode::BAD_REQUEST,
                    "invalid_link",
                    "share link is invalid or has expired".to_owned(),
                ),
                VaultError::Conflict(entity) => (
                    StatusCode::CONFLICT,
                    "conflict",
                    format!("{entity} already exists"),
                ),
                VaultError::Crypto(e) => {
                    tracing::error!(error = %e, "crypto failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "internal server error".to_owned(),
                    )
                }
                VaultError::Storage(e) => {
                    tracing::error!(error = %e, "storage failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "internal server error".to_owned(),
                    )
                }
            },
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}
