//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ErrorKind;
use negotiation::NegotiationError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    Forbidden(String),
    TooManyRequests,
    /// Negotiation failure, mapped by its kind.
    Negotiation(NegotiationError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status this error renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Negotiation(err) => status_for(err.kind()),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Forbidden(msg) => msg,
            ApiError::TooManyRequests => "too many requests, slow down".to_string(),
            ApiError::Negotiation(err) if status.is_server_error() => {
                tracing::error!(error = %err, "negotiation failed");
                "internal server error".to_string()
            }
            ApiError::Negotiation(err) => err.to_string(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                "internal server error".to_string()
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<NegotiationError> for ApiError {
    fn from(err: NegotiationError) -> Self {
        ApiError::Negotiation(err)
    }
}
