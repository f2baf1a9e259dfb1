//! HTTP-facing error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::audit::ErrorInfo;
use crate::store::QueryError;

/// Response extension carrying the error behind a failed response, so the
/// observation middleware can record it without re-parsing the body.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub ErrorInfo);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication failed: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Query(QueryError::InvalidRange { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Query(QueryError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let detail = ErrorDetail(ErrorInfo::from_error(&self));
        let body = json!({ "success": false, "error": self.to_string() });
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}
