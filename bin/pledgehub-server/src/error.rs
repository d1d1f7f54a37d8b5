//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pledgehub_common::Error;
use tracing::error;

/// Error returned by REST handlers; wraps the common error type.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self(Error::invalid_request(msg))
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = serde_json::json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
