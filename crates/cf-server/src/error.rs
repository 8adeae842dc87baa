//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`cf_core::Error`] so that route handlers
//! can return `Result<T, AppError>` directly. The body is always
//! `{"error": "<message>"}`; the request id travels in the `x-request-id`
//! response header.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: cf_core::Error,
}

impl AppError {
    pub fn new(inner: cf_core::Error) -> Self {
        Self { inner }
    }
}

impl From<cf_core::Error> for AppError {
    fn from(e: cf_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match &self.inner {
            e if status.is_server_error() => {
                tracing::error!(status = %status, error = %e, "Server error in API handler");
            }
            cf_core::Error::NotFound { entity, id } => {
                tracing::debug!(entity = %entity, id = %id, "Not found");
            }
            e => {
                tracing::debug!(status = %status, error = %e, "Client error");
            }
        }

        let body = json!({ "error": self.inner.to_string() });
        let mut response = (status, axum::Json(body)).into_response();

        if let cf_core::Error::InvalidRange { size, .. } = &self.inner {
            if let Ok(val) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, val);
            }
        }

        response
    }
}
